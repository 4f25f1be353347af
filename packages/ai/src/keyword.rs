//! Offline keyword classifier.
//!
//! Used when no LLM credentials are configured. Every catalog use whose
//! keyword appears as a whole word (or phrase) in the description is
//! proposed with a fixed confidence.

use async_trait::async_trait;
use pyxten_zoning::taxonomy::UseTaxonomy;

use crate::AiError;
use crate::classifier::{ClassificationContext, ProposedUse, UseClassification, UseClassifier};

/// Confidence assigned to every keyword match.
pub const KEYWORD_CONFIDENCE: f64 = 0.6;

struct KeywordEntry {
    code: String,
    keywords: Vec<String>,
}

/// Classifier that matches catalog keywords.
pub struct KeywordUseClassifier {
    entries: Vec<KeywordEntry>,
}

impl KeywordUseClassifier {
    /// Builds the keyword table from the use catalog.
    #[must_use]
    pub fn new(taxonomy: &UseTaxonomy) -> Self {
        Self {
            entries: taxonomy
                .iter()
                .filter(|u| !u.keywords.is_empty())
                .map(|u| KeywordEntry {
                    code: u.code.clone(),
                    keywords: u.keywords.clone(),
                })
                .collect(),
        }
    }

    /// Matches `text`, returning one proposal per matching use in catalog
    /// order.
    #[must_use]
    pub fn match_text(&self, text: &str) -> Vec<ProposedUse> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .filter_map(|entry| {
                let keyword = entry.keywords.iter().find(|k| contains_word(&text, k))?;
                Some(ProposedUse {
                    code: entry.code.clone(),
                    interpretation: format!("Matched keyword '{keyword}'"),
                    confidence: KEYWORD_CONFIDENCE,
                    notes: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UseClassifier for KeywordUseClassifier {
    fn source_name(&self) -> String {
        "Keyword classifier (offline)".to_string()
    }

    async fn classify(
        &self,
        text: &str,
        _context: Option<&ClassificationContext>,
    ) -> Result<UseClassification, AiError> {
        let uses = self.match_text(text);
        let clarifications_needed = if uses.is_empty() {
            Vec::new()
        } else {
            vec!["Offline keyword match: confirm the intended use with a professional".to_string()]
        };
        Ok(UseClassification {
            uses,
            clarifications_needed,
        })
    }
}

/// Returns `true` if `needle` occurs in `haystack` delimited by
/// non-alphanumeric characters or the string ends.
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
