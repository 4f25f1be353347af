//! Versioned catalog of normalized land-use types.
//!
//! Every use code a classifier returns must be looked up here before it is
//! trusted. The catalog also supports a keyword search ([`UseTaxonomy::quick_match`])
//! for suggestions and for the offline classifier.

use std::collections::{BTreeMap, BTreeSet};

use pyxten_zoning_models::{UseCategory, UseType};
use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// Maximum number of results returned by [`UseTaxonomy::quick_match`].
pub const QUICK_MATCH_LIMIT: usize = 10;

/// `uses.toml` file layout.
#[derive(Debug, Deserialize)]
pub(crate) struct UseFile {
    pub version: String,
    #[serde(rename = "use")]
    pub uses: Vec<UseRow>,
}

/// One `[[use]]` row.
#[derive(Debug, Deserialize)]
pub(crate) struct UseRow {
    pub code: String,
    pub name_es: String,
    pub name_en: String,
    pub category: UseCategory,
    #[serde(default)]
    pub description_es: String,
    pub compatible_zones: Vec<String>,
    #[serde(default)]
    pub ministerial: bool,
    #[serde(default)]
    pub requires_health_permit: bool,
    #[serde(default)]
    pub requires_environmental_review: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A keyword search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseMatch {
    /// Matched use code.
    pub code: String,
    /// Spanish name of the use.
    pub name_es: String,
    /// Use category.
    pub category: UseCategory,
    /// Relevance score (higher is better).
    pub score: u32,
}

/// The use catalog.
#[derive(Debug, Clone)]
pub struct UseTaxonomy {
    version: String,
    uses: Vec<UseType>,
    index: BTreeMap<String, usize>,
}

impl UseTaxonomy {
    pub(crate) fn from_file(file: UseFile) -> Result<Self, CatalogError> {
        if file.uses.is_empty() {
            return Err(CatalogError::Empty { table: "uses" });
        }

        let mut uses = Vec::with_capacity(file.uses.len());
        let mut index = BTreeMap::new();

        for row in file.uses {
            let code = normalize_use_code(&row.code);
            if index.insert(code.clone(), uses.len()).is_some() {
                return Err(CatalogError::DuplicateCode { table: "uses", code });
            }
            uses.push(UseType {
                code,
                name_es: row.name_es,
                name_en: row.name_en,
                category: row.category,
                description_es: row.description_es,
                compatible_zoning_codes: row
                    .compatible_zones
                    .iter()
                    .map(|z| z.trim().to_uppercase())
                    .collect::<BTreeSet<_>>(),
                ministerial: row.ministerial,
                requires_health_permit: row.requires_health_permit,
                requires_environmental_review: row.requires_environmental_review,
                keywords: row.keywords.iter().map(|k| k.to_lowercase()).collect(),
            });
        }

        Ok(Self {
            version: file.version,
            uses,
            index,
        })
    }

    /// Catalog version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Looks up a use by code. The code is trimmed and upper-cased first, so
    /// `" res-sf"` finds `RES-SF`.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&UseType> {
        self.index
            .get(&normalize_use_code(code))
            .map(|&idx| &self.uses[idx])
    }

    /// Returns `true` if `code` names a catalog use.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Iterates uses in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &UseType> {
        self.uses.iter()
    }

    /// Uses of one category, in catalog order.
    #[must_use]
    pub fn by_category(&self, category: UseCategory) -> Vec<&UseType> {
        self.uses.iter().filter(|u| u.category == category).collect()
    }

    /// Number of uses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.uses.len()
    }

    /// Returns `true` if the catalog has no uses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }

    /// Keyword search over use names and keywords.
    ///
    /// Scores a Spanish-name hit at 10, an English-name hit at 5 and a
    /// keyword hit at 3. Returns at most [`QUICK_MATCH_LIMIT`] results,
    /// highest score first (catalog order breaks ties).
    #[must_use]
    pub fn quick_match(&self, term: &str) -> Vec<UseMatch> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<UseMatch> = self
            .uses
            .iter()
            .filter_map(|u| {
                let mut score = 0;
                if u.name_es.to_lowercase().contains(&term) {
                    score += 10;
                }
                if u.name_en.to_lowercase().contains(&term) {
                    score += 5;
                }
                if u.keywords.iter().any(|k| k.contains(&term) || term.contains(k.as_str())) {
                    score += 3;
                }
                (score > 0).then(|| UseMatch {
                    code: u.code.clone(),
                    name_es: u.name_es.clone(),
                    category: u.category,
                    score,
                })
            })
            .collect();

        // Stable sort keeps catalog order among equal scores.
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(QUICK_MATCH_LIMIT);
        matches
    }
}

/// Canonical form of a use code.
#[must_use]
pub fn normalize_use_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
