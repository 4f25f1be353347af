//! LLM-backed use classification.

use std::fmt::Write as _;
use std::sync::LazyLock;

use async_trait::async_trait;
use pyxten_zoning::taxonomy::UseTaxonomy;
use pyxten_zoning_models::UseCategory;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::AiError;
use crate::providers::LlmProvider;

/// Extra information that may sharpen the classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationContext {
    /// Municipality of the property.
    pub municipality: Option<String>,
    /// Zoning district already known for the property.
    pub zoning_hint: Option<String>,
}

/// One candidate use, not yet checked against the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedUse {
    /// Use code as returned by the classifier.
    pub code: String,
    /// How the classifier read the description.
    #[serde(default)]
    pub interpretation: String,
    /// Self-reported confidence. Not guaranteed to be in `[0, 1]`.
    pub confidence: f64,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Classifier output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseClassification {
    /// Candidate uses, most relevant first.
    #[serde(default)]
    pub uses: Vec<ProposedUse>,
    /// Questions whose answers could change the classification.
    #[serde(default, alias = "clarifications_needed")]
    pub clarifications_needed: Vec<String>,
}

/// Classifies free-text use descriptions.
#[async_trait]
pub trait UseClassifier: Send + Sync {
    /// Classifier name for provenance records.
    fn source_name(&self) -> String;

    /// Classifies `text`.
    ///
    /// An empty `uses` list is a valid answer meaning the description was
    /// not understood.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the backing service fails or its answer
    /// cannot be parsed.
    async fn classify(
        &self,
        text: &str,
        context: Option<&ClassificationContext>,
    ) -> Result<UseClassification, AiError>;
}

const SYSTEM_PROMPT: &str = "Eres un experto en clasificación de usos de terreno según el \
Reglamento Conjunto de Puerto Rico. Respondes únicamente con JSON válido.";

/// Classifier that prompts an LLM with the use catalog.
pub struct LlmUseClassifier {
    provider: Box<dyn LlmProvider>,
    catalog_section: String,
}

impl LlmUseClassifier {
    /// Creates a classifier over `taxonomy`. The catalog is rendered into
    /// the prompt once, here.
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>, taxonomy: &UseTaxonomy) -> Self {
        Self {
            provider,
            catalog_section: format_catalog(taxonomy),
        }
    }

    fn build_prompt(&self, text: &str, context: Option<&ClassificationContext>) -> String {
        let mut prompt = format!("Analiza esta descripción de uso propuesto:\n\n\"{text}\"\n");

        if let Some(context) = context {
            prompt.push_str("\nContexto adicional:\n");
            if let Some(municipality) = &context.municipality {
                let _ = writeln!(prompt, "- Municipio: {municipality}");
            }
            if let Some(zoning) = &context.zoning_hint {
                let _ = writeln!(prompt, "- Zonificación: {zoning}");
            }
        }

        let _ = write!(
            prompt,
            "\nCATÁLOGO DE USOS:\n{}\n\
             INSTRUCCIONES:\n\
             1. Identifica TODOS los usos mencionados o implícitos (uso mixto si hay varios).\n\
             2. Usa solamente códigos exactos del catálogo.\n\
             3. Asigna una confianza entre 0.0 y 1.0 según la claridad de la descripción.\n\
             4. Lista la información faltante que podría cambiar la clasificación.\n\n\
             Responde SOLO con JSON, sin markdown:\n\
             {{\"uses\": [{{\"code\": \"RES-SF\", \"interpretation\": \"...\", \"confidence\": 0.95, \"notes\": \"...\"}}], \
             \"clarifications_needed\": [\"...\"]}}\n\n\
             Sé conservador: si no estás seguro, baja la confianza y pide clarificación.",
            self.catalog_section
        );

        prompt
    }
}

#[async_trait]
impl UseClassifier for LlmUseClassifier {
    fn source_name(&self) -> String {
        self.provider.name()
    }

    async fn classify(
        &self,
        text: &str,
        context: Option<&ClassificationContext>,
    ) -> Result<UseClassification, AiError> {
        let prompt = self.build_prompt(text, context);
        let reply = self.provider.complete(SYSTEM_PROMPT, &prompt).await?;
        let classification = parse_classification(&reply)?;
        log::debug!(
            "Classifier proposed {} use(s), {} clarification(s)",
            classification.uses.len(),
            classification.clarifications_needed.len()
        );
        Ok(classification)
    }
}

const CATEGORY_HEADINGS: &[(UseCategory, &str)] = &[
    (UseCategory::Residential, "RESIDENCIAL"),
    (UseCategory::Commercial, "COMERCIAL"),
    (UseCategory::Industrial, "INDUSTRIAL"),
    (UseCategory::Agricultural, "AGRÍCOLA"),
    (UseCategory::Institutional, "INSTITUCIONAL"),
    (UseCategory::Recreational, "RECREATIVO"),
    (UseCategory::Mixed, "USO MIXTO"),
];

/// Renders the catalog grouped by category for the prompt.
fn format_catalog(taxonomy: &UseTaxonomy) -> String {
    let mut out = String::new();
    for (category, heading) in CATEGORY_HEADINGS {
        let uses = taxonomy.by_category(*category);
        if uses.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n### {heading}:");
        for use_type in uses {
            let _ = writeln!(
                out,
                "- {}: {} ({})\n  Descripción: {}",
                use_type.code,
                use_type.name_es,
                use_type.name_en,
                if use_type.description_es.is_empty() {
                    "N/A"
                } else {
                    &use_type.description_es
                }
            );
        }
    }
    out
}

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap_or_else(|_| unreachable!())
});

static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap_or_else(|_| unreachable!()));

/// Extracts the JSON object from a model reply.
///
/// Accepts a bare object, an object inside a markdown code fence, or an
/// object surrounded by prose.
///
/// # Errors
///
/// Returns [`AiError::Parse`] if no JSON object can be found.
pub fn parse_json_response(reply: &str) -> Result<serde_json::Value, AiError> {
    let candidate = FENCED_JSON
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str())
        .trim();

    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(first_err) => BARE_OBJECT
            .find(candidate)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
            .ok_or_else(|| AiError::Parse {
                message: first_err.to_string(),
            }),
    }
}

/// Parses a model reply into a [`UseClassification`].
///
/// # Errors
///
/// Returns [`AiError::Parse`] if the reply has no JSON object or the object
/// does not have the expected shape (e.g. a use without a code).
pub fn parse_classification(reply: &str) -> Result<UseClassification, AiError> {
    let value = parse_json_response(reply)?;
    serde_json::from_value(value).map_err(|e| AiError::Parse {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyxten_zoning::RegulationCatalog;

    struct CannedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> String {
            "canned".to_string()
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, AiError> {
            assert!(prompt.contains("RES-SF"));
            assert!(prompt.contains("Municipio: Ponce"));
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "Aquí está:\n```json\n{\"uses\": [{\"code\": \"RES-SF\", \"confidence\": 0.95}]}\n```";
        let parsed = parse_classification(reply).unwrap();
        assert_eq!(parsed.uses[0].code, "RES-SF");
        assert!(parsed.clarifications_needed.is_empty());
    }

    #[test]
    fn parses_object_inside_prose() {
        let reply = "Resultado: {\"uses\": [], \"clarifications_needed\": [\"¿Cuántos empleados?\"]} fin";
        let parsed = parse_classification(reply).unwrap();
        assert!(parsed.uses.is_empty());
        assert_eq!(parsed.clarifications_needed.len(), 1);
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(matches!(
            parse_classification("No puedo ayudar con eso."),
            Err(AiError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_use_without_code() {
        assert!(matches!(
            parse_classification("{\"uses\": [{\"confidence\": 0.9}]}"),
            Err(AiError::Parse { .. })
        ));
    }

    #[test]
    fn catalog_is_grouped_by_category() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let section = format_catalog(catalog.taxonomy());
        let residential = section.find("### RESIDENCIAL").unwrap();
        let commercial = section.find("### COMERCIAL").unwrap();
        assert!(residential < commercial);
        assert!(section.contains("- COM-RESTAURANT:"));
    }

    #[tokio::test]
    async fn classify_round_trips_through_provider() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let classifier = LlmUseClassifier::new(
            Box::new(CannedProvider(
                "```\n{\"uses\": [{\"code\": \"RES-SF\", \"interpretation\": \"vivienda\", \"confidence\": 0.95}]}\n```",
            )),
            catalog.taxonomy(),
        );
        let context = ClassificationContext {
            municipality: Some("Ponce".to_string()),
            zoning_hint: None,
        };
        let result = classifier
            .classify("construir una residencia", Some(&context))
            .await
            .unwrap();
        assert_eq!(result.uses.len(), 1);
        assert!((result.uses[0].confidence - 0.95).abs() < f64::EPSILON);
    }
}
