//! Translation of municipal POT zoning codes into the current taxonomy.
//!
//! The GIS service often reports districts using a municipality's own Plan de
//! Ordenación Territorial codes (e.g. `"R-2"`). Before a use can be checked
//! against the district, the code must be mapped to its Reglamento Conjunto
//! equivalent (`"R-I"`). Codes that are already current resolve to
//! themselves, and codes missing from both the table and the current set
//! resolve to [`Resolution::NotFound`] so the caller can warn and carry on.

use std::collections::{BTreeMap, BTreeSet};

use pyxten_zoning_models::ZoningCategory;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::CatalogError;

/// Regulation edition an equivalency is resolved against.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegulationVintage {
    /// Reglamento Conjunto 2020 codes.
    #[default]
    Current,
    /// Reglamento Conjunto 2010 codes.
    Legacy,
}

/// `equivalency.toml` file layout.
#[derive(Debug, Deserialize)]
pub(crate) struct EquivalencyFile {
    pub source: String,
    #[serde(rename = "entry")]
    pub entries: Vec<EquivalencyRow>,
}

/// One `[[entry]]` row.
#[derive(Debug, Deserialize)]
pub(crate) struct EquivalencyRow {
    pub legacy_code: String,
    pub current: String,
    pub legacy: String,
    pub name_es: String,
    pub category: ZoningCategory,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A legacy code and its equivalents in each regulation edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquivalencyEntry {
    /// Municipal code as listed in the table.
    pub legacy_code: String,
    /// Equivalent Reglamento Conjunto 2020 code.
    pub current_code: String,
    /// Equivalent Reglamento Conjunto 2010 code.
    pub legacy_vintage_code: String,
    /// Spanish district name.
    pub name_es: String,
    /// District category.
    pub category: ZoningCategory,
    /// Table notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EquivalencyEntry {
    /// Equivalent code for the requested edition.
    #[must_use]
    pub fn code_for(&self, vintage: RegulationVintage) -> &str {
        match vintage {
            RegulationVintage::Current => &self.current_code,
            RegulationVintage::Legacy => &self.legacy_vintage_code,
        }
    }
}

/// Result of resolving a raw zoning code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution<'a> {
    /// The code is already a current district code.
    AlreadyCurrent {
        /// Normalized code.
        code: String,
    },
    /// The code was found in the equivalency table.
    Translated {
        /// Equivalent code for the requested vintage.
        code: String,
        /// Edition the code belongs to.
        vintage: RegulationVintage,
        /// Matching table row.
        entry: &'a EquivalencyEntry,
    },
    /// Not a current code and not in the table.
    NotFound {
        /// The trimmed, upper-cased input.
        code: String,
    },
}

impl Resolution<'_> {
    /// The code downstream stages should use. For [`Resolution::NotFound`]
    /// this is the input itself, unverified.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::AlreadyCurrent { code }
            | Self::Translated { code, .. }
            | Self::NotFound { code } => code,
        }
    }

    /// Returns `true` unless the code was not found.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}

/// Both equivalents of a legacy code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllEquivalents<'a> {
    /// Normalized input.
    pub original_code: String,
    /// Reglamento Conjunto 2020 code.
    pub current: &'a str,
    /// Reglamento Conjunto 2010 code.
    pub legacy: &'a str,
    /// Matching table row.
    pub entry: &'a EquivalencyEntry,
}

/// Lookup table from municipal codes to current codes.
#[derive(Debug, Clone)]
pub struct EquivalencyResolver {
    source: String,
    entries: Vec<EquivalencyEntry>,
    index: BTreeMap<String, usize>,
    current_codes: BTreeSet<String>,
}

impl EquivalencyResolver {
    /// Builds the resolver, verifying that every current target exists in
    /// `current_codes`.
    pub(crate) fn from_file(
        file: EquivalencyFile,
        current_codes: BTreeSet<String>,
    ) -> Result<Self, CatalogError> {
        let mut entries = Vec::with_capacity(file.entries.len());
        let mut index = BTreeMap::new();

        for row in file.entries {
            let legacy_code = normalize_code(&row.legacy_code);
            let current_code = normalize_code(&row.current);

            if !current_codes.contains(&current_code) {
                return Err(CatalogError::UnknownZoningCode {
                    table: "equivalency",
                    referenced_by: legacy_code,
                    code: current_code,
                });
            }
            if current_codes.contains(&legacy_code) {
                log::debug!(
                    "Equivalency entry {legacy_code} shadows a current code and will never be consulted"
                );
            }
            if index.insert(legacy_code.clone(), entries.len()).is_some() {
                return Err(CatalogError::DuplicateCode {
                    table: "equivalency",
                    code: legacy_code,
                });
            }

            entries.push(EquivalencyEntry {
                legacy_code,
                current_code,
                legacy_vintage_code: normalize_code(&row.legacy),
                name_es: row.name_es,
                category: row.category,
                notes: row.notes.filter(|n| !n.is_empty()),
            });
        }

        Ok(Self {
            source: file.source,
            entries,
            index,
            current_codes,
        })
    }

    /// Name of the authority the table comes from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolves `raw_code` for the given edition.
    ///
    /// Current codes short-circuit to [`Resolution::AlreadyCurrent`]
    /// regardless of `vintage`.
    #[must_use]
    pub fn resolve(&self, raw_code: &str, vintage: RegulationVintage) -> Resolution<'_> {
        let code = normalize_code(raw_code);

        if self.current_codes.contains(&code) {
            return Resolution::AlreadyCurrent { code };
        }

        match self.lookup(&code) {
            Some(entry) => Resolution::Translated {
                code: entry.code_for(vintage).to_string(),
                vintage,
                entry,
            },
            None => Resolution::NotFound { code },
        }
    }

    /// Both editions' equivalents for a legacy code, or `None` if the code
    /// is not in the table.
    #[must_use]
    pub fn all_equivalents(&self, raw_code: &str) -> Option<AllEquivalents<'_>> {
        let code = normalize_code(raw_code);
        self.lookup(&code).map(|entry| AllEquivalents {
            original_code: code,
            current: &entry.current_code,
            legacy: &entry.legacy_vintage_code,
            entry,
        })
    }

    /// Returns `true` if the code is not a current code and therefore needs
    /// translation.
    #[must_use]
    pub fn is_municipal_specific(&self, raw_code: &str) -> bool {
        !self.current_codes.contains(&normalize_code(raw_code))
    }

    /// Current districts reachable from the table for one category,
    /// deduplicated by current code, in table order.
    #[must_use]
    pub fn suggested_districts(&self, category: ZoningCategory) -> Vec<&EquivalencyEntry> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .filter(|e| seen.insert(e.current_code.as_str()))
            .collect()
    }

    /// Iterates table rows in file order.
    pub fn iter(&self) -> impl Iterator<Item = &EquivalencyEntry> {
        self.entries.iter()
    }

    fn lookup(&self, code: &str) -> Option<&EquivalencyEntry> {
        self.index.get(code).map(|&idx| &self.entries[idx])
    }
}

/// Canonical form of a zoning code: trimmed and upper-cased.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
