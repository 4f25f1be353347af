//! Catalog of current zoning districts.

use std::collections::{BTreeMap, BTreeSet};

use pyxten_zoning_models::{ZoningCategory, ZoningDistrict};
use serde::Deserialize;

use crate::CatalogError;

/// `districts.toml` file layout.
#[derive(Debug, Deserialize)]
pub(crate) struct DistrictFile {
    pub version: String,
    #[serde(rename = "district")]
    pub districts: Vec<DistrictRow>,
}

/// One `[[district]]` row.
#[derive(Debug, Deserialize)]
pub(crate) struct DistrictRow {
    pub code: String,
    pub name_es: String,
    pub category: ZoningCategory,
}

/// The set of normalized zoning districts, in catalog order.
#[derive(Debug, Clone)]
pub struct ZoningCatalog {
    version: String,
    districts: Vec<ZoningDistrict>,
    index: BTreeMap<String, usize>,
}

impl ZoningCatalog {
    /// Builds the catalog from parsed rows. `compatible_use_codes` is filled
    /// in later from the use catalog.
    pub(crate) fn from_file(file: DistrictFile) -> Result<Self, CatalogError> {
        if file.districts.is_empty() {
            return Err(CatalogError::Empty { table: "districts" });
        }

        let mut districts = Vec::with_capacity(file.districts.len());
        let mut index = BTreeMap::new();

        for row in file.districts {
            let code = row.code.trim().to_uppercase();
            if index.insert(code.clone(), districts.len()).is_some() {
                return Err(CatalogError::DuplicateCode {
                    table: "districts",
                    code,
                });
            }
            districts.push(ZoningDistrict {
                code,
                display_name: row.name_es,
                category: row.category,
                compatible_use_codes: BTreeSet::new(),
            });
        }

        Ok(Self {
            version: file.version,
            districts,
            index,
        })
    }

    /// Records that `use_code` is allowed in `district_code`.
    pub(crate) fn link_use(&mut self, district_code: &str, use_code: &str) -> bool {
        let Some(&idx) = self.index.get(district_code) else {
            return false;
        };
        self.districts[idx]
            .compatible_use_codes
            .insert(use_code.to_string());
        true
    }

    /// Catalog version label (e.g. `"RC-2020"`).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Looks up a district by normalized code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&ZoningDistrict> {
        self.index.get(code).map(|&idx| &self.districts[idx])
    }

    /// Returns `true` if `code` is a current district code.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// All current district codes.
    #[must_use]
    pub fn codes(&self) -> BTreeSet<String> {
        self.index.keys().cloned().collect()
    }

    /// Iterates districts in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ZoningDistrict> {
        self.districts.iter()
    }

    /// Districts of one category, in catalog order.
    #[must_use]
    pub fn in_category(&self, category: ZoningCategory) -> Vec<&ZoningDistrict> {
        self.districts
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Number of districts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.districts.len()
    }

    /// Returns `true` if the catalog has no districts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, category: ZoningCategory) -> DistrictRow {
        DistrictRow {
            code: code.to_string(),
            name_es: format!("Distrito {code}"),
            category,
        }
    }

    #[test]
    fn rejects_duplicate_codes() {
        let file = DistrictFile {
            version: "test".to_string(),
            districts: vec![
                row("R-I", ZoningCategory::Residential),
                row(" r-i ", ZoningCategory::Residential),
            ],
        };
        let err = ZoningCatalog::from_file(file).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateCode { code, .. } if code == "R-I"));
    }

    #[test]
    fn link_use_ignores_unknown_district() {
        let mut catalog = ZoningCatalog::from_file(DistrictFile {
            version: "test".to_string(),
            districts: vec![row("C-L", ZoningCategory::Commercial)],
        })
        .unwrap();

        assert!(catalog.link_use("C-L", "COM-RETAIL"));
        assert!(!catalog.link_use("Z-99", "COM-RETAIL"));
        assert!(catalog.get("C-L").unwrap().compatible_use_codes.contains("COM-RETAIL"));
    }
}
