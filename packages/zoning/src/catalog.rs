//! Loading and cross-checking of the embedded rule tables.

use crate::districts::{DistrictFile, ZoningCatalog};
use crate::equivalency::{EquivalencyFile, EquivalencyResolver};
use crate::taxonomy::{UseFile, UseTaxonomy};

const DISTRICTS_TOML: &str = include_str!("../catalog/districts.toml");
const USES_TOML: &str = include_str!("../catalog/uses.toml");
const EQUIVALENCY_TOML: &str = include_str!("../catalog/equivalency.toml");

/// Errors raised while loading the rule tables.
///
/// Any of these means the catalog is corrupt; the process should not start.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A table is not valid TOML or does not match the expected layout.
    #[error("Failed to parse {table} table: {source}")]
    Parse {
        /// Table name.
        table: &'static str,
        /// Underlying parser error.
        source: toml::de::Error,
    },

    /// A table has no rows.
    #[error("{table} table is empty")]
    Empty {
        /// Table name.
        table: &'static str,
    },

    /// The same code appears twice in one table.
    #[error("Duplicate code {code} in {table} table")]
    DuplicateCode {
        /// Table name.
        table: &'static str,
        /// Offending code.
        code: String,
    },

    /// A row references a zoning code that is not a current district.
    #[error("{table} entry {referenced_by} references unknown zoning code {code}")]
    UnknownZoningCode {
        /// Table name.
        table: &'static str,
        /// Code of the row holding the reference.
        referenced_by: String,
        /// Unknown zoning code.
        code: String,
    },
}

/// The district catalog, use taxonomy and equivalency table, loaded together
/// so their cross-references can be verified.
#[derive(Debug, Clone)]
pub struct RegulationCatalog {
    districts: ZoningCatalog,
    taxonomy: UseTaxonomy,
    equivalency: EquivalencyResolver,
}

impl RegulationCatalog {
    /// Loads the tables embedded in the binary.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if any embedded table is malformed or the
    /// tables are inconsistent with each other.
    pub fn load_embedded() -> Result<Self, CatalogError> {
        Self::from_toml(DISTRICTS_TOML, USES_TOML, EQUIVALENCY_TOML)
    }

    /// Loads the tables from TOML sources.
    ///
    /// Verifies that every use's compatible zones and every equivalency
    /// target are current district codes, then derives each district's
    /// compatible use set from the use catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on parse failures, empty or duplicated
    /// tables, or references to unknown district codes.
    pub fn from_toml(
        districts_toml: &str,
        uses_toml: &str,
        equivalency_toml: &str,
    ) -> Result<Self, CatalogError> {
        let district_file: DistrictFile =
            toml::de::from_str(districts_toml).map_err(|source| CatalogError::Parse {
                table: "districts",
                source,
            })?;
        let use_file: UseFile =
            toml::de::from_str(uses_toml).map_err(|source| CatalogError::Parse {
                table: "uses",
                source,
            })?;
        let equivalency_file: EquivalencyFile =
            toml::de::from_str(equivalency_toml).map_err(|source| CatalogError::Parse {
                table: "equivalency",
                source,
            })?;

        let mut districts = ZoningCatalog::from_file(district_file)?;
        let taxonomy = UseTaxonomy::from_file(use_file)?;

        for use_type in taxonomy.iter() {
            for zone in &use_type.compatible_zoning_codes {
                if !districts.link_use(zone, &use_type.code) {
                    return Err(CatalogError::UnknownZoningCode {
                        table: "uses",
                        referenced_by: use_type.code.clone(),
                        code: zone.clone(),
                    });
                }
            }
        }

        let equivalency = EquivalencyResolver::from_file(equivalency_file, districts.codes())?;

        log::debug!(
            "Loaded regulation catalog: {} districts ({}), {} uses ({}), {} equivalencies",
            districts.len(),
            districts.version(),
            taxonomy.len(),
            taxonomy.version(),
            equivalency.iter().count(),
        );

        Ok(Self {
            districts,
            taxonomy,
            equivalency,
        })
    }

    /// Current zoning districts.
    #[must_use]
    pub const fn districts(&self) -> &ZoningCatalog {
        &self.districts
    }

    /// Land-use catalog.
    #[must_use]
    pub const fn taxonomy(&self) -> &UseTaxonomy {
        &self.taxonomy
    }

    /// Legacy code equivalency table.
    #[must_use]
    pub const fn equivalency(&self) -> &EquivalencyResolver {
        &self.equivalency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISTRICTS: &str = r#"
version = "test"
[[district]]
code = "R-I"
name_es = "Residencial Intermedio"
category = "residential"
"#;

    const USES: &str = r#"
version = "test"
[[use]]
code = "RES-SF"
name_es = "Residencial Unifamiliar"
name_en = "Single-Family Residential"
category = "residential"
compatible_zones = ["R-I"]
ministerial = true
"#;

    const EQUIVALENCY: &str = r#"
source = "test"
[[entry]]
legacy_code = "R-2"
current = "R-I"
legacy = "R-I"
name_es = "Residencial Intermedio"
category = "residential"
"#;

    #[test]
    fn embedded_catalog_loads() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        assert!(!catalog.districts().is_empty());
        assert!(!catalog.taxonomy().is_empty());
        assert!(catalog.equivalency().iter().count() > 0);
    }

    #[test]
    fn every_use_references_current_districts_only() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        for use_type in catalog.taxonomy().iter() {
            for zone in &use_type.compatible_zoning_codes {
                assert!(
                    catalog.districts().contains(zone),
                    "{} references {zone}",
                    use_type.code
                );
            }
        }
    }

    #[test]
    fn district_use_sets_mirror_use_zone_sets() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        for district in catalog.districts().iter() {
            for use_code in &district.compatible_use_codes {
                let use_type = catalog.taxonomy().get(use_code).unwrap();
                assert!(use_type.allows(&district.code));
            }
        }
        let r_i = catalog.districts().get("R-I").unwrap();
        assert!(r_i.compatible_use_codes.contains("RES-SF"));
    }

    #[test]
    fn minimal_tables_load() {
        let catalog = RegulationCatalog::from_toml(DISTRICTS, USES, EQUIVALENCY).unwrap();
        assert_eq!(catalog.districts().len(), 1);
        assert_eq!(catalog.taxonomy().len(), 1);
    }

    #[test]
    fn rejects_use_with_unknown_zone() {
        let uses = USES.replace(r#"["R-I"]"#, r#"["R-I", "R-2"]"#);
        let err = RegulationCatalog::from_toml(DISTRICTS, &uses, EQUIVALENCY).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownZoningCode { table: "uses", code, .. } if code == "R-2"
        ));
    }

    #[test]
    fn rejects_equivalency_to_unknown_zone() {
        let equivalency = EQUIVALENCY.replace(r#"current = "R-I""#, r#"current = "R-X""#);
        let err = RegulationCatalog::from_toml(DISTRICTS, USES, &equivalency).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownZoningCode { table: "equivalency", .. }
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = RegulationCatalog::from_toml("not = [valid", USES, EQUIVALENCY).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { table: "districts", .. }));
    }
}
