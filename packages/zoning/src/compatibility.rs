//! Use-to-district compatibility rule (Tomo 6, Artículo 6.1).

use pyxten_zoning_models::{CompatibilityResult, PermitPath, UseType};

/// Article cited for every compatibility determination.
pub const COMPATIBILITY_ARTICLE: &str = "Reglamento Conjunto, Tomo 6, Artículo 6.1";

/// Checks whether `use_type` is allowed in `zoning_code`.
///
/// The use passes iff the district code is in its compatible zone list. A
/// passing ministerial use gets [`PermitPath::Ministerial`], any other
/// passing use [`PermitPath::Discretionary`], and a failing use
/// [`PermitPath::Blocked`]. Overlay escalation is applied by the caller.
///
/// `zoning_code` must already be normalized and `use_type` must come from
/// the use catalog.
#[must_use]
pub fn evaluate(zoning_code: &str, use_type: &UseType) -> CompatibilityResult {
    let passed = use_type.allows(zoning_code);

    let permit_path = if !passed {
        PermitPath::Blocked
    } else if use_type.ministerial {
        PermitPath::Ministerial
    } else {
        PermitPath::Discretionary
    };

    CompatibilityResult {
        use_code: use_type.code.clone(),
        zoning_code: zoning_code.to_string(),
        passed,
        article: COMPATIBILITY_ARTICLE.to_string(),
        permit_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegulationCatalog;

    #[test]
    fn passed_matches_membership_for_every_pair() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        for district in catalog.districts().iter() {
            for use_type in catalog.taxonomy().iter() {
                let result = evaluate(&district.code, use_type);
                assert_eq!(
                    result.passed,
                    use_type.compatible_zoning_codes.contains(&district.code)
                );
                assert_eq!(result.passed, result.permit_path != PermitPath::Blocked);
            }
        }
    }

    #[test]
    fn single_family_in_intermediate_residential_is_ministerial() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let res_sf = catalog.taxonomy().get("RES-SF").unwrap();
        let result = evaluate("R-I", res_sf);
        assert!(result.passed);
        assert_eq!(result.permit_path, PermitPath::Ministerial);
        assert_eq!(result.article, COMPATIBILITY_ARTICLE);
    }

    #[test]
    fn restaurant_is_discretionary_where_allowed() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let restaurant = catalog.taxonomy().get("COM-RESTAURANT").unwrap();
        assert_eq!(
            evaluate("C-L", restaurant).permit_path,
            PermitPath::Discretionary
        );
    }

    #[test]
    fn heavy_industry_blocked_in_residential() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let heavy = catalog.taxonomy().get("IND-HEAVY").unwrap();
        let result = evaluate("R-B", heavy);
        assert!(!result.passed);
        assert_eq!(result.permit_path, PermitPath::Blocked);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let catalog = RegulationCatalog::load_embedded().unwrap();
        let retail = catalog.taxonomy().get("COM-RETAIL").unwrap();
        assert_eq!(evaluate("C-I", retail), evaluate("C-I", retail));
    }
}
