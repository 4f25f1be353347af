//! Overlay-zone restriction table.
//!
//! Overlay types arrive as free strings from the GIS service (Spanish layer
//! names or short English tags). They are matched by keyword to an
//! [`OverlayKind`] with a fixed rule; anything unmatched becomes an
//! "unclassified overlay" restriction that asks for manual review.

use std::collections::BTreeSet;

use pyxten_zoning_models::{AppliesTo, OverlayKind, OverlayZone, Restriction, Severity};
use serde::Serialize;

/// Restrictions derived from a set of overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayAnalysis {
    /// One restriction per distinct overlay type, in input order.
    pub restrictions: Vec<Restriction>,
    /// `true` iff any restriction has [`Severity::High`].
    pub has_critical: bool,
    /// Overlay types with no dedicated rule.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unclassified: Vec<String>,
}

struct OverlayRule {
    kind: OverlayKind,
    keywords: &'static [&'static str],
    requirement: &'static str,
    agency: &'static str,
    severity: Severity,
    applies_to: AppliesTo,
}

const RULES: &[OverlayRule] = &[
    OverlayRule {
        kind: OverlayKind::Historic,
        keywords: &["historic", "histórica", "historica", "histórico", "historico"],
        requirement: "Historic zone: requires review by the Instituto de Cultura Puertorriqueña heritage office",
        agency: "ICP",
        severity: Severity::High,
        applies_to: AppliesTo::AllUses,
    },
    OverlayRule {
        kind: OverlayKind::Coastal,
        keywords: &["coastal", "costanera", "costera"],
        requirement: "Coastal zone: regulated by the Coastal Zone Act, requires a DRNA permit",
        agency: "DRNA",
        severity: Severity::High,
        applies_to: AppliesTo::Construction,
    },
    OverlayRule {
        kind: OverlayKind::FloodRisk,
        keywords: &["flood", "inundación", "inundacion", "fema"],
        requirement: "Flood hazard area: requires an elevation certificate and flood-resistant construction",
        agency: "OGPe",
        severity: Severity::High,
        applies_to: AppliesTo::Construction,
    },
];

/// Matches an overlay type string to a known kind.
#[must_use]
pub fn classify_overlay(overlay_type: &str) -> Option<OverlayKind> {
    rule_for(overlay_type).map(|rule| rule.kind)
}

fn rule_for(overlay_type: &str) -> Option<&'static OverlayRule> {
    let lower = overlay_type.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
}

/// Identity used to collapse repeated overlays.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum OverlayKey<'a> {
    Kind(OverlayKind),
    Unclassified(&'a str),
}

/// Maps overlays to restrictions.
///
/// Recognized overlays are collapsed by kind, so `"coastal"` and
/// `"Zona Costanera"` yield one restriction. Unrecognized overlays are
/// collapsed by type string and keep the severity the GIS service reported
/// for them.
#[must_use]
pub fn analyze(overlays: &[OverlayZone]) -> OverlayAnalysis {
    let mut seen = BTreeSet::new();
    let mut analysis = OverlayAnalysis::default();

    for overlay in overlays {
        let rule = rule_for(&overlay.overlay_type);
        let key = rule.map_or(
            OverlayKey::Unclassified(overlay.overlay_type.as_str()),
            |rule| OverlayKey::Kind(rule.kind),
        );
        if !seen.insert(key) {
            continue;
        }

        let restriction = match rule {
            Some(rule) => Restriction {
                overlay_type: overlay.overlay_type.clone(),
                kind: Some(rule.kind),
                requirement: rule.requirement.to_string(),
                agency: Some(rule.agency.to_string()),
                severity: rule.severity,
                applies_to: rule.applies_to,
            },
            None => {
                analysis.unclassified.push(overlay.overlay_type.clone());
                Restriction {
                    overlay_type: overlay.overlay_type.clone(),
                    kind: None,
                    requirement: format!(
                        "Unclassified overlay '{}': manual review required",
                        overlay.overlay_type
                    ),
                    agency: None,
                    severity: overlay.severity,
                    applies_to: AppliesTo::AllUses,
                }
            }
        };

        analysis.has_critical |= restriction.severity == Severity::High;
        analysis.restrictions.push(restriction);
    }

    analysis
}
