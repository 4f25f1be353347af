//! The validation report.
//!
//! A report is built once per pipeline run and is never mutated afterward.
//! Its serialized form is tagged by `terminalState`:
//!
//! - `finalized` carries the full determination ([`CompletedReport`]),
//! - `geocodeFailed`, `gisFailed` and `useClassificationFailed` carry a
//!   `reason` and zero confidence ([`FailedReport`]).

use chrono::{DateTime, NaiveDate, Utc};
use pyxten_zoning_models::{
    ClassifiedUse, CompatibilityResult, Coordinate, OverlayZone, PermitPath, Restriction,
};
use serde::Serialize;

/// Provenance of one fact in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Authority or service name.
    pub source: String,
    /// What the source was consulted for.
    pub purpose: String,
    /// When the stage completed.
    pub timestamp: DateTime<Utc>,
    /// Date the source data was last updated, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<NaiveDate>,
    /// Caveat about the currency of the data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_warning: Option<String>,
}

/// Fields shared by every report variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    /// Aggregated confidence in `[0, 1]`. Always 0 for failed reports.
    pub overall_confidence: f64,
    /// Contributing factors and named gaps.
    pub factors: Vec<String>,
    /// Whether `overall_confidence` reaches the target threshold.
    pub meets_target: bool,
    /// One record per completed stage, in stage order.
    pub data_sources: Vec<DataSource>,
    /// Data-quality warnings.
    pub warnings: Vec<String>,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
}

/// Final permit determination across all uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Determination {
    /// Every proposed use is allowed.
    pub viable: bool,
    /// Most restrictive permit path among the uses.
    pub permit_path: PermitPath,
    /// One-sentence outcome.
    pub summary: String,
    /// Suggested next steps.
    pub next_steps: Vec<String>,
}

/// A report that went through every stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedReport {
    /// Geocoded point.
    pub coordinate: Coordinate,
    /// Address as canonicalized by the geocoder.
    pub formatted_address: String,
    /// Cadastral number, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcel_id: Option<String>,
    /// Zoning code as reported by the GIS service.
    pub raw_zoning_code: String,
    /// Code used for evaluation. Unverified if `zoning_verified` is false.
    pub normalized_zoning_code: String,
    /// District name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoning_display_name: Option<String>,
    /// Whether the code was confirmed against the current catalog.
    pub zoning_verified: bool,
    /// Overlays at the point.
    pub overlays: Vec<OverlayZone>,
    /// Restrictions derived from the overlays.
    pub restrictions: Vec<Restriction>,
    /// Validated uses, in classifier order.
    pub classified_uses: Vec<ClassifiedUse>,
    /// One result per classified use, same order, after overlay escalation.
    pub compatibility_results: Vec<CompatibilityResult>,
    /// Overall outcome.
    pub determination: Determination,
    /// Shared fields.
    #[serde(flatten)]
    pub meta: ReportMeta,
}

/// A report from a run that stopped early.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedReport {
    /// Human-readable reason.
    pub reason: String,
    /// Geocoded point, when geocoding succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    /// Shared fields.
    #[serde(flatten)]
    pub meta: ReportMeta,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "terminalState", rename_all = "camelCase")]
pub enum ValidationReport {
    /// Every stage completed.
    Finalized(CompletedReport),
    /// The address could not be geocoded.
    GeocodeFailed(FailedReport),
    /// The GIS lookup failed.
    GisFailed(FailedReport),
    /// No usable use could be derived from the description.
    UseClassificationFailed(FailedReport),
}

impl ValidationReport {
    /// Shared fields.
    #[must_use]
    pub const fn meta(&self) -> &ReportMeta {
        match self {
            Self::Finalized(report) => &report.meta,
            Self::GeocodeFailed(report)
            | Self::GisFailed(report)
            | Self::UseClassificationFailed(report) => &report.meta,
        }
    }

    /// Aggregated confidence.
    #[must_use]
    pub const fn overall_confidence(&self) -> f64 {
        self.meta().overall_confidence
    }

    /// The full report, if every stage completed.
    #[must_use]
    pub const fn completed(&self) -> Option<&CompletedReport> {
        match self {
            Self::Finalized(report) => Some(report),
            _ => None,
        }
    }

    /// Failure reason, if the run stopped early.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Finalized(_) => None,
            Self::GeocodeFailed(report)
            | Self::GisFailed(report)
            | Self::UseClassificationFailed(report) => Some(&report.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ReportMeta {
        ReportMeta {
            overall_confidence: 0.0,
            factors: vec!["gis_lookup_skipped".to_string()],
            meets_target: false,
            data_sources: Vec::new(),
            warnings: Vec::new(),
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn failed_report_serializes_tag_reason_and_flattened_meta() {
        let report = ValidationReport::GisFailed(FailedReport {
            reason: "GIS service timed out".to_string(),
            coordinate: None,
            meta: meta(),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["terminalState"], "gisFailed");
        assert_eq!(json["reason"], "GIS service timed out");
        assert_eq!(json["overallConfidence"], 0.0);
        assert!(json.get("classifiedUses").is_none());
        assert!(json.get("compatibilityResults").is_none());
        assert!(json.get("coordinate").is_none());
    }

    #[test]
    fn accessors_follow_variant() {
        let report = ValidationReport::UseClassificationFailed(FailedReport {
            reason: "Use description not understood".to_string(),
            coordinate: None,
            meta: meta(),
        });
        assert!(report.completed().is_none());
        assert_eq!(report.reason(), Some("Use description not understood"));
        assert!(report.overall_confidence().abs() < f64::EPSILON);
    }
}
