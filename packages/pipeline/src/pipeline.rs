//! The resolution state machine.
//!
//! A run moves through `Start → Geocoded → ZoningResolved →
//! EquivalencyApplied → UseClassified → CompatibilityEvaluated →
//! OverlaysAnalyzed → Finalized`. Each transition consumes the previous
//! state and returns either the next state or a [`FailedReport`] for one of
//! the terminal failure states. Nothing is shared between runs except the
//! read-only catalog and the adapters.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use pyxten_ai::classifier::{ClassificationContext, UseClassification, UseClassifier};
use pyxten_geocoder::{GeocodeOutcome, GeocodedAddress, Geocoder};
use pyxten_gis::{GisLookup, GisLookupResult};
use pyxten_zoning::RegulationCatalog;
use pyxten_zoning::compatibility;
use pyxten_zoning::equivalency::{RegulationVintage, Resolution};
use pyxten_zoning::overlay::{self, OverlayAnalysis};
use pyxten_zoning_models::{
    ClassifiedUse, CompatibilityResult, Coordinate, PermitPath, Restriction,
};

use crate::aggregator::{self, SignalStage, StageSignal};
use crate::config::PipelineConfig;
use crate::report::{
    CompletedReport, DataSource, Determination, FailedReport, ReportMeta, ValidationReport,
};
use crate::request::ValidationRequest;

const OVERLAY_RULES_SOURCE: &str = "Reglamento Conjunto overlay restriction table";

/// Orchestrates one validation per [`ResolutionPipeline::run`] call.
pub struct ResolutionPipeline {
    catalog: Arc<RegulationCatalog>,
    geocoder: Arc<dyn Geocoder>,
    gis: Arc<dyn GisLookup>,
    classifier: Arc<dyn UseClassifier>,
    config: PipelineConfig,
}

/// Warnings, provenance and confidence signals accumulated along a run.
#[derive(Debug, Default)]
struct Trail {
    warnings: Vec<String>,
    data_sources: Vec<DataSource>,
    signals: Vec<StageSignal>,
}

impl Trail {
    fn warn(&mut self, warning: String) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn record(&mut self, source: &str, purpose: &str) {
        self.data_sources.push(DataSource {
            source: source.to_string(),
            purpose: purpose.to_string(),
            timestamp: Utc::now(),
            last_updated: None,
            staleness_warning: None,
        });
    }

    fn fail(
        mut self,
        reason: String,
        coordinate: Option<Coordinate>,
        skipped: &[SignalStage],
        generated_at: DateTime<Utc>,
    ) -> FailedReport {
        log::warn!("Validation stopped: {reason}");
        self.signals.extend(
            skipped
                .iter()
                .map(|&stage| StageSignal::Skipped { stage }),
        );
        let score = aggregator::aggregate(&self.signals);

        FailedReport {
            reason,
            coordinate,
            meta: ReportMeta {
                overall_confidence: 0.0,
                factors: score.factors,
                meets_target: false,
                data_sources: self.data_sources,
                warnings: self.warnings,
                generated_at,
            },
        }
    }
}

/// Zoning code after equivalency resolution.
#[derive(Debug)]
struct NormalizedZoning {
    raw_code: String,
    code: String,
    display_name: Option<String>,
    verified: bool,
}

struct Geocoded {
    address: GeocodedAddress,
    trail: Trail,
}

struct ZoningResolved {
    address: GeocodedAddress,
    gis: GisLookupResult,
    trail: Trail,
}

/// Everything known about the property once its zoning is normalized.
struct Site {
    address: GeocodedAddress,
    gis: GisLookupResult,
    zoning: NormalizedZoning,
}

struct EquivalencyApplied {
    site: Site,
    trail: Trail,
}

struct UseClassified {
    site: Site,
    uses: Vec<ClassifiedUse>,
    trail: Trail,
}

struct CompatibilityEvaluated {
    site: Site,
    uses: Vec<ClassifiedUse>,
    results: Vec<CompatibilityResult>,
    trail: Trail,
}

struct OverlaysAnalyzed {
    site: Site,
    uses: Vec<ClassifiedUse>,
    results: Vec<CompatibilityResult>,
    analysis: OverlayAnalysis,
    trail: Trail,
}

type Transition<T> = Result<T, Box<FailedReport>>;

impl ResolutionPipeline {
    /// Creates a pipeline over a loaded catalog and the three adapters.
    #[must_use]
    pub fn new(
        catalog: Arc<RegulationCatalog>,
        geocoder: Arc<dyn Geocoder>,
        gis: Arc<dyn GisLookup>,
        classifier: Arc<dyn UseClassifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            geocoder,
            gis,
            classifier,
            config,
        }
    }

    /// Runs a validation. Always produces a report; adapter failures and
    /// timeouts become failure variants.
    pub async fn run(&self, request: &ValidationRequest) -> ValidationReport {
        self.run_at(request, Utc::now()).await
    }

    /// Same as [`Self::run`], with the report time and the reference date
    /// for staleness checks supplied by the caller.
    pub async fn run_at(&self, request: &ValidationRequest, now: DateTime<Utc>) -> ValidationReport {
        log::info!(
            "Validating '{}' in {} for use '{}'",
            request.address(),
            request.municipality(),
            request.use_description()
        );

        let geocoded = match self.geocode(request, Trail::default(), now).await {
            Ok(state) => state,
            Err(failed) => return ValidationReport::GeocodeFailed(*failed),
        };

        let coordinate = geocoded.address.coordinate;
        let (gis_outcome, early_classification) = if self.config.concurrent_classification {
            let context = ClassificationContext {
                municipality: Some(request.municipality().to_string()),
                zoning_hint: None,
            };
            let (gis, classification) = tokio::join!(
                self.lookup_zoning(coordinate.latitude, coordinate.longitude),
                self.call_classifier(request.use_description(), context),
            );
            (gis, Some(classification))
        } else {
            (
                self.lookup_zoning(coordinate.latitude, coordinate.longitude)
                    .await,
                None,
            )
        };

        let zoning = match self.resolve_zoning(geocoded, gis_outcome, now) {
            Ok(state) => state,
            Err(failed) => return ValidationReport::GisFailed(*failed),
        };
        let equivalency = self.apply_equivalency(zoning);

        let classification = match early_classification {
            Some(classification) => classification,
            None => {
                let context = ClassificationContext {
                    municipality: Some(request.municipality().to_string()),
                    zoning_hint: Some(equivalency.site.zoning.code.clone()),
                };
                self.call_classifier(request.use_description(), context)
                    .await
            }
        };

        let classified = match self.validate_classification(equivalency, classification, now) {
            Ok(state) => state,
            Err(failed) => return ValidationReport::UseClassificationFailed(*failed),
        };

        let evaluated = self.evaluate_compatibility(classified);
        let analyzed = Self::analyze_overlays(evaluated);
        ValidationReport::Finalized(self.finalize(analyzed, now))
    }

    async fn geocode(
        &self,
        request: &ValidationRequest,
        mut trail: Trail,
        now: DateTime<Utc>,
    ) -> Transition<Geocoded> {
        let skipped = [
            SignalStage::Geocode,
            SignalStage::Zoning,
            SignalStage::UseClassification,
            SignalStage::Overlays,
        ];

        let outcome = with_timeout(
            "Geocoding service",
            self.config.geocode_timeout(),
            self.geocoder
                .geocode(request.address(), request.municipality()),
        )
        .await;

        let address = match outcome {
            Ok(GeocodeOutcome::Matched(address)) => address,
            Ok(GeocodeOutcome::Invalid { reason }) => {
                return Err(Box::new(trail.fail(
                    format!("Address could not be geocoded: {reason}"),
                    None,
                    &skipped,
                    now,
                )));
            }
            Err(reason) => return Err(Box::new(trail.fail(reason, None, &skipped, now))),
        };

        if !address.coordinate.is_valid() {
            return Err(Box::new(trail.fail(
                format!(
                    "Geocoder returned an invalid coordinate ({}, {})",
                    address.coordinate.latitude, address.coordinate.longitude
                ),
                None,
                &skipped,
                now,
            )));
        }

        for warning in &address.warnings {
            trail.warn(warning.clone());
        }
        trail.record(self.geocoder.source_name(), "Address geocoding");
        trail
            .signals
            .push(aggregator::geocode_signal(address.coordinate.precision));

        log::info!(
            "Geocoded to {}, {} ({})",
            address.coordinate.latitude,
            address.coordinate.longitude,
            address.coordinate.precision
        );
        Ok(Geocoded { address, trail })
    }

    async fn lookup_zoning(&self, latitude: f64, longitude: f64) -> Result<GisLookupResult, String> {
        with_timeout(
            "GIS service",
            self.config.gis_timeout(),
            self.gis.lookup(latitude, longitude),
        )
        .await
    }

    async fn call_classifier(
        &self,
        text: &str,
        context: ClassificationContext,
    ) -> Result<UseClassification, String> {
        with_timeout(
            "Use classification service",
            self.config.classify_timeout(),
            self.classifier.classify(text, Some(&context)),
        )
        .await
    }

    fn resolve_zoning(
        &self,
        state: Geocoded,
        outcome: Result<GisLookupResult, String>,
        now: DateTime<Utc>,
    ) -> Transition<ZoningResolved> {
        let Geocoded { address, mut trail } = state;
        let skipped = [
            SignalStage::Zoning,
            SignalStage::UseClassification,
            SignalStage::Overlays,
        ];

        let gis = match outcome {
            Ok(gis) if gis.zoning_raw_code.trim().is_empty() => {
                return Err(Box::new(trail.fail(
                    "GIS service returned an empty zoning code".to_string(),
                    Some(address.coordinate),
                    &skipped,
                    now,
                )));
            }
            Ok(gis) => gis,
            Err(reason) => {
                return Err(Box::new(trail.fail(
                    reason,
                    Some(address.coordinate),
                    &skipped,
                    now,
                )));
            }
        };
        let gis = dedup_overlays(gis, &mut trail);

        let mut staleness = Vec::new();
        if let Some(warning) = &gis.freshness_warning {
            staleness.push(warning.clone());
        }
        if let Some(warning) = stale_data_warning(
            gis.last_updated,
            now.date_naive(),
            self.config.stale_after_days,
        ) {
            staleness.push(warning);
        }
        if !gis.failed_overlay_layers.is_empty() {
            trail.warn(format!(
                "Overlay layers could not be queried, overlay list may be incomplete: {}",
                gis.failed_overlay_layers.join(", ")
            ));
        }
        for warning in &staleness {
            trail.warn(warning.clone());
        }

        trail.data_sources.push(DataSource {
            source: self.gis.source_name().to_string(),
            purpose: "Zoning, overlay and parcel lookup".to_string(),
            timestamp: Utc::now(),
            last_updated: gis.last_updated,
            staleness_warning: (!staleness.is_empty()).then(|| staleness.join("; ")),
        });

        log::info!(
            "GIS zoning {} with {} overlay(s)",
            gis.zoning_raw_code,
            gis.overlays.len()
        );
        Ok(ZoningResolved {
            address,
            gis,
            trail,
        })
    }

    fn apply_equivalency(&self, state: ZoningResolved) -> EquivalencyApplied {
        let ZoningResolved {
            address,
            gis,
            mut trail,
        } = state;
        let resolver = self.catalog.equivalency();
        let resolution = resolver.resolve(&gis.zoning_raw_code, RegulationVintage::Current);

        let (code, verified) = match &resolution {
            Resolution::AlreadyCurrent { code } => (code.clone(), true),
            Resolution::Translated { code, entry, .. } => {
                log::info!("Translated zoning {} to {code}", entry.legacy_code);
                (code.clone(), true)
            }
            Resolution::NotFound { code } => {
                trail.warn(format!(
                    "Zoning code '{code}' is not a current district and has no known equivalency; evaluated as unverified"
                ));
                (code.clone(), false)
            }
        };
        let zoning = NormalizedZoning {
            raw_code: gis.zoning_raw_code.clone(),
            display_name: self
                .catalog
                .districts()
                .get(&code)
                .map(|d| d.display_name.clone())
                .or_else(|| gis.zoning_display_name.clone()),
            code,
            verified,
        };

        trail.record(resolver.source(), "Zoning code equivalency");
        trail.signals.push(aggregator::zoning_signal(zoning.verified));

        EquivalencyApplied {
            site: Site {
                address,
                gis,
                zoning,
            },
            trail,
        }
    }

    /// Checks classifier output against the use catalog.
    ///
    /// Unknown codes are dropped, out-of-range confidences clamped and
    /// repeated codes collapsed to their highest confidence at the position
    /// of the first occurrence. Each adjustment is a warning.
    fn validate_classification(
        &self,
        state: EquivalencyApplied,
        outcome: Result<UseClassification, String>,
        now: DateTime<Utc>,
    ) -> Transition<UseClassified> {
        let EquivalencyApplied { site, mut trail } = state;
        let skipped = [SignalStage::UseClassification, SignalStage::Overlays];
        let coordinate = Some(site.address.coordinate);

        let classification = match outcome {
            Ok(classification) => classification,
            Err(reason) => return Err(Box::new(trail.fail(reason, coordinate, &skipped, now))),
        };

        for question in &classification.clarifications_needed {
            trail.warn(format!("Clarification needed: {question}"));
        }

        let taxonomy = self.catalog.taxonomy();
        let returned = classification.uses.len();
        let mut uses: Vec<ClassifiedUse> = Vec::with_capacity(returned);
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();

        for proposed in classification.uses {
            let Some(use_type) = taxonomy.get(&proposed.code) else {
                trail.warn(format!(
                    "Classifier returned unknown use code '{}'; entry ignored",
                    proposed.code
                ));
                continue;
            };

            let confidence = aggregator::clamp_unit(proposed.confidence);
            if !(0.0..=1.0).contains(&proposed.confidence) {
                trail.warn(format!(
                    "Confidence {} for {} is outside [0, 1]; clamped to {confidence}",
                    proposed.confidence, use_type.code
                ));
            }

            if let Some(&idx) = positions.get(&use_type.code) {
                let kept = &mut uses[idx];
                if confidence > kept.confidence {
                    kept.confidence = confidence;
                    kept.interpretation_text = proposed.interpretation;
                    kept.notes = proposed.notes;
                }
                trail.warn(format!(
                    "Classifier returned {} more than once; kept confidence {}",
                    use_type.code, kept.confidence
                ));
                continue;
            }

            positions.insert(use_type.code.clone(), uses.len());
            uses.push(ClassifiedUse {
                use_code: use_type.code.clone(),
                interpretation_text: proposed.interpretation,
                confidence,
                notes: proposed.notes.filter(|n| !n.trim().is_empty()),
            });
        }

        if uses.is_empty() {
            let reason = if returned == 0 {
                "Use description was not understood; no land use could be identified".to_string()
            } else {
                "Classifier returned no recognized use codes".to_string()
            };
            return Err(Box::new(trail.fail(reason, coordinate, &skipped, now)));
        }

        trail.record(&self.classifier.source_name(), "Use classification");
        trail.signals.push(aggregator::use_signal(&uses));

        log::info!(
            "Classified {} use(s): {}",
            uses.len(),
            uses.iter()
                .map(|u| u.use_code.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(UseClassified { site, uses, trail })
    }

    fn evaluate_compatibility(&self, state: UseClassified) -> CompatibilityEvaluated {
        let UseClassified {
            site,
            uses,
            mut trail,
        } = state;
        let taxonomy = self.catalog.taxonomy();

        let results = uses
            .iter()
            .filter_map(|u| taxonomy.get(&u.use_code))
            .map(|use_type| compatibility::evaluate(&site.zoning.code, use_type))
            .collect::<Vec<_>>();

        trail.record(
            &format!("Reglamento Conjunto ({})", taxonomy.version()),
            "Use compatibility evaluation",
        );

        CompatibilityEvaluated {
            site,
            uses,
            results,
            trail,
        }
    }

    fn analyze_overlays(state: CompatibilityEvaluated) -> OverlaysAnalyzed {
        let CompatibilityEvaluated {
            site,
            uses,
            results,
            mut trail,
        } = state;

        let analysis = overlay::analyze(&site.gis.overlays);
        for overlay_type in &analysis.unclassified {
            trail.warn(format!(
                "Unrecognized overlay type '{overlay_type}'; manual review required"
            ));
        }

        let results = results
            .into_iter()
            .map(|mut result| {
                let escalated = result.permit_path.escalate(analysis.has_critical);
                if escalated != result.permit_path {
                    log::info!(
                        "{} escalated to {escalated} by a critical overlay",
                        result.use_code
                    );
                }
                result.permit_path = escalated;
                result
            })
            .collect();

        trail.record(OVERLAY_RULES_SOURCE, "Overlay restriction analysis");
        trail.signals.push(aggregator::overlay_signal(
            !site.gis.overlays.is_empty(),
            !site.gis.failed_overlay_layers.is_empty(),
        ));

        OverlaysAnalyzed {
            site,
            uses,
            results,
            analysis,
            trail,
        }
    }

    fn finalize(&self, state: OverlaysAnalyzed, now: DateTime<Utc>) -> CompletedReport {
        let OverlaysAnalyzed {
            site,
            uses,
            results,
            analysis,
            trail,
        } = state;

        let score = aggregator::aggregate(&trail.signals);
        let meets_target = score.meets_target();
        let determination = self.determine(&site.zoning.code, &results, &analysis.restrictions);

        log::info!(
            "Finalized: {} ({}), confidence {:.2}",
            determination.permit_path,
            if determination.viable { "viable" } else { "not viable" },
            score.overall
        );

        CompletedReport {
            coordinate: site.address.coordinate,
            formatted_address: site.address.formatted_address,
            parcel_id: site.gis.parcel_id,
            raw_zoning_code: site.zoning.raw_code,
            normalized_zoning_code: site.zoning.code,
            zoning_display_name: site.zoning.display_name,
            zoning_verified: site.zoning.verified,
            overlays: site.gis.overlays,
            restrictions: analysis.restrictions,
            classified_uses: uses,
            compatibility_results: results,
            determination,
            meta: ReportMeta {
                overall_confidence: score.overall,
                factors: score.factors,
                meets_target,
                data_sources: trail.data_sources,
                warnings: trail.warnings,
                generated_at: now,
            },
        }
    }

    fn determine(
        &self,
        zoning_code: &str,
        results: &[CompatibilityResult],
        restrictions: &[Restriction],
    ) -> Determination {
        let viable = results.iter().all(|r| r.passed);
        let permit_path = overall_path(results);
        let blocked: Vec<&str> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.use_code.as_str())
            .collect();

        let summary = match permit_path {
            PermitPath::Ministerial => format!(
                "The proposed use is allowed in {zoning_code} and qualifies for the ministerial permit path."
            ),
            PermitPath::Discretionary => format!(
                "The proposed use is allowed in {zoning_code} but requires discretionary review."
            ),
            PermitPath::Blocked => format!(
                "Not allowed in {zoning_code}: {}.",
                blocked.join(", ")
            ),
        };

        let mut next_steps: Vec<String> = match permit_path {
            PermitPath::Ministerial => vec![
                "Prepare property documents (deed, survey and site plan)".to_string(),
                "Hire an Authorized Professional to certify the application".to_string(),
                "File for a Permiso Único through the Single Business Portal".to_string(),
                "Estimated timeline: 1 to 3 months".to_string(),
            ],
            PermitPath::Discretionary => {
                let mut steps = vec![
                    "Request a Consulta de Ubicación from the Planning Board".to_string(),
                    "Commission the required technical studies".to_string(),
                    "Coordinate endorsements with the reviewing agencies".to_string(),
                ];
                steps.extend(restrictions.iter().map(|r| match &r.agency {
                    Some(agency) => format!("{} ({agency})", r.requirement),
                    None => r.requirement.clone(),
                }));
                steps.push("Estimated timeline: 4 to 8 months".to_string());
                steps
            }
            PermitPath::Blocked => vec![
                "Request a rezoning (cambio de calificación) for the property".to_string(),
                "Look for a property with compatible zoning".to_string(),
                "Modify the proposed use to one allowed in the district".to_string(),
            ],
        };

        if permit_path != PermitPath::Blocked {
            let taxonomy = self.catalog.taxonomy();
            let uses = results.iter().filter_map(|r| taxonomy.get(&r.use_code));
            let (mut health, mut environmental) = (false, false);
            for use_type in uses {
                health |= use_type.requires_health_permit;
                environmental |= use_type.requires_environmental_review;
            }
            if health {
                next_steps.push("Obtain a Department of Health permit".to_string());
            }
            if environmental {
                next_steps.push("Complete the environmental compliance review".to_string());
            }
        }

        Determination {
            viable,
            permit_path,
            summary,
            next_steps,
        }
    }
}

/// Keeps the first overlay of each type.
fn dedup_overlays(mut gis: GisLookupResult, trail: &mut Trail) -> GisLookupResult {
    let mut seen = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    gis.overlays.retain(|overlay| {
        let first = seen.insert(overlay.overlay_type.clone());
        if !first {
            repeated.insert(overlay.overlay_type.clone());
        }
        first
    });
    for overlay_type in repeated {
        trail.warn(format!(
            "GIS service reported overlay '{overlay_type}' more than once; duplicates ignored"
        ));
    }
    gis
}

/// Most restrictive path across the results.
fn overall_path(results: &[CompatibilityResult]) -> PermitPath {
    results
        .iter()
        .map(|r| r.permit_path)
        .max()
        .unwrap_or(PermitPath::Blocked)
}

fn stale_data_warning(
    last_updated: Option<NaiveDate>,
    today: NaiveDate,
    stale_after_days: u32,
) -> Option<String> {
    let last_updated = last_updated?;
    let age = (today - last_updated).num_days();
    (age > i64::from(stale_after_days)).then(|| {
        format!("Zoning data last updated {last_updated}, {age} days ago; verify with the Planning Board")
    })
}

/// Awaits an adapter call, turning errors and timeouts into a failure
/// reason.
async fn with_timeout<T, E, F>(service: &str, limit: Duration, call: F) -> Result<T, String>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{service} failed: {e}")),
        Err(_) => Err(format!(
            "{service} timed out after {} ms",
            limit.as_millis()
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pyxten_ai::AiError;
    use pyxten_ai::classifier::ProposedUse;
    use pyxten_geocoder::GeocodeError;
    use pyxten_gis::GisError;
    use pyxten_zoning_models::{OverlayZone, Precision, Severity};

    use super::*;

    struct StubGeocoder {
        outcome: Option<GeocodeOutcome>,
        delay: Duration,
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        fn source_name(&self) -> &str {
            "Stub geocoder"
        }

        async fn geocode(
            &self,
            _address: &str,
            _municipality: &str,
        ) -> Result<GeocodeOutcome, GeocodeError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone().ok_or_else(|| GeocodeError::Parse {
                message: "unexpected payload".to_string(),
            })
        }
    }

    struct StubGis {
        result: Option<GisLookupResult>,
        delay: Duration,
    }

    #[async_trait]
    impl GisLookup for StubGis {
        fn source_name(&self) -> &str {
            "Stub GIS"
        }

        async fn lookup(&self, _lat: f64, _lon: f64) -> Result<GisLookupResult, GisError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone().ok_or_else(|| GisError::Service {
                message: "Service unavailable".to_string(),
            })
        }
    }

    struct StubClassifier {
        classification: Option<UseClassification>,
        delay: Duration,
        seen_context: Mutex<Option<ClassificationContext>>,
    }

    #[async_trait]
    impl UseClassifier for StubClassifier {
        fn source_name(&self) -> String {
            "Stub classifier".to_string()
        }

        async fn classify(
            &self,
            _text: &str,
            context: Option<&ClassificationContext>,
        ) -> Result<UseClassification, AiError> {
            *self.seen_context.lock().unwrap() = context.cloned();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.classification.clone().ok_or_else(|| AiError::Provider {
                message: "rate limited".to_string(),
            })
        }
    }

    fn matched(precision: Precision) -> Option<GeocodeOutcome> {
        Some(GeocodeOutcome::Matched(GeocodedAddress {
            coordinate: Coordinate::new(18.4655, -66.1057, precision),
            formatted_address: "Calle Fortaleza 100, San Juan, 00901, Puerto Rico".to_string(),
            warnings: Vec::new(),
        }))
    }

    fn gis(code: &str, overlays: Vec<OverlayZone>) -> GisLookupResult {
        GisLookupResult {
            zoning_raw_code: code.to_string(),
            zoning_display_name: Some("Residencial".to_string()),
            overlays,
            parcel_id: Some("040-000-001-01".to_string()),
            last_updated: NaiveDate::from_ymd_opt(2026, 3, 1),
            freshness_warning: None,
            failed_overlay_layers: Vec::new(),
        }
    }

    fn proposed(code: &str, confidence: f64) -> ProposedUse {
        ProposedUse {
            code: code.to_string(),
            interpretation: format!("Interpreted as {code}"),
            confidence,
            notes: None,
        }
    }

    fn classification(uses: Vec<ProposedUse>) -> Option<UseClassification> {
        Some(UseClassification {
            uses,
            clarifications_needed: Vec::new(),
        })
    }

    struct Fixture {
        geocode: Option<GeocodeOutcome>,
        geocode_delay: Duration,
        gis: Option<GisLookupResult>,
        gis_delay: Duration,
        classification: Option<UseClassification>,
        classify_delay: Duration,
        config: PipelineConfig,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                geocode: matched(Precision::Rooftop),
                geocode_delay: Duration::ZERO,
                gis: Some(gis("R-2", Vec::new())),
                gis_delay: Duration::ZERO,
                classification: classification(vec![proposed("RES-SF", 0.95)]),
                classify_delay: Duration::ZERO,
                config: PipelineConfig::default(),
            }
        }
    }

    impl Fixture {
        async fn run(self) -> (ValidationReport, Arc<StubClassifier>) {
            let classifier = Arc::new(StubClassifier {
                classification: self.classification,
                delay: self.classify_delay,
                seen_context: Mutex::new(None),
            });
            let pipeline = ResolutionPipeline::new(
                Arc::new(RegulationCatalog::load_embedded().unwrap()),
                Arc::new(StubGeocoder {
                    outcome: self.geocode,
                    delay: self.geocode_delay,
                }),
                Arc::new(StubGis {
                    result: self.gis,
                    delay: self.gis_delay,
                }),
                classifier.clone(),
                self.config,
            );
            let request = ValidationRequest::new(
                "Calle Fortaleza 100",
                "San Juan",
                "construir una residencia",
            )
            .unwrap();
            let now = DateTime::parse_from_rfc3339("2026-10-14T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc);
            (pipeline.run_at(&request, now).await, classifier)
        }
    }

    fn coastal() -> OverlayZone {
        OverlayZone {
            overlay_type: "coastal".to_string(),
            description: "Zona Costanera".to_string(),
            severity: Severity::High,
        }
    }

    #[tokio::test]
    async fn legacy_residential_code_is_ministerial() {
        let (report, _) = Fixture::default().run().await;
        let completed = report.completed().unwrap();

        assert_eq!(completed.raw_zoning_code, "R-2");
        assert_eq!(completed.normalized_zoning_code, "R-I");
        assert!(completed.zoning_verified);
        assert_eq!(completed.classified_uses[0].use_code, "RES-SF");
        let result = &completed.compatibility_results[0];
        assert!(result.passed);
        assert_eq!(result.permit_path, PermitPath::Ministerial);
        assert!(completed.determination.viable);
        assert_eq!(completed.determination.permit_path, PermitPath::Ministerial);
        assert!(completed.meta.warnings.is_empty());
    }

    #[tokio::test]
    async fn success_records_one_source_per_stage() {
        let (report, _) = Fixture::default().run().await;
        let purposes: Vec<&str> = report
            .meta()
            .data_sources
            .iter()
            .map(|s| s.purpose.as_str())
            .collect();
        assert_eq!(
            purposes,
            vec![
                "Address geocoding",
                "Zoning, overlay and parcel lookup",
                "Zoning code equivalency",
                "Use classification",
                "Use compatibility evaluation",
                "Overlay restriction analysis",
            ]
        );
    }

    #[tokio::test]
    async fn coastal_overlay_escalates_to_discretionary() {
        let (report, _) = Fixture {
            gis: Some(gis("R-I", vec![coastal()])),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        assert!(completed.compatibility_results[0].passed);
        assert_eq!(
            completed.compatibility_results[0].permit_path,
            PermitPath::Discretionary
        );
        assert_eq!(completed.determination.permit_path, PermitPath::Discretionary);
        assert!(
            completed
                .determination
                .next_steps
                .iter()
                .any(|s| s.contains("DRNA"))
        );
    }

    #[tokio::test]
    async fn unknown_zoning_code_warns_and_continues() {
        let (report, _) = Fixture {
            gis: Some(gis("Z-99", Vec::new())),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        assert_eq!(completed.normalized_zoning_code, "Z-99");
        assert!(!completed.zoning_verified);
        assert!(completed.meta.warnings.iter().any(|w| w.contains("Z-99")));
        assert!(completed.meta.factors.contains(&"zoning_uncertain".to_string()));
        assert_eq!(completed.compatibility_results.len(), 1);
    }

    #[tokio::test]
    async fn gis_failure_is_terminal_with_zero_confidence() {
        let (report, _) = Fixture {
            gis: None,
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::GisFailed(_)));
        assert!(report.overall_confidence().abs() < f64::EPSILON);
        assert!(report.reason().unwrap().contains("Service unavailable"));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("compatibilityResults").is_none());
        assert_eq!(json["terminalState"], "gisFailed");
        assert!(
            report
                .meta()
                .factors
                .contains(&"zoning_skipped".to_string())
        );
        assert_eq!(report.meta().data_sources.len(), 1);
    }

    #[tokio::test]
    async fn mixed_use_yields_one_result_per_use_in_order() {
        let (report, _) = Fixture {
            classification: classification(vec![
                proposed("COM-RESTAURANT", 0.9),
                proposed("RES-MF", 0.8),
            ]),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        let codes: Vec<&str> = completed
            .compatibility_results
            .iter()
            .map(|r| r.use_code.as_str())
            .collect();
        assert_eq!(codes, vec!["COM-RESTAURANT", "RES-MF"]);
        assert!(!completed.compatibility_results[0].passed);
        assert!(completed.compatibility_results[1].passed);
        assert!(!completed.determination.viable);
        assert_eq!(completed.determination.permit_path, PermitPath::Blocked);
    }

    #[tokio::test]
    async fn invalid_address_is_geocode_failure() {
        let (report, _) = Fixture {
            geocode: Some(GeocodeOutcome::Invalid {
                reason: "Address not found".to_string(),
            }),
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::GeocodeFailed(_)));
        assert_eq!(
            report.reason(),
            Some("Address could not be geocoded: Address not found")
        );
        assert!(report.meta().data_sources.is_empty());
        assert_eq!(report.meta().factors.len(), 4);
    }

    #[tokio::test]
    async fn geocoder_error_is_geocode_failure() {
        let (report, _) = Fixture {
            geocode: None,
            ..Fixture::default()
        }
        .run()
        .await;
        assert!(matches!(report, ValidationReport::GeocodeFailed(_)));
    }

    #[tokio::test]
    async fn empty_classification_is_terminal() {
        let (report, _) = Fixture {
            classification: classification(Vec::new()),
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::UseClassificationFailed(_)));
        assert!(report.overall_confidence().abs() < f64::EPSILON);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("classifiedUses").is_none());
    }

    #[tokio::test]
    async fn only_unknown_codes_is_terminal() {
        let (report, _) = Fixture {
            classification: classification(vec![proposed("RES-CASTLE", 0.9)]),
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::UseClassificationFailed(_)));
        assert!(report.meta().warnings.iter().any(|w| w.contains("RES-CASTLE")));
    }

    #[tokio::test]
    async fn classifier_error_is_terminal() {
        let (report, _) = Fixture {
            classification: None,
            ..Fixture::default()
        }
        .run()
        .await;
        assert!(matches!(report, ValidationReport::UseClassificationFailed(_)));
        assert!(report.reason().unwrap().contains("rate limited"));
    }

    #[tokio::test(start_paused = true)]
    async fn gis_timeout_is_ordinary_failure() {
        let (report, _) = Fixture {
            gis_delay: Duration::from_secs(60),
            config: PipelineConfig {
                gis_timeout_ms: 50,
                ..PipelineConfig::default()
            },
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::GisFailed(_)));
        assert_eq!(report.reason(), Some("GIS service timed out after 50 ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn geocode_timeout_is_ordinary_failure() {
        let (report, _) = Fixture {
            geocode_delay: Duration::from_secs(60),
            config: PipelineConfig {
                geocode_timeout_ms: 50,
                ..PipelineConfig::default()
            },
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::GeocodeFailed(_)));
        assert_eq!(
            report.reason(),
            Some("Geocoding service timed out after 50 ms")
        );
        assert!(report.overall_confidence().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_is_ordinary_failure() {
        let (report, _) = Fixture {
            classify_delay: Duration::from_secs(60),
            config: PipelineConfig {
                classify_timeout_ms: 50,
                ..PipelineConfig::default()
            },
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::UseClassificationFailed(_)));
        assert_eq!(
            report.reason(),
            Some("Use classification service timed out after 50 ms")
        );
        assert_eq!(report.meta().data_sources.len(), 3);
    }

    #[tokio::test]
    async fn out_of_range_coordinate_is_geocode_failure() {
        let (report, _) = Fixture {
            geocode: Some(GeocodeOutcome::Matched(GeocodedAddress {
                coordinate: Coordinate::new(f64::NAN, -66.1057, Precision::Rooftop),
                formatted_address: "San Juan, Puerto Rico".to_string(),
                warnings: Vec::new(),
            })),
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(matches!(report, ValidationReport::GeocodeFailed(_)));
        assert!(report.reason().unwrap().contains("invalid coordinate"));
        assert!(report.meta().data_sources.is_empty());
    }

    #[tokio::test]
    async fn repeated_overlay_types_are_reported_once() {
        let (report, _) = Fixture {
            gis: Some(gis("R-I", vec![coastal(), coastal()])),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        assert_eq!(completed.overlays.len(), 1);
        assert_eq!(completed.restrictions.len(), 1);
        assert!(
            completed
                .meta
                .warnings
                .iter()
                .any(|w| w.contains("'coastal' more than once"))
        );
    }

    #[tokio::test]
    async fn duplicate_codes_keep_highest_confidence() {
        let (report, _) = Fixture {
            classification: classification(vec![
                proposed("RES-SF", 0.7),
                proposed("COM-OFFICE", 0.8),
                proposed("res-sf", 0.9),
            ]),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        assert_eq!(completed.classified_uses.len(), 2);
        assert_eq!(completed.classified_uses[0].use_code, "RES-SF");
        assert!((completed.classified_uses[0].confidence - 0.9).abs() < f64::EPSILON);
        assert!(
            completed
                .meta
                .warnings
                .iter()
                .any(|w| w.contains("more than once"))
        );
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped_with_warning() {
        let (report, _) = Fixture {
            classification: classification(vec![proposed("RES-SF", 1.4)]),
            ..Fixture::default()
        }
        .run()
        .await;
        let completed = report.completed().unwrap();

        assert!((completed.classified_uses[0].confidence - 1.0).abs() < f64::EPSILON);
        assert!(completed.meta.warnings.iter().any(|w| w.contains("clamped")));
        assert!(completed.meta.overall_confidence <= 1.0);
    }

    #[tokio::test]
    async fn sequential_mode_passes_zoning_hint() {
        let (report, classifier) = Fixture {
            config: PipelineConfig {
                concurrent_classification: false,
                ..PipelineConfig::default()
            },
            ..Fixture::default()
        }
        .run()
        .await;
        assert!(report.completed().is_some());
        let context = classifier.seen_context.lock().unwrap().clone().unwrap();
        assert_eq!(context.zoning_hint.as_deref(), Some("R-I"));
        assert_eq!(context.municipality.as_deref(), Some("San Juan"));
    }

    #[tokio::test]
    async fn concurrent_mode_has_no_zoning_hint() {
        let (_, classifier) = Fixture::default().run().await;
        let context = classifier.seen_context.lock().unwrap().clone().unwrap();
        assert!(context.zoning_hint.is_none());
    }

    #[tokio::test]
    async fn stale_zoning_data_is_flagged_in_provenance() {
        let mut stale = gis("R-I", Vec::new());
        stale.last_updated = NaiveDate::from_ymd_opt(2020, 1, 15);
        let (report, _) = Fixture {
            gis: Some(stale),
            ..Fixture::default()
        }
        .run()
        .await;

        let gis_source = &report.meta().data_sources[1];
        assert!(gis_source.staleness_warning.is_some());
        assert!(report.meta().warnings.iter().any(|w| w.contains("2020-01-15")));
    }

    #[tokio::test]
    async fn approximate_geocode_misses_target() {
        let (report, _) = Fixture {
            geocode: matched(Precision::Approximate),
            ..Fixture::default()
        }
        .run()
        .await;

        assert!(report.meta().factors.contains(&"address_approximate".to_string()));
        assert!(!report.meta().meets_target);
    }

    #[test]
    fn overall_path_takes_most_restrictive() {
        let result = |path| CompatibilityResult {
            use_code: "RES-SF".to_string(),
            zoning_code: "R-I".to_string(),
            passed: path != PermitPath::Blocked,
            article: compatibility::COMPATIBILITY_ARTICLE.to_string(),
            permit_path: path,
        };
        assert_eq!(
            overall_path(&[result(PermitPath::Ministerial), result(PermitPath::Discretionary)]),
            PermitPath::Discretionary
        );
        assert_eq!(
            overall_path(&[result(PermitPath::Blocked), result(PermitPath::Ministerial)]),
            PermitPath::Blocked
        );
    }

    #[test]
    fn staleness_threshold() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert!(stale_data_warning(NaiveDate::from_ymd_opt(2026, 1, 1), today, 365).is_none());
        assert!(stale_data_warning(NaiveDate::from_ymd_opt(2024, 1, 1), today, 365).is_some());
        assert!(stale_data_warning(None, today, 365).is_none());
    }
}
