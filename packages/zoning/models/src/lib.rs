#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zoning, land-use and overlay data model.
//!
//! These types describe a property's regulatory context under Puerto Rico's
//! Reglamento Conjunto: where it is ([`Coordinate`]), how it is zoned
//! ([`ZoningDistrict`]), what the owner wants to do there ([`UseType`],
//! [`ClassifiedUse`]), which regulatory layers sit on top of the base zoning
//! ([`OverlayZone`], [`Restriction`]) and whether the use is allowed
//! ([`CompatibilityResult`]).
//!
//! Zoning codes are plain strings. A *normalized* code is one that appears in
//! the current district catalog; legacy municipal codes must be translated
//! before they are compared against [`UseType::compatible_zoning_codes`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How precisely a geocoder pinned an address.
///
/// Variant names follow the Google Geocoding `location_type` values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Precision {
    /// Exact street-address (rooftop) match.
    Rooftop,
    /// Interpolated between two known points on a street segment.
    RangeInterpolated,
    /// Centre of a street, block or region.
    GeometricCenter,
    /// Anything coarser.
    Approximate,
}

impl Precision {
    /// Returns `true` for rooftop-level matches.
    #[must_use]
    pub const fn is_exact(self) -> bool {
        matches!(self, Self::Rooftop)
    }
}

/// A WGS84 point produced by a geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Match precision reported by the geocoder.
    pub precision: Precision,
}

impl Coordinate {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, precision: Precision) -> Self {
        Self {
            latitude,
            longitude,
            precision,
        }
    }

    /// Returns `true` if both components are finite and inside the valid
    /// latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Top-level grouping of zoning districts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoningCategory {
    /// Residential districts.
    Residential,
    /// Commercial districts.
    Commercial,
    /// Tourist districts.
    Tourist,
    /// Industrial districts.
    Industrial,
    /// Rural and agricultural districts.
    Agricultural,
    /// Public facilities (dotacional).
    Dotational,
    /// Conservation and preservation districts.
    Conservation,
    /// Historic districts.
    Historical,
    /// Mixed-use districts.
    Mixed,
}

/// Top-level grouping of land uses.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UseCategory {
    /// Dwellings.
    Residential,
    /// Retail, office, food and lodging.
    Commercial,
    /// Manufacturing and storage.
    Industrial,
    /// Farming.
    Agricultural,
    /// Schools, churches and other institutions.
    Institutional,
    /// Parks and open space.
    Recreational,
    /// Several uses under one project.
    Mixed,
}

/// A district in the current regulatory taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoningDistrict {
    /// Normalized code (e.g. `"R-I"`).
    pub code: String,
    /// Spanish display name.
    pub display_name: String,
    /// District category.
    pub category: ZoningCategory,
    /// Use codes allowed in this district.
    pub compatible_use_codes: BTreeSet<String>,
}

/// A normalized land-use type from the use catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseType {
    /// Use code (e.g. `"RES-SF"`).
    pub code: String,
    /// Spanish name.
    pub name_es: String,
    /// English name.
    pub name_en: String,
    /// Use category.
    pub category: UseCategory,
    /// Spanish description shown to the classifier.
    pub description_es: String,
    /// Normalized district codes where this use is allowed.
    pub compatible_zoning_codes: BTreeSet<String>,
    /// Eligible for the expedited ministerial permit path.
    pub ministerial: bool,
    /// Requires a Department of Health permit.
    pub requires_health_permit: bool,
    /// Requires environmental review.
    pub requires_environmental_review: bool,
    /// Lower-case search keywords (Spanish and English).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl UseType {
    /// Returns `true` if `zoning_code` is listed as compatible.
    #[must_use]
    pub fn allows(&self, zoning_code: &str) -> bool {
        self.compatible_zoning_codes.contains(zoning_code)
    }
}

/// One use detected in a free-text description, validated against the use
/// catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedUse {
    /// Catalog use code.
    pub use_code: String,
    /// How the classifier read the description.
    pub interpretation_text: String,
    /// Classifier self-reported certainty in `[0, 1]`.
    pub confidence: f64,
    /// Free-form classifier notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Severity of an overlay restriction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Adds requirements but does not change the permit path.
    Medium,
    /// Critical: forces discretionary review.
    High,
}

/// A regulatory layer intersecting a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayZone {
    /// Overlay type as reported by the GIS service (e.g. `"coastal"`).
    #[serde(rename = "type")]
    pub overlay_type: String,
    /// Feature description.
    pub description: String,
    /// Severity reported alongside the feature.
    pub severity: Severity,
}

/// Overlay types with a dedicated restriction rule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverlayKind {
    /// Coastal zone (Ley de Zona Costanera).
    Coastal,
    /// Special flood hazard area or FEMA map revision.
    FloodRisk,
    /// Historic zone.
    Historic,
}

/// What a restriction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    /// Every use on the property.
    AllUses,
    /// New construction and alterations.
    Construction,
}

/// An additional requirement imposed by an overlay zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restriction {
    /// Overlay type string this restriction came from.
    pub overlay_type: String,
    /// Recognized overlay kind, `None` for unclassified overlays.
    pub kind: Option<OverlayKind>,
    /// Human-readable requirement.
    pub requirement: String,
    /// Agency that must sign off, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    /// Restriction severity.
    pub severity: Severity,
    /// Scope of the restriction.
    pub applies_to: AppliesTo,
}

/// Permit track for a use in a district.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PermitPath {
    /// Expedited approval, no discretionary review.
    Ministerial,
    /// Requires agency review.
    Discretionary,
    /// Not allowed in the district.
    Blocked,
}

impl PermitPath {
    /// Downgrades a ministerial path to discretionary when a critical overlay
    /// applies. Other paths are unchanged.
    #[must_use]
    pub const fn escalate(self, has_critical_overlay: bool) -> Self {
        match self {
            Self::Ministerial if has_critical_overlay => Self::Discretionary,
            other => other,
        }
    }
}

/// Outcome of checking one use against one district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResult {
    /// Use that was evaluated.
    pub use_code: String,
    /// Normalized district it was evaluated against.
    pub zoning_code: String,
    /// Whether the use is allowed.
    pub passed: bool,
    /// Regulation article backing the determination.
    pub article: String,
    /// Permit track.
    pub permit_path: PermitPath,
}
