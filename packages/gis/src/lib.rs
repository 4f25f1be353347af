#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point lookups against Puerto Rico's planning GIS.
//!
//! Given a WGS84 coordinate, a [`GisLookup`] returns the raw zoning code at
//! that point, any overlay zones intersecting it and, if available, the
//! cadastral parcel. The zoning code is reported as the service stores it,
//! which may be a municipal POT code that still needs translation.
//!
//! The production implementation is [`mipr::MiprClient`], configured by the
//! embedded [`service_registry`].

pub mod mipr;
pub mod service_registry;

use async_trait::async_trait;
use chrono::NaiveDate;
use pyxten_zoning_models::OverlayZone;
use serde::Serialize;
use thiserror::Error;

/// Everything the GIS reported for one point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GisLookupResult {
    /// District code as stored by the service.
    pub zoning_raw_code: String,
    /// District description as stored by the service.
    pub zoning_display_name: Option<String>,
    /// Overlay zones at the point, at most one per type.
    pub overlays: Vec<OverlayZone>,
    /// Cadastral number, if the parcel layer answered.
    pub parcel_id: Option<String>,
    /// Last update of the zoning feature.
    pub last_updated: Option<NaiveDate>,
    /// Provider caveat about data currency.
    pub freshness_warning: Option<String>,
    /// Overlay layers that could not be queried. When non-empty the overlay
    /// list may be incomplete.
    pub failed_overlay_layers: Vec<String>,
}

/// Errors from GIS lookups.
#[derive(Debug, Error)]
pub enum GisError {
    /// HTTP exchange failed.
    #[error(transparent)]
    Http(#[from] pyxten_http::HttpError),

    /// The service answered with an error payload.
    #[error("GIS service error: {message}")]
    Service {
        /// Message reported by the service.
        message: String,
    },

    /// No zoning feature at the point.
    #[error("No zoning district found at {latitude}, {longitude}")]
    NoZoning {
        /// Query latitude.
        latitude: f64,
        /// Query longitude.
        longitude: f64,
    },

    /// A named layer is not published by the service.
    #[error("Layer '{layer}' not found in {service_url}")]
    LayerNotFound {
        /// MapServer URL.
        service_url: String,
        /// Layer name searched for.
        layer: String,
    },

    /// Response did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Service configuration is invalid.
    #[error("Invalid GIS service configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Looks up zoning, overlays and parcel data for a coordinate.
#[async_trait]
pub trait GisLookup: Send + Sync {
    /// Provider name for provenance records.
    fn source_name(&self) -> &str;

    /// Queries the point.
    ///
    /// # Errors
    ///
    /// Returns [`GisError`] if the zoning layer cannot be queried or has no
    /// feature at the point. Parcel and individual overlay failures are not
    /// errors; they are reflected in the result.
    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<GisLookupResult, GisError>;
}
