#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address geocoding.
//!
//! The [`Geocoder`] trait is what the validation pipeline consumes. A
//! geocoder either pins the address ([`GeocodeOutcome::Matched`]), decides
//! the address is not usable ([`GeocodeOutcome::Invalid`], e.g. zero
//! results or a result outside Puerto Rico), or fails to answer at all
//! ([`GeocodeError`]).
//!
//! [`google::GoogleGeocoder`] is the production implementation.

pub mod google;

use async_trait::async_trait;
use pyxten_zoning_models::Coordinate;
use serde::Serialize;
use thiserror::Error;

/// A successfully geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedAddress {
    /// Point and match precision.
    pub coordinate: Coordinate,
    /// Canonical address returned by the provider.
    pub formatted_address: String,
    /// Non-fatal issues with the match (e.g. municipality mismatch).
    pub warnings: Vec<String>,
}

/// What a geocoder made of an address.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    /// The address was located.
    Matched(GeocodedAddress),
    /// The address could not be located or is not usable.
    Invalid {
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP exchange failed.
    #[error(transparent)]
    Http(#[from] pyxten_http::HttpError),

    /// Response did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// No API key configured.
    #[error("Missing API key: set {var}")]
    MissingApiKey {
        /// Environment variable that should hold the key.
        var: &'static str,
    },
}

/// Resolves a street address to a coordinate.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Provider name for provenance records.
    fn source_name(&self) -> &str;

    /// Geocodes `address` inside `municipality`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the provider could not be reached or
    /// returned a malformed payload. An address that simply was not found is
    /// [`GeocodeOutcome::Invalid`], not an error.
    async fn geocode(&self, address: &str, municipality: &str)
    -> Result<GeocodeOutcome, GeocodeError>;
}
