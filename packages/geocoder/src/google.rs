//! Google Geocoding API client.
//!
//! Queries are sent as `"{address}, {municipality}, Puerto Rico"`, biased to
//! the `pr` region with Spanish results.
//!
//! See <https://developers.google.com/maps/documentation/geocoding/requests-geocoding>

use async_trait::async_trait;
use pyxten_http::RetryPolicy;
use pyxten_zoning_models::{Coordinate, Precision};

use crate::{GeocodeError, GeocodeOutcome, GeocodedAddress, Geocoder};

/// Default endpoint.
pub const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "GOOGLE_MAPS_API_KEY";

const COUNTRY: &str = "Puerto Rico";

/// Geocoder backed by the Google Geocoding API.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GoogleGeocoder {
    /// Creates a client with an explicit key.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: GEOCODE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Creates a client using the key from `GOOGLE_MAPS_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::MissingApiKey`] if the variable is unset or
    /// empty.
    pub fn from_env(client: reqwest::Client) -> Result<Self, GeocodeError> {
        let key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(GeocodeError::MissingApiKey { var: API_KEY_VAR })?;
        Ok(Self::new(client, key))
    }

    /// Overrides the endpoint (for proxies and test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn source_name(&self) -> &str {
        "Google Maps Geocoding API"
    }

    async fn geocode(
        &self,
        address: &str,
        municipality: &str,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let query = format!("{address}, {municipality}, {COUNTRY}");
        log::debug!("Geocoding '{query}'");

        let body = pyxten_http::send_json(self.retry, || {
            self.client.get(&self.base_url).query(&[
                ("address", query.as_str()),
                ("key", self.api_key.as_str()),
                ("region", "pr"),
                ("language", "es"),
            ])
        })
        .await?;

        parse_response(&body, municipality)
    }
}

/// Parses a Geocoding API response body.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body lacks a `status`, or an `OK`
/// response lacks the first result's location.
pub fn parse_response(
    body: &serde_json::Value,
    municipality: &str,
) -> Result<GeocodeOutcome, GeocodeError> {
    let status = body["status"].as_str().ok_or_else(|| GeocodeError::Parse {
        message: "Geocoding response has no status".to_string(),
    })?;

    match status {
        "OK" => {}
        "ZERO_RESULTS" => {
            return Ok(GeocodeOutcome::Invalid {
                reason: "Address not found".to_string(),
            });
        }
        other => {
            let detail = body["error_message"].as_str().unwrap_or_default();
            return Ok(GeocodeOutcome::Invalid {
                reason: format!("Geocoding service returned {other} {detail}")
                    .trim_end()
                    .to_string(),
            });
        }
    }

    let Some(first) = body["results"].as_array().and_then(|r| r.first()) else {
        return Ok(GeocodeOutcome::Invalid {
            reason: "Address not found".to_string(),
        });
    };

    let formatted_address = first["formatted_address"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    if !is_in_puerto_rico(first) {
        return Ok(GeocodeOutcome::Invalid {
            reason: format!("Address is not in Puerto Rico: {formatted_address}"),
        });
    }

    let geometry = &first["geometry"];
    let lat = geometry["location"]["lat"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in geocoding response".to_string(),
        })?;
    let lng = geometry["location"]["lng"]
        .as_f64()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lng in geocoding response".to_string(),
        })?;
    let precision = geometry["location_type"]
        .as_str()
        .and_then(|t| t.parse::<Precision>().ok())
        .unwrap_or(Precision::Approximate);

    let coordinate = Coordinate::new(lat, lng, precision);
    if !coordinate.is_valid() {
        return Err(GeocodeError::Parse {
            message: format!("Coordinate out of range: {lat}, {lng}"),
        });
    }

    let mut warnings = Vec::new();
    if !formatted_address
        .to_lowercase()
        .contains(&municipality.trim().to_lowercase())
    {
        warnings.push(format!(
            "Municipality '{municipality}' does not match geocoded address '{formatted_address}'"
        ));
    }

    Ok(GeocodeOutcome::Matched(GeocodedAddress {
        coordinate,
        formatted_address,
        warnings,
    }))
}

/// Google reports Puerto Rico as a country (`PR`). Some results list it as a
/// first-level administrative area of the US instead.
fn is_in_puerto_rico(result: &serde_json::Value) -> bool {
    let Some(components) = result["address_components"].as_array() else {
        return false;
    };

    components.iter().any(|c| {
        let types = c["types"].as_array();
        let has_type = |wanted: &str| {
            types.is_some_and(|t| t.iter().any(|v| v.as_str() == Some(wanted)))
        };
        (has_type("country") || has_type("administrative_area_level_1"))
            && (c["short_name"].as_str() == Some("PR") || c["long_name"].as_str() == Some(COUNTRY))
    })
}
