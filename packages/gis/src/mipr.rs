//! MIPR (Mapa Interactivo de Puerto Rico) `ArcGIS` client.
//!
//! Queries three `MapServer` services with a buffered point intersection:
//!
//! - Calificación for the zoning district,
//! - Reglamentario for overlay layers,
//! - CRIM parcels for the cadastral number.
//!
//! Layer IDs that are not fixed in the configuration are discovered from
//! the service metadata by name and cached for the client's lifetime.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use pyxten_http::RetryPolicy;
use pyxten_zoning_models::OverlayZone;
use serde_json::{Map, Value};

use crate::service_registry::{self, LayerRef, MiprService};
use crate::{GisError, GisLookup, GisLookupResult};

/// Web Mercator half-circumference in meters.
const WEB_MERCATOR_EXTENT: f64 = 20_037_508.34;

/// Client for the MIPR services.
#[derive(Debug)]
pub struct MiprClient {
    client: reqwest::Client,
    service: MiprService,
    retry: RetryPolicy,
    layer_cache: RwLock<BTreeMap<String, u64>>,
}

type Attributes = Map<String, Value>;

impl MiprClient {
    /// Creates a client from the embedded service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GisError::Config`] if the embedded configuration is invalid.
    pub fn new(client: reqwest::Client) -> Result<Self, GisError> {
        Ok(Self::with_service(client, service_registry::mipr_service()?))
    }

    /// Creates a client with an explicit configuration.
    #[must_use]
    pub fn with_service(client: reqwest::Client, service: MiprService) -> Self {
        Self {
            client,
            service,
            retry: RetryPolicy::default(),
            layer_cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Resolves a layer's numeric ID, from configuration, cache or service
    /// metadata.
    async fn layer_id(&self, layer: &impl LayerRef) -> Result<u64, GisError> {
        if let Some(id) = layer.layer_id() {
            return Ok(id);
        }

        let key = format!("{}:{}", layer.service_url(), layer.layer_name());
        if let Some(id) = self
            .layer_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&key).copied())
        {
            return Ok(id);
        }

        let metadata = pyxten_http::send_json(self.retry, || {
            self.client
                .get(layer.service_url())
                .query(&[("f", "json")])
        })
        .await?;

        let id = find_layer_id(&metadata, layer.layer_name()).ok_or_else(|| {
            GisError::LayerNotFound {
                service_url: layer.service_url().to_string(),
                layer: layer.layer_name().to_string(),
            }
        })?;
        log::debug!("Discovered layer '{}' = {id}", layer.layer_name());

        if let Ok(mut cache) = self.layer_cache.write() {
            cache.insert(key, id);
        }
        Ok(id)
    }

    /// Runs a buffered point query and returns the first feature's
    /// attributes.
    async fn query_point(
        &self,
        layer: &impl LayerRef,
        point: (f64, f64),
    ) -> Result<Option<Attributes>, GisError> {
        let layer_id = self.layer_id(layer).await?;
        let url = format!("{}/{layer_id}/query", layer.service_url());
        let geometry = format!("{},{}", point.0, point.1);
        let distance = self.service.buffer_meters.to_string();

        let body = pyxten_http::send_json(self.retry, || {
            self.client.get(&url).query(&[
                ("geometry", geometry.as_str()),
                ("geometryType", "esriGeometryPoint"),
                ("inSR", "3857"),
                ("spatialRel", "esriSpatialRelIntersects"),
                ("distance", distance.as_str()),
                ("units", "esriSRUnit_Meter"),
                ("outFields", "*"),
                ("returnGeometry", "false"),
                ("f", "json"),
            ])
        })
        .await?;

        first_feature_attributes(&body)
    }

    async fn zoning(&self, point: (f64, f64)) -> Result<Option<Attributes>, GisError> {
        self.query_point(&self.service.zoning, point).await
    }

    async fn parcel(&self, point: (f64, f64)) -> Option<String> {
        match self.query_point(&self.service.parcels, point).await {
            Ok(Some(attrs)) => pick_string(&attrs, &self.service.parcels.id_fields),
            Ok(None) => None,
            Err(e) => {
                log::warn!("Parcel lookup failed: {e}");
                None
            }
        }
    }

    async fn overlays(&self, point: (f64, f64)) -> (Vec<OverlayZone>, Vec<String>) {
        let mut found: Vec<OverlayZone> = Vec::new();
        let mut failed = Vec::new();

        for bound in self.service.overlays.bound_layers() {
            match self.query_point(&bound, point).await {
                Ok(Some(attrs)) => {
                    if found.iter().any(|o| o.overlay_type == bound.layer.overlay_type) {
                        continue;
                    }
                    found.push(OverlayZone {
                        overlay_type: bound.layer.overlay_type.clone(),
                        description: pick_string(&attrs, &self.service.overlays.description_fields)
                            .unwrap_or_default(),
                        severity: bound.layer.severity,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Overlay layer '{}' failed: {e}", bound.layer.layer_name);
                    failed.push(bound.layer.overlay_type.clone());
                }
            }
        }

        (found, failed)
    }
}

#[async_trait]
impl GisLookup for MiprClient {
    fn source_name(&self) -> &str {
        &self.service.name
    }

    async fn lookup(&self, latitude: f64, longitude: f64) -> Result<GisLookupResult, GisError> {
        let point = to_web_mercator(latitude, longitude);

        let (zoning, parcel_id, (overlays, failed_overlay_layers)) =
            tokio::join!(self.zoning(point), self.parcel(point), self.overlays(point));

        let attrs = zoning?.ok_or(GisError::NoZoning {
            latitude,
            longitude,
        })?;

        let zoning_layer = &self.service.zoning;
        let zoning_raw_code =
            pick_string(&attrs, &zoning_layer.code_fields).ok_or_else(|| GisError::Parse {
                message: format!(
                    "Zoning feature has none of the fields {:?}",
                    zoning_layer.code_fields
                ),
            })?;

        Ok(GisLookupResult {
            zoning_raw_code,
            zoning_display_name: pick_string(&attrs, &zoning_layer.name_fields),
            overlays,
            parcel_id,
            last_updated: zoning_layer
                .date_fields
                .iter()
                .find_map(|f| attrs.get(f).and_then(parse_date)),
            freshness_warning: self.service.freshness_warning.clone(),
            failed_overlay_layers,
        })
    }
}

/// Converts WGS84 degrees to Web Mercator (EPSG:3857) meters.
#[must_use]
pub fn to_web_mercator(latitude: f64, longitude: f64) -> (f64, f64) {
    let x = longitude * WEB_MERCATOR_EXTENT / 180.0;
    let y = ((90.0 + latitude) * std::f64::consts::PI / 360.0).tan().ln()
        / (std::f64::consts::PI / 180.0);
    (x, y * WEB_MERCATOR_EXTENT / 180.0)
}

/// Finds a layer or table whose name contains `name` (case-insensitive).
#[must_use]
pub fn find_layer_id(metadata: &Value, name: &str) -> Option<u64> {
    let needle = name.to_lowercase();
    ["layers", "tables"]
        .iter()
        .filter_map(|key| metadata[*key].as_array())
        .flatten()
        .find(|layer| {
            layer["name"]
                .as_str()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
        })
        .and_then(|layer| layer["id"].as_u64())
}

/// Attributes of the first feature in a query response.
///
/// # Errors
///
/// Returns [`GisError::Service`] for an `ArcGIS` error payload and
/// [`GisError::Parse`] if the body has no `features` array.
pub fn first_feature_attributes(body: &Value) -> Result<Option<Attributes>, GisError> {
    if let Some(error) = body.get("error") {
        return Err(GisError::Service {
            message: error["message"]
                .as_str()
                .unwrap_or("unknown ArcGIS error")
                .to_string(),
        });
    }

    let features = body["features"].as_array().ok_or_else(|| GisError::Parse {
        message: "Query response has no features array".to_string(),
    })?;

    Ok(features
        .first()
        .and_then(|f| f["attributes"].as_object())
        .cloned())
}

/// First non-empty value among `fields`. Numeric IDs are stringified.
fn pick_string(attrs: &Attributes, fields: &[String]) -> Option<String> {
    fields.iter().find_map(|field| match attrs.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `ArcGIS` dates are epoch milliseconds; some layers store strings.
fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
                .ok()
        }
        _ => None,
    }
}
