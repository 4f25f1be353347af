//! Compile-time configuration of the MIPR ArcGIS services.
//!
//! Endpoints, field names and overlay layers live in `services/mipr.toml`
//! and are embedded at compile time.

use pyxten_zoning_models::Severity;
use serde::Deserialize;

use crate::GisError;

const MIPR_TOML: &str = include_str!("../services/mipr.toml");

/// Full MIPR service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MiprService {
    /// Identifier (e.g. `"mipr"`).
    pub id: String,
    /// Human-readable name used in provenance records.
    pub name: String,
    /// Search radius around the query point.
    pub buffer_meters: u32,
    /// Standing caveat about data freshness, if the provider publishes one.
    #[serde(default)]
    pub freshness_warning: Option<String>,
    /// Zoning (Calificación) layer.
    pub zoning: ZoningLayer,
    /// CRIM parcel layer.
    pub parcels: ParcelLayer,
    /// Reglamentario overlay layers.
    pub overlays: OverlayService,
}

/// A layer addressed either by a fixed ID or by discovering its name in the
/// service metadata.
pub trait LayerRef {
    /// MapServer URL.
    fn service_url(&self) -> &str;
    /// Fixed layer ID, if known.
    fn layer_id(&self) -> Option<u64>;
    /// Substring to search for in the service's layer names.
    fn layer_name(&self) -> &str;
}

/// Zoning layer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoningLayer {
    /// MapServer URL.
    pub service_url: String,
    /// Fixed layer ID.
    #[serde(default)]
    pub layer_id: Option<u64>,
    /// Layer name to discover.
    pub layer_name: String,
    /// Attribute fields holding the district code, in priority order.
    pub code_fields: Vec<String>,
    /// Attribute fields holding the district description.
    pub name_fields: Vec<String>,
    /// Attribute fields holding the last-update date.
    #[serde(default)]
    pub date_fields: Vec<String>,
}

/// Parcel layer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ParcelLayer {
    /// MapServer URL.
    pub service_url: String,
    /// Fixed layer ID.
    #[serde(default)]
    pub layer_id: Option<u64>,
    /// Layer name to discover.
    pub layer_name: String,
    /// Attribute fields holding the cadastral number.
    pub id_fields: Vec<String>,
}

/// Overlay service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayService {
    /// MapServer URL.
    pub service_url: String,
    /// Attribute fields holding a feature description.
    #[serde(default)]
    pub description_fields: Vec<String>,
    /// Layers queried for overlays.
    #[serde(rename = "layer")]
    pub layers: Vec<OverlayLayer>,
}

/// One overlay layer of the Reglamentario service.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayLayer {
    /// Fixed layer ID.
    #[serde(default)]
    pub layer_id: Option<u64>,
    /// Layer name to discover.
    pub layer_name: String,
    /// Overlay type reported for features of this layer.
    pub overlay_type: String,
    /// Severity reported for features of this layer.
    pub severity: Severity,
}

/// An overlay layer bound to its service URL.
#[derive(Debug, Clone, Copy)]
pub struct BoundOverlayLayer<'a> {
    /// Overlay MapServer URL.
    pub service_url: &'a str,
    /// Layer configuration.
    pub layer: &'a OverlayLayer,
}

impl LayerRef for ZoningLayer {
    fn service_url(&self) -> &str {
        &self.service_url
    }
    fn layer_id(&self) -> Option<u64> {
        self.layer_id
    }
    fn layer_name(&self) -> &str {
        &self.layer_name
    }
}

impl LayerRef for ParcelLayer {
    fn service_url(&self) -> &str {
        &self.service_url
    }
    fn layer_id(&self) -> Option<u64> {
        self.layer_id
    }
    fn layer_name(&self) -> &str {
        &self.layer_name
    }
}

impl LayerRef for BoundOverlayLayer<'_> {
    fn service_url(&self) -> &str {
        self.service_url
    }
    fn layer_id(&self) -> Option<u64> {
        self.layer.layer_id
    }
    fn layer_name(&self) -> &str {
        &self.layer.layer_name
    }
}

impl OverlayService {
    /// Iterates layers together with the service URL.
    pub fn bound_layers(&self) -> impl Iterator<Item = BoundOverlayLayer<'_>> {
        self.layers.iter().map(|layer| BoundOverlayLayer {
            service_url: &self.service_url,
            layer,
        })
    }
}

/// Parses the embedded MIPR configuration.
///
/// # Errors
///
/// Returns [`GisError::Config`] if the embedded TOML is malformed.
pub fn mipr_service() -> Result<MiprService, GisError> {
    parse_service(MIPR_TOML)
}

/// Parses a service configuration from TOML.
///
/// # Errors
///
/// Returns [`GisError::Config`] if the TOML is malformed or lists no
/// zoning code fields.
pub fn parse_service(toml_str: &str) -> Result<MiprService, GisError> {
    let service: MiprService = toml::de::from_str(toml_str).map_err(|e| GisError::Config {
        message: e.to_string(),
    })?;
    if service.zoning.code_fields.is_empty() {
        return Err(GisError::Config {
            message: "zoning.code_fields is empty".to_string(),
        });
    }
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_service_parses() {
        let service = mipr_service().unwrap();
        assert_eq!(service.id, "mipr");
        assert_eq!(service.buffer_meters, 10);
        assert_eq!(service.zoning.code_fields[0], "cali");
        assert_eq!(service.overlays.layers.len(), 4);
        assert!(service.freshness_warning.is_some());
    }

    #[test]
    fn fema_layer_has_fixed_id() {
        let service = mipr_service().unwrap();
        let fema = service
            .overlays
            .bound_layers()
            .find(|l| l.layer_name() == "fema")
            .unwrap();
        assert_eq!(fema.layer_id(), Some(32));
        assert!(fema.service_url().ends_with("Reglamentario/MapServer"));
    }
}
