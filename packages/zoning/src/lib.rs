#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static rule tables of the Reglamento Conjunto and the pure functions that
//! evaluate them.
//!
//! The tables are TOML files under `catalog/`, embedded at compile time and
//! parsed once into a [`RegulationCatalog`]:
//!
//! - `districts.toml`: current zoning districts ([`districts`]).
//! - `uses.toml`: normalized land-use types ([`taxonomy`]).
//! - `equivalency.toml`: legacy municipal code translations
//!   ([`equivalency`]).
//!
//! The catalog is immutable after loading and is meant to be shared behind an
//! `Arc` by every request. [`compatibility`] and [`overlay`] are stateless
//! rule evaluations over catalog data.

pub mod catalog;
pub mod compatibility;
pub mod districts;
pub mod equivalency;
pub mod overlay;
pub mod taxonomy;

pub use catalog::{CatalogError, RegulationCatalog};
