#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zoning compatibility resolution.
//!
//! [`ResolutionPipeline`] turns a [`ValidationRequest`] (address,
//! municipality and a free-text use description) into a
//! [`ValidationReport`]: geocode the address, look up zoning and overlays at
//! the point, translate legacy zoning codes, classify the use, evaluate
//! compatibility, apply overlay restrictions and score the result with the
//! [`aggregator`].
//!
//! Adapter failures never escape a run. They end it in one of the failure
//! variants of [`ValidationReport`] with zero confidence.

pub mod aggregator;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod request;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::ResolutionPipeline;
pub use report::ValidationReport;
pub use request::{InputError, ValidationRequest};
