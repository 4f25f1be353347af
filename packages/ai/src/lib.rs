#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Natural-language land-use classification.
//!
//! A [`classifier::UseClassifier`] turns a free-text description such as
//! *"quiero construir una residencia con una panadería"* into candidate use
//! codes with a self-reported confidence. Candidates are *proposals*: the
//! caller must check every code against the use catalog before trusting it.
//!
//! Two implementations are provided:
//!
//! - [`classifier::LlmUseClassifier`] prompts an LLM
//!   ([`providers::LlmProvider`]: Anthropic Claude, `OpenAI`, or any
//!   `OpenAI`-compatible server via `AI_BASE_URL`).
//! - [`keyword::KeywordUseClassifier`] matches catalog keywords offline.

pub mod classifier;
pub mod keyword;
pub mod providers;

use thiserror::Error;

/// Errors that can occur during AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP exchange with the provider failed.
    #[error(transparent)]
    Http(#[from] pyxten_http::HttpError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// Model output could not be interpreted.
    #[error("Could not parse model response: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}
