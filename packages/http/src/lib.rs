#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP retry helpers shared by the geocoder, GIS and AI clients.
//!
//! Service clients should use [`send_json`] or [`send_text`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so every request gets
//! exponential backoff on transient failures (timeouts, connection resets,
//! HTTP 429 and 5xx).
//!
//! ```ignore
//! let body = pyxten_http::send_json(RetryPolicy::default(), || {
//!     client.get(&url).query(&params)
//! })
//! .await?;
//! ```

use std::time::Duration;

/// Maximum length of the response body preview included in errors and logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Errors from an HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Transport-level failure (DNS, connect, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Body preview.
        body: String,
    },

    /// The body could not be decoded as JSON.
    #[error("Invalid JSON from {url}: {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

impl HttpError {
    /// Returns `true` if the error was a request timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

/// How many times, and how patiently, a request is retried.
///
/// Interactive lookups run under a per-stage deadline, so the default is
/// short: two retries at 500 ms and 1 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each following retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends a request and parses the body as JSON.
///
/// `build_request` is called once per attempt because builders are consumed
/// by `.send()`.
///
/// # Errors
///
/// Returns [`HttpError`] if every attempt fails, the server returns a
/// non-retryable status, or the body is not valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(policy: RetryPolicy, build_request: F) -> Result<serde_json::Value, HttpError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::warn!(
            "JSON parse failed for {url}: {e}\n  body preview: {}",
            preview(&text)
        );
        HttpError::Decode {
            url,
            message: e.to_string(),
        }
    })
}

/// Sends a request and returns the body as text.
///
/// # Errors
///
/// Returns [`HttpError`] if every attempt fails or the server returns a
/// non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: RetryPolicy, build_request: F) -> Result<String, HttpError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    Ok(response.text().await?)
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(policy: RetryPolicy, build_request: &F) -> Result<reqwest::Response, HttpError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", policy.max_retries);
            tokio::time::sleep(delay).await;
        }
        let can_retry = attempt < policy.max_retries;
        attempt += 1;

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if can_retry && is_transient(&e) => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(HttpError::Request(e)),
        };

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(response);
        }

        if can_retry && is_retryable_status(status) {
            log::warn!("  HTTP {status} from {}", response.url());
            continue;
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status {
            status: status.as_u16(),
            url,
            body: preview(&body).to_string(),
        });
    }
}

/// 429 and 5xx are worth retrying; other 4xx are permanent.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
