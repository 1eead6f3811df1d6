//! Backend adapters.
//!
//! An adapter turns one [`Case`] into one [`Outcome`]. This is the only
//! extension point; everything downstream (scoring, aggregation, gating) is
//! adapter-agnostic. Transient transport failures are retried inside the
//! adapter per its [`retry::RetryPolicy`]; an exhausted or non-retryable
//! error fails the case, never the run.

pub mod http_app;
pub mod normalize;
pub mod offline;
pub mod openai;
pub mod retry;

use crate::model::{Case, Outcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Adapter selection for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Offline,
    HttpApp,
    OpenAi,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Offline => "offline",
            Mode::HttpApp => "http_app",
            Mode::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level knobs shared by every case.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    /// Base URL of the application under test (http_app mode).
    pub app_url: String,
    /// Default model when the case does not name one (openai mode).
    pub model: String,
}

/// Adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Backend asked us to slow down (HTTP 429).
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Backend-side failure (HTTP 5xx).
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Request timed out in transit.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// Backend replied with something we cannot interpret.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Adapter misconfiguration (missing key, bad URL).
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AdapterError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Timeout | Self::Network { .. }
        )
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// One backend integration.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, case: &Case, config: &RunConfig) -> Result<Outcome, AdapterError>;
}

/// Builds the adapter for a mode. openai mode requires `OPENAI_API_KEY`.
pub fn for_mode(mode: Mode) -> Result<Arc<dyn Adapter>, AdapterError> {
    match mode {
        Mode::Offline => Ok(Arc::new(offline::OfflineAdapter)),
        Mode::HttpApp => Ok(Arc::new(http_app::HttpAppAdapter::new()?)),
        Mode::OpenAi => Ok(Arc::new(openai::OpenAiAdapter::from_env()?)),
    }
}

/// Plain text of a loosely-typed JSON field: strings verbatim, null/absent
/// empty, anything else rendered as JSON.
pub(crate) fn text_of(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Truthiness of a JSON value: null, false, 0, "" and empty containers are
/// false.
pub(crate) fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().map(|v| text_of(Some(v))).collect())
        .unwrap_or_default()
}

/// Citation items; malformed entries keep their slot with an empty quote so
/// grounding checks still flag them.
pub(crate) fn citation_list(value: &serde_json::Value) -> Vec<crate::model::Citation> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}
