//! Adapter for an application backend spoken to over HTTP.
//!
//! POSTs each case to `{app_url}{endpoint}` and maps the JSON reply onto an
//! [`Outcome`]. 429 and 5xx replies are retried per the policy; other error
//! statuses map their body onto a degraded outcome so the case fails on its
//! own merits instead of aborting the run.

use crate::adapters::normalize::{normalize_tool_calls, tool_names};
use crate::adapters::retry::RetryPolicy;
use crate::adapters::{
    citation_list, string_list, text_of, truthy, Adapter, AdapterError, RunConfig,
};
use crate::model::{Case, Outcome, Refusal, SchemaError, Usage};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_APP_URL: &str = "http://localhost:8000";
const DEFAULT_ENDPOINT: &str = "/chat_text";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpAppAdapter {
    client: reqwest::Client,
    policy: RetryPolicy,
}

enum HttpReply {
    Success(Map<String, Value>),
    /// Non-retryable error status with whatever body came back.
    ErrorBody { status: u16, body: String },
}

impl HttpAppAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Config {
                message: e.to_string(),
            })?;
        Ok(Self { client, policy })
    }

    async fn post_once(&self, url: &str, payload: &Value) -> Result<HttpReply, AdapterError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AdapterError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(AdapterError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if status.is_success() {
            let body: Value =
                response
                    .json()
                    .await
                    .map_err(|e| AdapterError::InvalidResponse {
                        message: e.to_string(),
                    })?;
            let Value::Object(map) = body else {
                return Err(AdapterError::InvalidResponse {
                    message: "response body is not a JSON object".to_string(),
                });
            };
            return Ok(HttpReply::Success(map));
        }

        let body = response.text().await.unwrap_or_default();
        Ok(HttpReply::ErrorBody {
            status: status.as_u16(),
            body,
        })
    }
}

fn schema_error_list(value: &Value) -> Vec<SchemaError> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| SchemaError {
                    path: item
                        .get("path")
                        .and_then(Value::as_str)
                        .unwrap_or("$")
                        .to_string(),
                    message: match item.get("message") {
                        Some(message) => text_of(Some(message)),
                        None => text_of(Some(item)),
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

fn refusal_of(value: Option<&Value>) -> Option<Refusal> {
    let obj = value?.as_object()?;
    let is_refusal = truthy(obj.get("is_refusal")?);
    Some(Refusal {
        is_refusal,
        reason: obj
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Latency prefers the body's top-level value, cost the telemetry block;
/// both skip zero the way a reported-but-empty field should be skipped.
fn resolve_timing(body: &Map<String, Value>, elapsed_ms: u64) -> (u64, Option<f64>) {
    let telemetry = body.get("telemetry").and_then(Value::as_object);
    let latency = body
        .get("latency_ms")
        .and_then(Value::as_u64)
        .filter(|&v| v != 0)
        .or_else(|| {
            telemetry
                .and_then(|t| t.get("latency_ms"))
                .and_then(Value::as_u64)
                .filter(|&v| v != 0)
        })
        .unwrap_or(elapsed_ms);
    let cost = telemetry
        .and_then(|t| t.get("cost_estimate_usd"))
        .and_then(Value::as_f64)
        .filter(|&c| c != 0.0)
        .or_else(|| body.get("cost_estimate_usd").and_then(Value::as_f64));
    (latency, cost)
}

fn outcome_from_body(body: &Map<String, Value>, elapsed_ms: u64) -> Outcome {
    let field = |key: &str| body.get(key).filter(|v| !v.is_null());

    let answer = text_of(body.get("answer"));
    let raw_text = match field("raw_text") {
        Some(value) => text_of(Some(value)),
        None => answer.clone(),
    };
    let tool_calls = field("tool_calls")
        .and_then(Value::as_array)
        .map(|items| normalize_tool_calls(items))
        .unwrap_or_default();
    let names = match field("tool_names") {
        Some(value) => string_list(value),
        None => tool_names(&tool_calls),
    };
    let (latency_ms, cost_estimate_usd) = resolve_timing(body, elapsed_ms);

    Outcome {
        raw_text,
        answer,
        parsed: field("parsed").cloned(),
        schema_valid: body
            .get("schema_valid")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        schema_errors: field("schema_errors")
            .map(schema_error_list)
            .unwrap_or_default(),
        parse_error: field("parse_error").map(|v| text_of(Some(v))),
        tool_calls,
        tool_names: names,
        route: field("route")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        routing_label: body
            .get("routing")
            .and_then(|r| r.get("label"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        refusal: refusal_of(body.get("refusal")),
        usage: field("usage")
            .map(|v| serde_json::from_value(v.clone()).unwrap_or_default())
            .unwrap_or_default(),
        latency_ms: Some(latency_ms),
        cost_estimate_usd,
        citations: field("citations").map(citation_list).unwrap_or_default(),
        retrieved_context: field("retrieved_context")
            .map(string_list)
            .unwrap_or_default(),
    }
}

fn error_outcome(status: u16, raw: &str, elapsed_ms: u64) -> Outcome {
    let body = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("error".to_string(), Value::String(raw.to_string()));
            map
        }
    };

    let mut outcome = outcome_from_body(&body, elapsed_ms);
    outcome.schema_valid = body
        .get("schema_valid")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if outcome.refusal.is_none() {
        outcome.refusal = Some(Refusal {
            is_refusal: false,
            reason: None,
        });
    }
    if outcome.parse_error.is_none() {
        outcome.parse_error = Some(match body.get("error").filter(|v| !v.is_null()) {
            Some(error) => text_of(Some(error)),
            None => "http_error".to_string(),
        });
    }
    if body.get("usage").is_none() {
        outcome.usage = Usage {
            model: Some("unknown".to_string()),
            ..Usage::default()
        };
    }
    if outcome.cost_estimate_usd.is_none() {
        outcome.cost_estimate_usd = Some(0.0);
    }
    debug!(status, "mapped http error body onto degraded outcome");
    outcome
}

#[async_trait]
impl Adapter for HttpAppAdapter {
    fn name(&self) -> &'static str {
        "http_app"
    }

    async fn execute(&self, case: &Case, config: &RunConfig) -> Result<Outcome, AdapterError> {
        let base_url = if config.app_url.is_empty() {
            DEFAULT_APP_URL
        } else {
            config.app_url.as_str()
        };
        let endpoint = case.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let payload = match &case.request {
            Some(request) if truthy(request) => request.clone(),
            _ => json!({"message": case.input, "tenant_id": "evalgate"}),
        };
        let url = format!("{base_url}{endpoint}");

        let started = Instant::now();
        let reply = self.policy.run(|| self.post_once(&url, &payload)).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(match reply {
            HttpReply::Success(body) => outcome_from_body(&body, elapsed_ms),
            HttpReply::ErrorBody { status, body } => error_outcome(status, &body, elapsed_ms),
        })
    }
}
