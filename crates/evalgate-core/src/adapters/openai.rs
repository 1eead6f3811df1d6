//! Adapter for the OpenAI Responses API.
//!
//! Builds one `/responses` request per case, asks for strict JSON-schema
//! output when the case requires it, and normalizes the reply: output text,
//! tool calls, usage-derived cost, and the parsed-and-validated structured
//! payload with `route`/`refusal` lifted out of it.

use crate::adapters::normalize::{normalize_tool_calls, tool_names};
use crate::adapters::retry::RetryPolicy;
use crate::adapters::{text_of, truthy, Adapter, AdapterError, RunConfig};
use crate::metrics::estimate_cost_usd;
use crate::model::{Case, Outcome, Refusal, SchemaError, Usage};
use crate::scoring::schema::{routing_schema, CompiledSchema};
use crate::scoring::MAX_SCHEMA_VIOLATIONS;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    policy: RetryPolicy,
}

impl OpenAiAdapter {
    /// Reads `OPENAI_API_KEY` (required) and `OPENAI_BASE_URL` (optional).
    pub fn from_env() -> Result<Self, AdapterError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| AdapterError::Config {
            message: "OPENAI_API_KEY is not set".to_string(),
        })?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Config {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        })
    }

    async fn post_once(&self, req: &Value) -> Result<Value, AdapterError> {
        let url = format!("{}/responses", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(req)
            .send()
            .await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => response
                .json()
                .await
                .map_err(|e| AdapterError::InvalidResponse {
                    message: e.to_string(),
                }),
            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(AdapterError::RateLimited { retry_after })
            }
            500..=599 => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(AdapterError::Server {
                    status: status.as_u16(),
                    message,
                })
            }
            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(AdapterError::InvalidResponse {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                })
            }
        }
    }
}

/// Assembles the wire request. Returns the request plus the structured-output
/// contract the reply will be checked against.
fn build_request(case: &Case, config: &RunConfig) -> (Value, bool, Option<Value>) {
    let model = match case.model.as_deref().filter(|m| !m.is_empty()) {
        Some(model) => model,
        None if !config.model.is_empty() => config.model.as_str(),
        None => DEFAULT_MODEL,
    };

    let mut req = json!({"model": model, "input": case.input});
    if let Some(temperature) = case.temperature {
        req["temperature"] = json!(temperature);
    }
    if let Some(tools) = case.tools.as_ref().filter(|t| truthy(t)) {
        req["tools"] = tools.clone();
    }

    let requires_structured = case.requires_structured_output == Some(true);
    let response_schema = match case.response_schema.as_ref().filter(|s| truthy(s)) {
        Some(schema) => Some(schema.clone()),
        None if requires_structured
            && (case.expected.route.is_some() || case.expected.should_refuse.is_some()) =>
        {
            Some(routing_schema())
        }
        None => None,
    };

    if requires_structured && response_schema.is_some() {
        let schema_name = match case.schema_name.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None if case.id.is_empty() => "case_schema".to_string(),
            None => format!("{}_schema", case.id),
        };
        req["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema_name,
                "schema": response_schema.clone(),
                "strict": true,
            },
        });
    } else if let Some(format) = case.response_format.as_ref().filter(|f| truthy(f)) {
        req["response_format"] = format.clone();
    }

    (req, requires_structured, response_schema)
}

/// `output_text` when present, else the joined `output_text` content parts.
fn extract_text(dump: &Value) -> String {
    if let Some(text) = dump.get("output_text").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_string();
        }
    }
    let mut parts: Vec<&str> = Vec::new();
    for item in dump.get("output").and_then(Value::as_array).into_iter().flatten() {
        for content in item
            .get("content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if content.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(text) = content.get("text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
        }
    }
    parts.join("\n").trim().to_string()
}

fn usage_from_dump(dump: &Value) -> Usage {
    let model = match dump.get("model").filter(|v| !v.is_null()) {
        Some(value) => text_of(Some(value)),
        None => "unknown".to_string(),
    };
    let Some(usage) = dump.get("usage").filter(|v| !v.is_null()) else {
        return Usage {
            model: Some(model),
            ..Usage::default()
        };
    };
    let input_tokens = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
    let output_tokens = usage
        .get("output_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .filter(|&t| t != 0)
        .unwrap_or(input_tokens + output_tokens);
    Usage {
        input_tokens,
        output_tokens,
        total_tokens,
        model: Some(model),
    }
}

/// SDK-parsed payloads win; otherwise the raw text must parse to a JSON
/// object.
fn parse_structured(raw_text: &str, dump: &Value) -> (Option<Value>, Option<String>) {
    for key in ["output_parsed", "parsed"] {
        if let Some(parsed @ Value::Object(_)) = dump.get(key) {
            return (Some(parsed.clone()), None);
        }
    }
    if raw_text.is_empty() {
        return (
            None,
            Some("structured output is not a JSON object".to_string()),
        );
    }
    match serde_json::from_str::<Value>(raw_text) {
        Ok(parsed @ Value::Object(_)) => (Some(parsed), None),
        Ok(_) => (
            None,
            Some("structured output is not a JSON object".to_string()),
        ),
        Err(e) => (None, Some(e.to_string())),
    }
}

fn outcome_from_dump(
    case: &Case,
    dump: &Value,
    requires_structured: bool,
    response_schema: Option<&Value>,
    elapsed_ms: u64,
) -> Outcome {
    let raw_text = extract_text(dump);
    let usage = usage_from_dump(dump);
    let tool_calls = dump
        .get("output")
        .and_then(Value::as_array)
        .map(|items| normalize_tool_calls(items))
        .unwrap_or_default();
    let names = tool_names(&tool_calls);

    let (parsed, parse_error) = if requires_structured {
        parse_structured(&raw_text, dump)
    } else {
        (None, None)
    };

    let mut schema_valid = true;
    let mut schema_errors: Vec<SchemaError> = Vec::new();
    if requires_structured {
        if let Some(schema) = response_schema {
            match &parsed {
                None => schema_valid = false,
                Some(payload) => match CompiledSchema::compile(schema) {
                    Ok(compiled) => {
                        let errs = compiled.errors(payload, MAX_SCHEMA_VIOLATIONS);
                        if !errs.is_empty() {
                            schema_valid = false;
                            schema_errors = errs;
                        }
                    }
                    Err(e) => {
                        schema_valid = false;
                        schema_errors = vec![SchemaError {
                            path: "$".to_string(),
                            message: e.to_string(),
                        }];
                    }
                },
            }
        }
    }

    let mut route = None;
    let mut refusal = None;
    let mut answer = raw_text.clone();
    match parsed.as_ref().and_then(Value::as_object) {
        Some(payload) => {
            route = payload
                .get("route")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(refusal_obj) = payload.get("refusal").and_then(Value::as_object) {
                refusal = Some(Refusal {
                    is_refusal: refusal_obj.get("is_refusal").map(truthy).unwrap_or(false),
                    reason: refusal_obj
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
            if let Some(value) = payload.get("answer").filter(|v| !v.is_null()) {
                answer = text_of(Some(value));
            }
        }
        None if requires_structured => {
            refusal = Some(Refusal {
                is_refusal: false,
                reason: None,
            });
            if response_schema.is_some() {
                schema_valid = false;
            }
        }
        None => {}
    }

    let cost = estimate_cost_usd(
        usage.model.as_deref().unwrap_or("unknown"),
        usage.input_tokens,
        usage.output_tokens,
    );

    Outcome {
        raw_text,
        answer,
        parsed,
        schema_valid,
        schema_errors,
        parse_error,
        tool_calls,
        tool_names: names,
        routing_label: route.clone(),
        route,
        refusal,
        usage,
        latency_ms: Some(elapsed_ms),
        cost_estimate_usd: Some(cost),
        citations: Vec::new(),
        retrieved_context: case.retrieved_context.clone(),
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn execute(&self, case: &Case, config: &RunConfig) -> Result<Outcome, AdapterError> {
        let (req, requires_structured, response_schema) = build_request(case, config);
        let started = Instant::now();
        let dump = self.policy.run(|| self.post_once(&req)).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(outcome_from_dump(
            case,
            &dump,
            requires_structured,
            response_schema.as_ref(),
            elapsed_ms,
        ))
    }
}
