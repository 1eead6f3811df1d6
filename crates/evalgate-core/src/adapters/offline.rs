//! Deterministic adapter for CI and local dry runs.
//!
//! No backend is called: the outcome is synthesized from the case's
//! `offline_response` payload, falling back to the case's own expectations.
//! A case with `simulate_failure_mode` set keeps its expected route and
//! tools but gets a degraded answer, so such rows land in the confusion
//! matrix without polluting perf aggregates.

use crate::adapters::{citation_list, string_list, text_of, truthy, Adapter, AdapterError, RunConfig};
use crate::metrics::estimate_cost_usd;
use crate::model::{Case, Outcome, Refusal, ToolCall, Usage};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Instant;

pub struct OfflineAdapter;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

fn synthetic_field<'a>(synthetic: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    synthetic.and_then(|m| m.get(key)).filter(|v| !v.is_null())
}

fn synthesize(case: &Case) -> Outcome {
    let started = Instant::now();
    let synthetic = case.offline_response.as_ref().and_then(Value::as_object);

    let answer = match synthetic_field(synthetic, "answer") {
        Some(value) => text_of(Some(value)),
        None => case.input.clone(),
    };
    let answer = match case.simulate_failure_mode.as_deref().filter(|m| !m.is_empty()) {
        Some(mode) => format!("simulated {mode} failure"),
        None => answer,
    };

    let route = synthetic_field(synthetic, "route")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| case.expected.route.clone());

    let refused = match synthetic.and_then(|m| m.get("refusal")) {
        Some(value) => truthy(value),
        None => case.expected.should_refuse.unwrap_or(false),
    };

    let tool_names: Vec<String> = match synthetic.and_then(|m| m.get("tool_names")) {
        Some(value) => string_list(value),
        None => case.expected.tools.clone().unwrap_or_default(),
    };

    let usage = match synthetic.and_then(|m| m.get("usage")) {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_default(),
        None => Usage {
            input_tokens: 50,
            output_tokens: 120,
            total_tokens: 170,
            model: Some(DEFAULT_MODEL.to_string()),
        },
    };

    let (latency_ms, cost_estimate_usd) = match synthetic
        .and_then(|m| m.get("telemetry"))
        .and_then(Value::as_object)
    {
        Some(telemetry) => (
            telemetry.get("latency_ms").and_then(Value::as_u64),
            telemetry.get("cost_estimate_usd").and_then(Value::as_f64),
        ),
        None => (
            Some(started.elapsed().as_millis() as u64),
            Some(estimate_cost_usd(
                usage.model.as_deref().unwrap_or(DEFAULT_MODEL),
                usage.input_tokens,
                usage.output_tokens,
            )),
        ),
    };

    let refusal = Refusal {
        is_refusal: refused,
        reason: refused.then(|| "OFFLINE_REFUSAL".to_string()),
    };

    let wants_structured = case.requires_structured_output == Some(true)
        && case.response_schema.as_ref().is_some_and(truthy);
    let (parsed, raw_text) = if wants_structured {
        let payload = json!({
            "route": route.as_deref().unwrap_or("unknown"),
            "answer": answer,
            "refusal": {"is_refusal": refusal.is_refusal, "reason": refusal.reason},
        });
        let raw_text = payload.to_string();
        (Some(payload), raw_text)
    } else {
        (None, answer.clone())
    };

    let tool_calls = tool_names
        .iter()
        .map(|name| ToolCall {
            name: name.clone(),
            arguments: Value::Null,
            raw: Value::Null,
        })
        .collect();

    let citations = synthetic_field(synthetic, "citations")
        .map(citation_list)
        .unwrap_or_default();
    let retrieved_context = match synthetic_field(synthetic, "retrieved_context") {
        Some(value) => string_list(value),
        None => case.retrieved_context.clone(),
    };

    Outcome {
        raw_text,
        answer,
        parsed,
        tool_calls,
        tool_names,
        routing_label: route.clone(),
        route,
        refusal: Some(refusal),
        usage,
        latency_ms,
        cost_estimate_usd,
        citations,
        retrieved_context,
        ..Outcome::default()
    }
}

#[async_trait]
impl Adapter for OfflineAdapter {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn execute(&self, case: &Case, _config: &RunConfig) -> Result<Outcome, AdapterError> {
        Ok(synthesize(case))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Expectations;
    use crate::scoring::schema::routing_schema;

    fn base_case() -> Case {
        Case {
            id: "c1".to_string(),
            input: "What is our refund policy?".to_string(),
            expected: Expectations {
                route: Some("tech".to_string()),
                tools: Some(vec!["file_search".to_string()]),
                ..Expectations::default()
            },
            ..Case::default()
        }
    }

    #[tokio::test]
    async fn expectations_seed_the_synthetic_outcome() {
        let outcome = OfflineAdapter
            .execute(&base_case(), &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.answer, "What is our refund policy?");
        assert_eq!(outcome.route.as_deref(), Some("tech"));
        assert_eq!(outcome.tool_names, ["file_search"]);
        assert!(!outcome.refusal.as_ref().unwrap().is_refusal);
        assert_eq!(outcome.usage.total_tokens, 170);
        // mini rates for the default model
        assert_eq!(outcome.cost_estimate_usd, Some(0.000082));
        assert!(outcome.schema_valid);
    }

    #[tokio::test]
    async fn synthetic_payload_overrides_expectations() {
        let mut case = base_case();
        case.offline_response = Some(json!({
            "answer": "canned",
            "route": "marketing",
            "refusal": true,
            "tool_names": ["web_search"],
            "usage": {"input_tokens": 10, "output_tokens": 20, "total_tokens": 30, "model": "gpt-4o"},
            "telemetry": {"latency_ms": 42, "cost_estimate_usd": 0.5},
        }));
        let outcome = OfflineAdapter
            .execute(&case, &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.answer, "canned");
        assert_eq!(outcome.route.as_deref(), Some("marketing"));
        assert_eq!(outcome.tool_names, ["web_search"]);
        let refusal = outcome.refusal.unwrap();
        assert!(refusal.is_refusal);
        assert_eq!(refusal.reason.as_deref(), Some("OFFLINE_REFUSAL"));
        assert_eq!(outcome.latency_ms, Some(42));
        assert_eq!(outcome.cost_estimate_usd, Some(0.5));
        assert_eq!(outcome.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn structured_cases_get_a_parsed_routing_payload() {
        let mut case = base_case();
        case.requires_structured_output = Some(true);
        case.response_schema = Some(routing_schema());
        let outcome = OfflineAdapter
            .execute(&case, &RunConfig::default())
            .await
            .unwrap();
        let parsed = outcome.parsed.expect("parsed payload");
        assert_eq!(parsed["route"], "tech");
        assert_eq!(parsed["refusal"]["is_refusal"], false);
        assert_eq!(outcome.raw_text, parsed.to_string());
    }

    #[tokio::test]
    async fn failure_injection_degrades_the_answer_only() {
        let mut case = base_case();
        case.simulate_failure_mode = Some("timeout".to_string());
        let outcome = OfflineAdapter
            .execute(&case, &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.answer, "simulated timeout failure");
        assert_eq!(outcome.route.as_deref(), Some("tech"));
        assert_eq!(outcome.tool_names, ["file_search"]);
    }

    #[tokio::test]
    async fn expected_refusal_sets_reason() {
        let mut case = base_case();
        case.expected.should_refuse = Some(true);
        let outcome = OfflineAdapter
            .execute(&case, &RunConfig::default())
            .await
            .unwrap();
        let refusal = outcome.refusal.unwrap();
        assert!(refusal.is_refusal);
        assert_eq!(refusal.reason.as_deref(), Some("OFFLINE_REFUSAL"));
    }
}
