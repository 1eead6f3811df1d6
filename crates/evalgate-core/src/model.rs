//! Core data model: suite cases in, adapter outcomes and scored rows out.
//!
//! Everything that crosses a file boundary (`results.jsonl`, `summary.json`,
//! `baselines/<suite>/summary.json`) is serde-shaped here so the artifact
//! formats live in one place.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How strictly the scorer treats a declared output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaValidationMode {
    #[default]
    Strict,
    Off,
}

impl SchemaValidationMode {
    /// Parses the suite-level string form, case-insensitively. Unknown values
    /// fall back to strict.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "off" => SchemaValidationMode::Off,
            _ => SchemaValidationMode::Strict,
        }
    }
}

/// Declarative expectations attached to a case. Every check is optional;
/// the scorer only runs the checks whose expectation is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_refuse: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_grounding: Option<bool>,
}

/// Suite-level multiplier/cap overrides for the regression gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfGates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p95_mult: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_mean_mult: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_p95_mult: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p95_abs_cap_ms: Option<f64>,
}

/// One evaluation case, after suite defaults have been merged in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Case {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected: Expectations,
    /// Adapter-facing tool definitions, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_structured_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    /// openai mode: name for the wire-level `json_schema` block, default
    /// `{id}_schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// openai mode: verbatim `response_format` override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default)]
    pub schema_validation_mode: SchemaValidationMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieved_context: Vec<String>,
    /// `timeout` or `tool_error`; rows from such cases are excluded from
    /// perf aggregates but still counted in the confusion matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulate_failure_mode: Option<String>,
    /// http_app mode: endpoint override, default `/chat_text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// http_app mode: full request payload override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// offline mode: synthetic response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_gates: Option<PerfGates>,
}

impl Case {
    pub fn is_failure_injection(&self) -> bool {
        self.simulate_failure_mode
            .as_deref()
            .is_some_and(|mode| !mode.is_empty())
    }
}

/// One normalized tool invocation. `raw` keeps the adapter's original item
/// for tools-schema validation and debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refusal {
    pub is_refusal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One schema violation, truncated lists of these ride on outcomes and
/// failure details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

/// What an adapter produced for one case. Numeric fields default to zero and
/// optional fields to `None`, so scoring and aggregation never branch on
/// missing keys.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub raw_text: String,
    pub answer: String,
    pub parsed: Option<Value>,
    pub schema_valid: bool,
    pub schema_errors: Vec<SchemaError>,
    pub parse_error: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_names: Vec<String>,
    pub route: Option<String>,
    /// Fallback route label for backends that report `routing.label`.
    pub routing_label: Option<String>,
    pub refusal: Option<Refusal>,
    pub usage: Usage,
    /// Adapter-observed latency; the runner substitutes its own wall-clock
    /// measurement when absent.
    pub latency_ms: Option<u64>,
    pub cost_estimate_usd: Option<f64>,
    pub citations: Vec<Citation>,
    pub retrieved_context: Vec<String>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self {
            raw_text: String::new(),
            answer: String::new(),
            parsed: None,
            schema_valid: true,
            schema_errors: Vec::new(),
            parse_error: None,
            tool_calls: Vec::new(),
            tool_names: Vec::new(),
            route: None,
            routing_label: None,
            refusal: None,
            usage: Usage::default(),
            latency_ms: None,
            cost_estimate_usd: None,
            citations: Vec::new(),
            retrieved_context: Vec::new(),
        }
    }
}

impl Outcome {
    /// Best-effort outcome for a case whose transport failed outright. The
    /// case is still scored (and fails any expectation it carries) instead of
    /// aborting the run.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            schema_valid: false,
            parse_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Resolved route: explicit `route` first, then `routing.label`.
    pub fn resolved_route(&self) -> Option<&str> {
        self.route.as_deref().or(self.routing_label.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub precision: f64,
    pub recall: f64,
}

/// Deterministic scoring verdict for one case.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub passed: bool,
    pub failures: Vec<String>,
    pub tool_metrics: ToolMetrics,
    pub actual_route: Option<String>,
    pub actual_refusal: Option<bool>,
    pub expected_tools: Vec<String>,
    pub actual_tools: Vec<String>,
}

/// One line of `results.jsonl`: the persisted, flattened join of case,
/// outcome and score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_route: Option<String>,
    #[serde(default)]
    pub actual_route: Option<String>,
    #[serde(default)]
    pub is_refusal: Option<bool>,
    #[serde(default)]
    pub is_failure_injection: bool,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub cost_estimate_usd: f64,
    #[serde(default)]
    pub tokens_total: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_precision: f64,
    #[serde(default)]
    pub tool_recall: f64,
    #[serde(default)]
    pub schema_valid: bool,
    #[serde(default)]
    pub parse_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Value>,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub failures: Vec<String>,
    #[serde(default)]
    pub expected_tools: Vec<String>,
    #[serde(default)]
    pub actual_tools: Vec<String>,
}

/// Percentile/mean aggregate over the non-refusal rows of a slice.
/// Fields stay `null` rather than absent when the slice is empty, so dotted
/// metric paths always resolve to a position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfAggregate {
    pub count: usize,
    pub latency_ms_p50: Option<f64>,
    pub latency_ms_p95: Option<f64>,
    pub cost_usd_mean: Option<f64>,
    pub cost_usd_p95: Option<f64>,
    pub tokens_total_mean: Option<f64>,
    pub tokens_total_p95: Option<f64>,
}

/// Refusals only get count and means; percentiles over a handful of refusal
/// rows gate nothing useful.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefusalAggregate {
    pub count: usize,
    pub latency_ms_mean: Option<f64>,
    pub cost_usd_mean: Option<f64>,
}

/// The gateable metrics of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsBundle {
    pub non_refusal_overall: PerfAggregate,
    pub non_refusal_by_route: BTreeMap<String, PerfAggregate>,
    pub refusal_overall: RefusalAggregate,
    /// expected route -> actual route -> count, over every row that has both.
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMismatch {
    pub id: String,
    pub expected_tools: Vec<String>,
    pub actual_tools: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSummary {
    pub precision_mean: Option<f64>,
    pub recall_mean: Option<f64>,
    #[serde(default)]
    pub top_mismatches: Vec<ToolMismatch>,
}

/// `summary.json` for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: String,
    /// Suite file path as given on the command line.
    pub dataset: String,
    pub suite_name: String,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub failed_cases: usize,
    pub metrics: MetricsBundle,
    pub tool_summary: ToolSummary,
    /// First few schema-related failure strings, for report rendering.
    #[serde(default)]
    pub schema_errors: Vec<String>,
}

/// `baselines/<suite>/summary.json`: the accepted metrics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub generated_at: String,
    pub dataset: String,
    pub suite_name: String,
    pub metrics: MetricsBundle,
}

/// `manifest.json`: run identity, written before the first case executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub created_at: String,
    pub suite_path: String,
    pub suite_name: String,
    pub mode: String,
    pub adapter: String,
    pub baseline_dir: String,
}

/// Per-case diagnostics carried into reports for failed cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub id: String,
    pub failures: Vec<String>,
    #[serde(default)]
    pub schema_errors: Vec<SchemaError>,
    #[serde(default)]
    pub parse_error: Option<String>,
}
