//! Regression rules and metric comparison against a baseline.
//!
//! Rules address metrics by dotted path into the serialized bundle. A rule
//! fails when the current value exceeds its absolute cap, or exceeds
//! `baseline * multiplier`. Missing per-route values are expected (a suite
//! may simply have no rows for a route) and skip silently; missing top-level
//! values are a hard failure because they mean the run produced nothing to
//! gate.

use crate::model::{MetricsBundle, PerfGates};
use serde_json::Value;

const DEFAULT_LATENCY_P95_MULT: f64 = 1.35;
const DEFAULT_COST_MEAN_MULT: f64 = 1.25;
const DEFAULT_TOKENS_P95_MULT: f64 = 1.25;
const DEFAULT_LATENCY_P95_ABS_CAP_MS: f64 = 3000.0;

#[derive(Debug, Clone)]
pub struct RegressionRule {
    pub metric_path: String,
    pub multiplier: f64,
    pub absolute_cap: Option<f64>,
}

impl RegressionRule {
    fn new(metric_path: &str, multiplier: f64, absolute_cap: Option<f64>) -> Self {
        Self {
            metric_path: metric_path.to_string(),
            multiplier,
            absolute_cap,
        }
    }
}

/// The built-in rule set with no suite overrides.
pub fn default_rules() -> Vec<RegressionRule> {
    build_rules(None)
}

/// Rule set with suite-level `perf_gates` overrides applied. Only the
/// overall latency rule carries an absolute cap.
pub fn build_rules(perf_gates: Option<&PerfGates>) -> Vec<RegressionRule> {
    let gates = perf_gates.cloned().unwrap_or_default();
    let latency_mult = gates.latency_p95_mult.unwrap_or(DEFAULT_LATENCY_P95_MULT);
    let cost_mult = gates.cost_mean_mult.unwrap_or(DEFAULT_COST_MEAN_MULT);
    let tokens_mult = gates.tokens_p95_mult.unwrap_or(DEFAULT_TOKENS_P95_MULT);
    let latency_cap = gates
        .latency_p95_abs_cap_ms
        .unwrap_or(DEFAULT_LATENCY_P95_ABS_CAP_MS);
    vec![
        RegressionRule::new(
            "non_refusal_overall.latency_ms_p95",
            latency_mult,
            Some(latency_cap),
        ),
        RegressionRule::new("non_refusal_overall.cost_usd_mean", cost_mult, None),
        RegressionRule::new("non_refusal_overall.tokens_total_p95", tokens_mult, None),
        RegressionRule::new("non_refusal_by_route.tech.latency_ms_p95", latency_mult, None),
        RegressionRule::new(
            "non_refusal_by_route.marketing.latency_ms_p95",
            latency_mult,
            None,
        ),
        RegressionRule::new(
            "non_refusal_by_route.investor.latency_ms_p95",
            latency_mult,
            None,
        ),
    ]
}

fn metric_at(metrics: &Value, dotted: &str) -> Option<f64> {
    let mut cur = metrics;
    for part in dotted.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    cur.as_f64()
}

/// Compares current metrics against a baseline; returns one line per rule
/// violation, in rule order.
pub fn compare_metrics(
    current: &MetricsBundle,
    baseline: &MetricsBundle,
    rules: &[RegressionRule],
) -> Vec<String> {
    let current = serde_json::to_value(current).unwrap_or(Value::Null);
    let baseline = serde_json::to_value(baseline).unwrap_or(Value::Null);
    let mut failures = Vec::new();

    for rule in rules {
        let cur = metric_at(&current, &rule.metric_path);
        let base = metric_at(&baseline, &rule.metric_path);
        let (cur, base) = match (cur, base) {
            (Some(c), Some(b)) => (c, b),
            _ => {
                if rule.metric_path.starts_with("non_refusal_by_route.") {
                    continue;
                }
                failures.push(format!("missing metric: {}", rule.metric_path));
                continue;
            }
        };
        if let Some(cap) = rule.absolute_cap {
            // Absolute caps bind regardless of the baseline.
            if cur > cap {
                failures.push(format!(
                    "{} regression: current={cur:.4} > absolute_cap={cap:.4}",
                    rule.metric_path
                ));
                continue;
            }
        }
        if base <= 0.0 {
            if cur <= 0.0 {
                continue;
            }
            if rule.absolute_cap.map_or(true, |cap| cur <= cap) {
                continue;
            }
            failures.push(format!(
                "baseline zero and current exceeds cap for {}: current={cur:.4}",
                rule.metric_path
            ));
            continue;
        }
        if cur > base * rule.multiplier {
            failures.push(format!(
                "{} regression: current={cur:.4} baseline={base:.4} threshold={:.4}",
                rule.metric_path,
                base * rule.multiplier
            ));
        }
    }
    failures
}
