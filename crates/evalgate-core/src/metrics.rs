//! Nearest-rank percentiles, cost estimation and per-run metric aggregation.
//!
//! Aggregation partitions rows three ways: refusal rows only contribute to
//! `refusal_overall`, failure-injection rows are excluded from every perf
//! aggregate, and the confusion matrix counts every row that carries both an
//! expected and an actual route.

use crate::model::{MetricsBundle, PerfAggregate, RefusalAggregate, ResultRow};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Route labels with dedicated per-route aggregates and gate rules.
pub const KNOWN_ROUTES: [&str; 3] = ["tech", "marketing", "investor"];

/// Nearest-rank percentile: ascending sort, index `ceil(pct * n) - 1`
/// clamped to `[0, n-1]`. Returns `None` on an empty slice.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len() as i64;
    let idx = (pct * sorted.len() as f64).ceil() as i64 - 1;
    let idx = idx.clamp(0, n - 1) as usize;
    Some(sorted[idx])
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Linear token pricing in USD per million tokens; a "mini" model name
/// selects the cheap tier. Rounded to 6 decimals.
pub fn estimate_cost_usd(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (in_rate, out_rate) = if model.to_ascii_lowercase().contains("mini") {
        (0.2, 0.6)
    } else {
        (5.0, 15.0)
    };
    let cost = input_tokens as f64 / 1_000_000.0 * in_rate
        + output_tokens as f64 / 1_000_000.0 * out_rate;
    round_to(cost, 6)
}

/// Latency/cost/token aggregate over a slice of rows.
pub fn aggregate_perf(rows: &[&ResultRow]) -> PerfAggregate {
    let latencies: Vec<f64> = rows.iter().map(|r| r.latency_ms as f64).collect();
    let costs: Vec<f64> = rows.iter().map(|r| r.cost_estimate_usd).collect();
    let tokens: Vec<f64> = rows.iter().map(|r| r.tokens_total as f64).collect();
    PerfAggregate {
        count: rows.len(),
        latency_ms_p50: percentile(&latencies, 0.50),
        latency_ms_p95: percentile(&latencies, 0.95),
        cost_usd_mean: mean(&costs).map(|m| round_to(m, 6)),
        cost_usd_p95: percentile(&costs, 0.95),
        tokens_total_mean: mean(&tokens).map(|m| round_to(m, 2)),
        tokens_total_p95: percentile(&tokens, 0.95),
    }
}

/// Builds the gateable metrics of one run from its persisted rows.
pub fn build_bundle(rows: &[ResultRow]) -> MetricsBundle {
    let perf: Vec<&ResultRow> = rows
        .iter()
        .filter(|r| r.is_refusal != Some(true) && !r.is_failure_injection)
        .collect();
    let refusals: Vec<&ResultRow> = rows
        .iter()
        .filter(|r| r.is_refusal == Some(true) && !r.is_failure_injection)
        .collect();

    // Fixed keys: a route with no rows still serializes, with a zero-count
    // aggregate, so dotted gate paths always resolve to a position.
    let mut by_route = BTreeMap::new();
    for route in KNOWN_ROUTES {
        let routed: Vec<&ResultRow> = perf
            .iter()
            .copied()
            .filter(|r| r.actual_route.as_deref() == Some(route))
            .collect();
        by_route.insert(route.to_string(), aggregate_perf(&routed));
    }

    let mut confusion: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for row in rows {
        let (expected, actual) = match (row.expected_route.as_deref(), row.actual_route.as_deref())
        {
            (Some(e), Some(a)) if !e.is_empty() && !a.is_empty() => (e, a),
            _ => continue,
        };
        *confusion
            .entry(expected.to_string())
            .or_default()
            .entry(actual.to_string())
            .or_insert(0) += 1;
    }

    let refusal_latencies: Vec<f64> = refusals.iter().map(|r| r.latency_ms as f64).collect();
    let refusal_costs: Vec<f64> = refusals.iter().map(|r| r.cost_estimate_usd).collect();

    MetricsBundle {
        non_refusal_overall: aggregate_perf(&perf),
        non_refusal_by_route: by_route,
        refusal_overall: RefusalAggregate {
            count: refusals.len(),
            latency_ms_mean: mean(&refusal_latencies).map(|m| round_to(m, 2)),
            cost_usd_mean: mean(&refusal_costs).map(|m| round_to(m, 6)),
        },
        confusion_matrix: confusion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> ResultRow {
        ResultRow {
            id: id.to_string(),
            schema_valid: true,
            passed: true,
            ..ResultRow::default()
        }
    }

    #[test]
    fn percentile_is_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.95), Some(95.0));
        assert_eq!(percentile(&values, 0.50), Some(50.0));
        assert_eq!(percentile(&values, 1.0), Some(100.0));
    }

    #[test]
    fn percentile_edges() {
        assert_eq!(percentile(&[], 0.95), None);
        assert_eq!(percentile(&[42.0], 0.95), Some(42.0));
        // Unsorted input is sorted internally.
        assert_eq!(percentile(&[30.0, 10.0, 20.0], 0.50), Some(20.0));
    }

    #[test]
    fn cost_rates_switch_on_mini() {
        assert_eq!(estimate_cost_usd("gpt-4o-mini", 1_000_000, 1_000_000), 0.8);
        assert_eq!(estimate_cost_usd("gpt-4o", 1_000_000, 1_000_000), 20.0);
        assert_eq!(estimate_cost_usd("GPT-4O-MINI", 50, 120), 0.000082);
        assert_eq!(estimate_cost_usd("", 0, 0), 0.0);
    }

    #[test]
    fn refusals_and_injected_failures_partition() {
        let mut refused = row("r1");
        refused.is_refusal = Some(true);
        refused.latency_ms = 900;
        refused.cost_estimate_usd = 0.01;

        let mut injected = row("f1");
        injected.is_failure_injection = true;
        injected.expected_route = Some("tech".into());
        injected.actual_route = Some("tech".into());
        injected.latency_ms = 50_000;

        let mut normal = row("n1");
        normal.expected_route = Some("tech".into());
        normal.actual_route = Some("tech".into());
        normal.latency_ms = 100;
        normal.tokens_total = 170;

        let bundle = build_bundle(&[refused, injected, normal]);
        // Injected row never reaches perf aggregates.
        assert_eq!(bundle.non_refusal_overall.count, 1);
        assert_eq!(bundle.non_refusal_overall.latency_ms_p95, Some(100.0));
        assert_eq!(bundle.refusal_overall.count, 1);
        assert_eq!(bundle.refusal_overall.latency_ms_mean, Some(900.0));
        // But it does reach the confusion matrix.
        assert_eq!(bundle.confusion_matrix["tech"]["tech"], 2);
    }

    #[test]
    fn by_route_is_keyed_by_known_routes() {
        let mut tech = row("t1");
        tech.actual_route = Some("tech".into());
        tech.latency_ms = 10;
        let mut other = row("o1");
        other.actual_route = Some("unknown".into());
        other.latency_ms = 20;

        let bundle = build_bundle(&[tech, other]);
        assert_eq!(bundle.non_refusal_by_route["tech"].count, 1);
        assert_eq!(bundle.non_refusal_by_route["tech"].latency_ms_p95, Some(10.0));
        // Known routes without rows keep a zero-count aggregate.
        assert_eq!(bundle.non_refusal_by_route["marketing"].count, 0);
        assert_eq!(bundle.non_refusal_by_route["marketing"].latency_ms_p95, None);
        // Unknown routes never get their own bucket.
        assert!(!bundle.non_refusal_by_route.contains_key("unknown"));
        assert_eq!(bundle.non_refusal_overall.count, 2);
    }
}
