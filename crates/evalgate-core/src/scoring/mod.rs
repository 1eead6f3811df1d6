//! Deterministic per-case scoring.
//!
//! Every check is independent and only runs when its expectation is present;
//! a case accumulates all applicable failures instead of stopping at the
//! first one. Identical (case, outcome) pairs always produce identical rows.

pub mod rubric;
pub mod schema;

use crate::metrics::round_to;
use crate::model::{Case, Outcome, SchemaValidationMode, ScoredRow, ToolMetrics};
use schema::CompiledSchema;
use std::collections::BTreeSet;

/// At most this many output-schema violations are reported per case.
pub(crate) const MAX_SCHEMA_VIOLATIONS: usize = 3;

/// Set-based precision/recall over tool names.
///
/// Both sides empty is a perfect score; an empty actual set scores zero
/// precision and zero recall unless nothing was expected.
pub fn tool_metrics(expected: &[String], actual: &[String]) -> ToolMetrics {
    let expected_set: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let actual_set: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    if expected_set.is_empty() && actual_set.is_empty() {
        return ToolMetrics {
            precision: 1.0,
            recall: 1.0,
        };
    }
    if actual_set.is_empty() {
        return ToolMetrics {
            precision: 0.0,
            recall: if expected_set.is_empty() { 1.0 } else { 0.0 },
        };
    }
    let tp = expected_set.intersection(&actual_set).count() as f64;
    let precision = tp / actual_set.len() as f64;
    let recall = if expected_set.is_empty() {
        1.0
    } else {
        tp / expected_set.len() as f64
    };
    ToolMetrics {
        precision: round_to(precision, 4),
        recall: round_to(recall, 4),
    }
}

/// Scores one outcome against one case's expectations.
pub fn score_case(case: &Case, outcome: &Outcome) -> ScoredRow {
    let expected = &case.expected;
    let mut failures: Vec<String> = Vec::new();

    let actual_refusal = outcome.refusal.as_ref().map(|r| r.is_refusal);
    if let Some(should_refuse) = expected.should_refuse {
        match actual_refusal {
            None => failures.push("refusal missing in adapter output".to_string()),
            Some(actual) if actual != should_refuse => failures.push(format!(
                "refusal mismatch expected={should_refuse} got={actual}"
            )),
            Some(_) => {}
        }
    }

    let actual_route = outcome.resolved_route().map(str::to_string);
    if let Some(expected_route) = expected.route.as_deref() {
        if actual_route.as_deref() != Some(expected_route) {
            failures.push(format!(
                "route mismatch expected={expected_route} got={}",
                actual_route.as_deref().unwrap_or("none")
            ));
        }
    }

    let expected_tools = expected.tools.clone().unwrap_or_default();
    let actual_tools = outcome.tool_names.clone();
    let tm = tool_metrics(&expected_tools, &actual_tools);
    let refused = actual_refusal == Some(true);
    if !refused && !expected_tools.is_empty() {
        let want: BTreeSet<&str> = expected_tools.iter().map(String::as_str).collect();
        let got: BTreeSet<&str> = actual_tools.iter().map(String::as_str).collect();
        if want != got {
            let mut want_sorted = expected_tools.clone();
            want_sorted.sort();
            let mut got_sorted = actual_tools.clone();
            got_sorted.sort();
            failures.push(format!(
                "tool mismatch expected={want_sorted:?} got={got_sorted:?}"
            ));
        }
    }

    let output_schema = case
        .response_schema
        .as_ref()
        .or(expected.output_schema.as_ref());
    if let Some(schema_value) = output_schema {
        if case.schema_validation_mode != SchemaValidationMode::Off {
            match (&outcome.parsed, CompiledSchema::compile(schema_value)) {
                (None, _) => failures.push(
                    "output schema parse/validation failed: parsed structured output is null"
                        .to_string(),
                ),
                (Some(_), Err(err)) => {
                    failures.push(format!("output schema parse/validation failed: {err}"));
                }
                (Some(parsed), Ok(compiled)) => {
                    for err in compiled.errors(parsed, MAX_SCHEMA_VIOLATIONS) {
                        failures.push(format!("output schema violation: {}", err.message));
                    }
                }
            }
        }
        // Adapter-side verdict is honored even when local validation is off.
        if !outcome.schema_valid {
            failures.push("adapter marked schema_valid=false".to_string());
        }
    }

    if let Some(tools_schema) = expected.tools_schema.as_ref() {
        let result = CompiledSchema::compile(tools_schema).and_then(|compiled| {
            let instance = serde_json::to_value(&outcome.tool_calls)?;
            Ok(compiled.errors(&instance, 1))
        });
        match result {
            Ok(errs) => {
                if let Some(first) = errs.first() {
                    failures.push(format!("tools schema violation: {}", first.message));
                }
            }
            Err(err) => failures.push(format!("tools schema parse/validation failed: {err}")),
        }
    }

    if expected.citation_grounding == Some(true) {
        let contexts = if outcome.retrieved_context.is_empty() {
            &case.retrieved_context
        } else {
            &outcome.retrieved_context
        };
        let joined = contexts.join("\n");
        for (idx, citation) in outcome.citations.iter().enumerate() {
            let quote = citation.quote.trim();
            if quote.is_empty() {
                failures.push(format!("citation[{idx}] missing quote"));
            } else if !joined.contains(quote) {
                failures.push(format!(
                    "citation[{idx}] quote not grounded in retrieved_context"
                ));
            }
        }
    }

    ScoredRow {
        passed: failures.is_empty(),
        failures,
        tool_metrics: tm,
        actual_route,
        actual_refusal,
        expected_tools,
        actual_tools,
    }
}
