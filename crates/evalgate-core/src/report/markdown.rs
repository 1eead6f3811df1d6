//! The per-run `report.md`.

use super::clip;
use crate::model::{FailureDetail, Manifest, RunSummary};
use serde_json::json;

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Renders the run report: identity, pass counts, the metrics bundle as a
/// JSON block, tool metrics and the first failures with their diagnostics.
pub fn render_report(
    manifest: &Manifest,
    summary: &RunSummary,
    failures: &[FailureDetail],
) -> String {
    let mut lines: Vec<String> = vec![
        "# Eval Run Report".to_string(),
        String::new(),
        format!("- Run ID: `{}`", manifest.run_id),
        format!("- Mode: `{}`", manifest.mode),
        format!("- Suite: `{}`", manifest.suite_path),
        format!(
            "- Total: **{}** | Passed: **{}** | Failed: **{}**",
            summary.total_cases, summary.passed_cases, summary.failed_cases
        ),
        String::new(),
        "## Performance Metrics".to_string(),
        String::new(),
        "```json".to_string(),
        pretty(&summary.metrics),
        "```".to_string(),
    ];

    if !summary.metrics.confusion_matrix.is_empty() {
        lines.extend([
            String::new(),
            "## Routing Confusion Matrix".to_string(),
            String::new(),
            "```json".to_string(),
            pretty(&summary.metrics.confusion_matrix),
            "```".to_string(),
        ]);
    }

    let tools = &summary.tool_summary;
    lines.extend([
        String::new(),
        "## Tool Metrics".to_string(),
        String::new(),
        format!("- Precision mean: `{}`", json!(tools.precision_mean)),
        format!("- Recall mean: `{}`", json!(tools.recall_mean)),
    ]);
    if !tools.top_mismatches.is_empty() {
        lines.extend([String::new(), "Top mismatches:".to_string()]);
        for mismatch in tools.top_mismatches.iter().take(5) {
            lines.push(format!(
                "- `{}` expected={:?} actual={:?}",
                mismatch.id, mismatch.expected_tools, mismatch.actual_tools
            ));
        }
    }

    if !summary.schema_errors.is_empty() {
        lines.extend([
            String::new(),
            "## Schema Errors (first 3)".to_string(),
            String::new(),
        ]);
        for err in summary.schema_errors.iter().take(3) {
            lines.push(format!("- {}", clip(err, 180)));
        }
    }

    if !failures.is_empty() {
        lines.extend([String::new(), "## Failures".to_string(), String::new()]);
        for detail in failures.iter().take(50) {
            lines.push(format!("- `{}`: {}", detail.id, detail.failures.join("; ")));
            for err in detail.schema_errors.iter().take(3) {
                lines.push(format!(
                    "  - schema: `{}` {}",
                    err.path,
                    clip(&err.message, 180)
                ));
            }
            if let Some(parse_error) = detail.parse_error.as_deref().filter(|s| !s.is_empty()) {
                lines.push(format!("  - parse_error: {}", clip(parse_error, 200)));
            }
        }
    }

    lines.join("\n") + "\n"
}
