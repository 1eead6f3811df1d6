//! The per-run `diff.md`: gate verdict against the baseline.

use super::clip;
use crate::model::FailureDetail;
use std::path::Path;

/// Renders the baseline diff: PASS/FAIL status, the regression list and any
/// failures that carried schema or parse diagnostics.
pub fn render_diff(
    run_id: &str,
    baseline_path: &Path,
    regressions: &[String],
    failures: &[FailureDetail],
) -> String {
    let mut lines: Vec<String> = vec![
        "# Baseline Diff".to_string(),
        String::new(),
        format!("- Run: `{run_id}`"),
        format!("- Baseline: `{}`", baseline_path.display()),
        String::new(),
    ];

    if regressions.is_empty() {
        lines.extend(["**Status:** PASS".to_string(), String::new()]);
    } else {
        lines.extend([
            "**Status:** FAIL".to_string(),
            String::new(),
            "## Regressions".to_string(),
            String::new(),
        ]);
        for regression in regressions {
            lines.push(format!("- {regression}"));
        }
        lines.extend([String::new(), "## Top Regressions".to_string(), String::new()]);
        for regression in regressions.iter().take(5) {
            lines.push(format!("- {regression}"));
        }
    }

    let schema_related: Vec<&FailureDetail> = failures
        .iter()
        .filter(|f| {
            !f.schema_errors.is_empty()
                || f.parse_error.as_deref().is_some_and(|s| !s.is_empty())
        })
        .collect();
    if !schema_related.is_empty() {
        lines.extend([
            String::new(),
            "## Schema/Parse Failures".to_string(),
            String::new(),
        ]);
        for detail in schema_related.iter().take(10) {
            lines.push(format!("- `{}`", detail.id));
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
