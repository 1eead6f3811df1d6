//! `evalgate report`: re-render the report for an existing run directory.

use crate::cli::args::{ReportArgs, ReportFormat};
use crate::exit_codes;
use evalgate_core::model::{FailureDetail, Manifest, ResultRow, RunSummary};
use evalgate_core::report::render_report;
use evalgate_core::storage::{read_json, read_jsonl};
use std::fs;

pub fn run(args: ReportArgs) -> anyhow::Result<i32> {
    let manifest: Manifest = read_json(&args.run.join("manifest.json"))?;
    let summary: RunSummary = read_json(&args.run.join("summary.json"))?;

    // Failure details are rebuilt from the persisted rows; the row-level
    // schema/parse diagnostics are not re-derived here.
    let mut failures: Vec<FailureDetail> = Vec::new();
    if summary.failed_cases > 0 {
        let rows: Vec<ResultRow> = read_jsonl(&args.run.join("results.jsonl"))?;
        failures.extend(rows.into_iter().filter(|row| !row.passed).map(|row| {
            FailureDetail {
                id: row.id,
                failures: row.failures,
                schema_errors: Vec::new(),
                parse_error: None,
            }
        }));
    }

    match args.format {
        ReportFormat::Md => {
            let out_path = args.run.join("report.md");
            fs::write(&out_path, render_report(&manifest, &summary, &failures))?;
            println!("{}", out_path.display());
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(exit_codes::SUCCESS)
}
