//! `evalgate diff`: compare an existing run's summary against a baseline.
//!
//! Runs with the default gate thresholds; suite-level `perf_gates` overrides
//! only apply during `evalgate run`, which has the suite file in hand.

use crate::cli::args::DiffArgs;
use crate::exit_codes;
use evalgate_core::gate::{compare_metrics, default_rules};
use evalgate_core::model::{Baseline, RunSummary};
use evalgate_core::report::render_diff;
use evalgate_core::storage::read_json;
use std::fs;

pub fn run(args: DiffArgs) -> anyhow::Result<i32> {
    let baseline_path = args.baseline.join("summary.json");
    let run_summary_path = args.run.join("summary.json");
    if !baseline_path.exists() {
        println!("baseline missing: {}", baseline_path.display());
        return Ok(exit_codes::CHECK_FAILED);
    }
    if !run_summary_path.exists() {
        println!("run summary missing: {}", run_summary_path.display());
        return Ok(exit_codes::CHECK_FAILED);
    }

    let baseline: Baseline = read_json(&baseline_path)?;
    let summary: RunSummary = read_json(&run_summary_path)?;
    let regressions = compare_metrics(&summary.metrics, &baseline.metrics, &default_rules());

    let run_id = args
        .run
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.run.display().to_string());
    let out_path = args.run.join("diff.md");
    fs::write(&out_path, render_diff(&run_id, &baseline_path, &regressions, &[]))?;
    println!("{}", out_path.display());

    if !regressions.is_empty() {
        for regression in &regressions {
            println!("- {regression}");
        }
        return Ok(exit_codes::CHECK_FAILED);
    }
    Ok(exit_codes::SUCCESS)
}
