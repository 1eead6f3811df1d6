//! `evalgate run`: execute a suite, write artifacts, gate the result.

use crate::cli::args::RunArgs;
use crate::exit_codes;
use evalgate_core::engine::{run_suite, CancelToken, RunOptions};
use std::time::Duration;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted; finishing cases already in flight");
            handler.cancel();
        }
    });

    let options = RunOptions {
        suite_path: args.suite,
        mode: args.mode.into(),
        app_url: args.app_url,
        model: args.model,
        baseline_dir: args.baseline,
        update_baseline: args.update_baseline,
        runs_root: args.runs_dir,
        parallel: args.parallel,
        case_timeout: Duration::from_secs(args.case_timeout_secs),
        cancel,
    };
    let output = run_suite(options).await?;

    println!("Run complete: {}", output.run_dir.display());
    println!("Summary: {}/summary.json", output.run_dir.display());
    println!("Report:  {}/report.md", output.run_dir.display());
    println!("Diff:    {}/diff.md", output.run_dir.display());
    if !output.failures.is_empty() {
        println!("Case failures: {}", output.failures.len());
        return Ok(exit_codes::CHECK_FAILED);
    }
    if !output.regressions.is_empty() {
        println!("Regression failures:");
        for regression in &output.regressions {
            println!(" - {regression}");
        }
        return Ok(exit_codes::CHECK_FAILED);
    }
    Ok(exit_codes::SUCCESS)
}
