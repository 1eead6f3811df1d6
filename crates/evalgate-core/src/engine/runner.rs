//! Suite orchestration: dispatch, scoring, artifacts, gating.
//!
//! Cases run under a semaphore-bounded pool. Completed rows are appended to
//! `results.jsonl` in suite order as soon as every earlier case has finished;
//! at `parallel = 1` each row lands before the next case is dispatched.
//! Adapter errors and per-case timeouts degrade the one case, never the run:
//! the degraded outcome is scored like any other and fails whatever
//! expectations the case carries.

use crate::adapters::{self, truthy, Adapter, Mode, RunConfig};
use crate::baseline::BaselineStore;
use crate::engine::CancelToken;
use crate::gate::{build_rules, compare_metrics};
use crate::metrics::{build_bundle, mean, round_to};
use crate::model::{
    Baseline, Case, FailureDetail, Manifest, Outcome, ResultRow, RunSummary, ToolMismatch,
    ToolSummary,
};
use crate::report;
use crate::scoring::rubric::{maybe_rubric_score, PlaceholderRubric};
use crate::scoring::schema::routing_schema;
use crate::scoring::score_case;
use crate::storage::{write_json_pretty, JsonlWriter};
use crate::suite::load_suite;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Knobs for one run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub suite_path: PathBuf,
    pub mode: Mode,
    /// Base URL forwarded to the http_app adapter; empty uses its default.
    pub app_url: String,
    /// Default model forwarded to the openai adapter; empty uses its default.
    pub model: String,
    /// Baseline directory; `None` means `baselines/<suite_name>`.
    pub baseline_dir: Option<PathBuf>,
    pub update_baseline: bool,
    /// Parent directory for per-run artifact directories.
    pub runs_root: PathBuf,
    /// Dispatch width; 1 reproduces strict sequential execution.
    pub parallel: usize,
    pub case_timeout: Duration,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            suite_path: PathBuf::new(),
            mode: Mode::Offline,
            app_url: String::new(),
            model: String::new(),
            baseline_dir: None,
            update_baseline: false,
            runs_root: PathBuf::from("runs"),
            parallel: 1,
            case_timeout: Duration::from_secs(120),
            cancel: CancelToken::new(),
        }
    }
}

/// Everything a caller needs to decide the exit status and point at the
/// artifacts. Check failures (failed cases, regressions) are data here, not
/// errors; `run_suite` only errors on operational problems.
#[derive(Debug)]
pub struct RunOutput {
    pub run_dir: PathBuf,
    pub summary: RunSummary,
    pub failures: Vec<FailureDetail>,
    pub regressions: Vec<String>,
}

pub async fn run_suite(options: RunOptions) -> Result<RunOutput> {
    let adapter = adapters::for_mode(options.mode)?;
    run_suite_with_adapter(options, adapter).await
}

/// [`run_suite`] with a caller-supplied adapter; the seam scripted backends
/// plug into.
pub async fn run_suite_with_adapter(
    options: RunOptions,
    adapter: Arc<dyn Adapter>,
) -> Result<RunOutput> {
    let run_id = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let run_dir = options.runs_root.join(&run_id);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create run dir {}", run_dir.display()))?;

    let suite = load_suite(&options.suite_path)?;
    let baseline = match &options.baseline_dir {
        Some(dir) => BaselineStore::new(dir.clone()),
        None => BaselineStore::for_suite(Path::new("baselines"), &suite.name),
    };

    let manifest = Manifest {
        run_id: run_id.clone(),
        created_at: Utc::now().to_rfc3339(),
        suite_path: options.suite_path.display().to_string(),
        suite_name: suite.name.clone(),
        mode: options.mode.as_str().to_string(),
        adapter: adapter.name().to_string(),
        baseline_dir: baseline.dir().display().to_string(),
    };
    write_json_pretty(&run_dir.join("manifest.json"), &manifest)?;

    let prepared: Vec<Case> = suite
        .cases
        .iter()
        .map(|case| prepare_case_for_mode(case.clone(), options.mode))
        .collect();
    let total = prepared.len();
    info!(
        suite = %suite.name,
        mode = %options.mode,
        cases = total,
        run_id = %run_id,
        "starting run"
    );

    let config = RunConfig {
        app_url: options.app_url.clone(),
        model: options.model.clone(),
    };
    let mut ctx = RunContext::new(&run_dir, prepared)?;

    let parallel = options.parallel.max(1);
    let sem = Arc::new(Semaphore::new(parallel));
    let mut join_set: JoinSet<(usize, Outcome, u64)> = JoinSet::new();

    for idx in 0..total {
        if options.cancel.is_cancelled() {
            warn!(dispatched = idx, total, "cancelled; not dispatching further cases");
            break;
        }
        let permit = sem.clone().acquire_owned().await?;
        while let Some(joined) = join_set.try_join_next() {
            let (done, outcome, measured_ms) = joined.context("case task panicked")?;
            ctx.complete(done, outcome, measured_ms)?;
        }
        let adapter = adapter.clone();
        let config = config.clone();
        let case = ctx.cases[idx].clone();
        let case_timeout = options.case_timeout;
        join_set.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let outcome = match timeout(case_timeout, adapter.execute(&case, &config)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    warn!(case = %case.id, error = %err, "adapter failed; scoring degraded outcome");
                    Outcome::degraded(err.to_string())
                }
                Err(_) => {
                    warn!(case = %case.id, timeout_secs = case_timeout.as_secs(), "case timed out");
                    Outcome::degraded(format!(
                        "case timed out after {}s",
                        case_timeout.as_secs()
                    ))
                }
            };
            (idx, outcome, started.elapsed().as_millis() as u64)
        });
    }
    while let Some(joined) = join_set.join_next().await {
        let (done, outcome, measured_ms) = joined.context("case task panicked")?;
        ctx.complete(done, outcome, measured_ms)?;
    }

    let RunContext {
        rows,
        failures,
        mut schema_errors,
        mut tool_mismatches,
        ..
    } = ctx;

    let metrics = build_bundle(&rows);
    let precisions: Vec<f64> = rows.iter().map(|r| r.tool_precision).collect();
    let recalls: Vec<f64> = rows.iter().map(|r| r.tool_recall).collect();
    tool_mismatches.truncate(10);
    schema_errors.truncate(3);
    let summary = RunSummary {
        generated_at: Utc::now().to_rfc3339(),
        dataset: options.suite_path.display().to_string(),
        suite_name: suite.name.clone(),
        total_cases: rows.len(),
        passed_cases: rows.iter().filter(|r| r.passed).count(),
        failed_cases: rows.iter().filter(|r| !r.passed).count(),
        metrics,
        tool_summary: ToolSummary {
            precision_mean: mean(&precisions).map(|m| round_to(m, 4)),
            recall_mean: mean(&recalls).map(|m| round_to(m, 4)),
            top_mismatches: tool_mismatches,
        },
        schema_errors,
    };
    write_json_pretty(&run_dir.join("summary.json"), &summary)?;

    let report_md = report::render_report(&manifest, &summary, &failures);
    fs::write(run_dir.join("report.md"), report_md)
        .with_context(|| format!("failed to write report in {}", run_dir.display()))?;

    let rules = build_rules(suite.perf_gates.as_ref());
    let baseline_path = baseline.path();
    let mut regressions: Vec<String> = Vec::new();
    if options.update_baseline {
        BaselineStore::guard_update(summary.failed_cases, summary.metrics.non_refusal_overall.count)?;
        baseline.write(&Baseline {
            generated_at: Utc::now().to_rfc3339(),
            dataset: summary.dataset.clone(),
            suite_name: summary.suite_name.clone(),
            metrics: summary.metrics.clone(),
        })?;
    } else {
        match baseline.load()? {
            None => regressions.push(format!(
                "baseline missing at {}. Run with --update-baseline.",
                baseline_path.display()
            )),
            Some(stored) => {
                regressions = compare_metrics(&summary.metrics, &stored.metrics, &rules);
            }
        }
    }

    let diff_md = report::render_diff(&run_id, &baseline_path, &regressions, &failures);
    fs::write(run_dir.join("diff.md"), diff_md)
        .with_context(|| format!("failed to write diff in {}", run_dir.display()))?;

    if !regressions.is_empty() {
        warn!(count = regressions.len(), "regression gate failed");
    }
    info!(
        run_dir = %run_dir.display(),
        passed = summary.passed_cases,
        failed = summary.failed_cases,
        "run complete"
    );
    Ok(RunOutput {
        run_dir,
        summary,
        failures,
        regressions,
    })
}

/// Mode-specific case defaults. openai mode needs structured output to check
/// route or refusal expectations, so those cases default to requiring it,
/// with the built-in routing schema when none is set.
fn prepare_case_for_mode(mut case: Case, mode: Mode) -> Case {
    if mode == Mode::OpenAi {
        let has_route_or_refusal = case.expected.route.is_some() || case.expected.should_refuse.is_some();
        if has_route_or_refusal && case.requires_structured_output.is_none() {
            case.requires_structured_output = Some(true);
        }
        let schema_missing = case.response_schema.as_ref().map_or(true, |v| !truthy(v));
        if case.requires_structured_output == Some(true) && schema_missing {
            case.response_schema = Some(routing_schema());
        }
    }
    case
}

/// Per-run accumulation: prepared cases, the JSONL writer, and everything
/// the summary needs once the pool drains. `complete` buffers out-of-order
/// finishes and emits rows strictly in suite order.
struct RunContext {
    cases: Vec<Case>,
    writer: JsonlWriter,
    scorer: PlaceholderRubric,
    pending: BTreeMap<usize, (Outcome, u64)>,
    next_emit: usize,
    rows: Vec<ResultRow>,
    failures: Vec<FailureDetail>,
    schema_errors: Vec<String>,
    tool_mismatches: Vec<ToolMismatch>,
}

impl RunContext {
    fn new(run_dir: &Path, cases: Vec<Case>) -> Result<Self> {
        let writer = JsonlWriter::create(&run_dir.join("results.jsonl"))?;
        Ok(Self {
            cases,
            writer,
            scorer: PlaceholderRubric,
            pending: BTreeMap::new(),
            next_emit: 0,
            rows: Vec::new(),
            failures: Vec::new(),
            schema_errors: Vec::new(),
            tool_mismatches: Vec::new(),
        })
    }

    fn complete(&mut self, idx: usize, outcome: Outcome, measured_ms: u64) -> Result<()> {
        self.pending.insert(idx, (outcome, measured_ms));
        while let Some((outcome, measured_ms)) = self.pending.remove(&self.next_emit) {
            self.emit(self.next_emit, outcome, measured_ms)?;
            self.next_emit += 1;
        }
        Ok(())
    }

    fn emit(&mut self, idx: usize, outcome: Outcome, measured_ms: u64) -> Result<()> {
        let case = &self.cases[idx];
        let scored = score_case(case, &outcome);
        let rubric = maybe_rubric_score(&self.scorer, &outcome.answer, case.rubric_path.as_deref());
        let row = ResultRow {
            id: case.id.clone(),
            input: case.input.clone(),
            expected_route: case.expected.route.clone(),
            actual_route: scored.actual_route.clone(),
            is_refusal: scored.actual_refusal,
            is_failure_injection: case.is_failure_injection(),
            latency_ms: outcome.latency_ms.unwrap_or(measured_ms),
            cost_estimate_usd: outcome.cost_estimate_usd.unwrap_or(0.0),
            tokens_total: outcome.usage.total_tokens,
            input_tokens: outcome.usage.input_tokens,
            output_tokens: outcome.usage.output_tokens,
            tool_names: outcome.tool_names.clone(),
            tool_calls: outcome.tool_calls.clone(),
            tool_precision: scored.tool_metrics.precision,
            tool_recall: scored.tool_metrics.recall,
            schema_valid: outcome.schema_valid,
            parse_error: outcome.parse_error.clone(),
            rubric,
            passed: scored.passed,
            failures: scored.failures,
            expected_tools: scored.expected_tools,
            actual_tools: scored.actual_tools,
        };
        self.writer.append(&row)?;
        debug!(case = %row.id, passed = row.passed, latency_ms = row.latency_ms, "case scored");

        if !row.passed {
            self.failures.push(FailureDetail {
                id: row.id.clone(),
                failures: row.failures.clone(),
                schema_errors: outcome.schema_errors.iter().take(3).cloned().collect(),
                parse_error: outcome.parse_error.clone(),
            });
            for failure in &row.failures {
                if failure.to_lowercase().contains("schema") {
                    self.schema_errors.push(failure.clone());
                }
            }
        }
        if row.expected_tools != row.actual_tools {
            self.tool_mismatches.push(ToolMismatch {
                id: row.id.clone(),
                expected_tools: row.expected_tools.clone(),
                actual_tools: row.actual_tools.clone(),
            });
        }
        self.rows.push(row);
        Ok(())
    }
}
