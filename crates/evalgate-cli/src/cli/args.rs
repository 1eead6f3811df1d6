//! Command-line surface.

use clap::{Parser, Subcommand, ValueEnum};
use evalgate_core::adapters::Mode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "evalgate",
    version,
    about = "Evaluation and regression gating for conversational backends"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an evaluation suite
    Run(RunArgs),
    /// Render report for an existing run
    Report(ReportArgs),
    /// Diff a run summary against a baseline
    Diff(DiffArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Offline,
    #[value(name = "http_app")]
    HttpApp,
    #[value(name = "openai")]
    OpenAi,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offline => Mode::Offline,
            ModeArg::HttpApp => Mode::HttpApp,
            ModeArg::OpenAi => Mode::OpenAi,
        }
    }
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Suite JSONL path
    #[arg(long)]
    pub suite: PathBuf,

    /// Adapter mode
    #[arg(long, value_enum)]
    pub mode: ModeArg,

    /// Base URL of the application under test (http_app mode)
    #[arg(long, env = "EVALGATE_APP_URL", default_value = "http://localhost:8000")]
    pub app_url: String,

    /// Default model when cases do not name one (openai mode)
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Baseline directory (default: baselines/<suite name>)
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Accept this run's metrics as the new baseline
    #[arg(long)]
    pub update_baseline: bool,

    /// Parent directory for per-run artifact directories
    #[arg(long, default_value = "runs")]
    pub runs_dir: PathBuf,

    /// Concurrent case limit
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,

    /// Per-case adapter timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub case_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Md,
    Json,
}

#[derive(Parser, Clone)]
pub struct ReportArgs {
    /// Run directory, e.g. runs/<id>
    #[arg(long)]
    pub run: PathBuf,

    #[arg(long, value_enum, default_value_t = ReportFormat::Md)]
    pub format: ReportFormat,
}

#[derive(Parser, Clone)]
pub struct DiffArgs {
    /// Baseline directory, e.g. baselines/smoke
    #[arg(long)]
    pub baseline: PathBuf,

    /// Run directory, e.g. runs/<id>
    #[arg(long)]
    pub run: PathBuf,
}
