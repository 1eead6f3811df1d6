pub mod diff;
pub mod report;
pub mod run;

use super::args::{Cli, Command};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Report(args) => report::run(args),
        Command::Diff(args) => diff::run(args),
    }
}
