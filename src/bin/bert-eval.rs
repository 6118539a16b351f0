//! Command-line interface for rust-bert-eval.

use anyhow::Result;
use clap::Parser;
use rust_bert_eval::cli::{cmd_coherence, cmd_evaluate, cmd_report_csv, Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Coherence(args) => cmd_coherence(args),
        Command::ReportCsv(args) => cmd_report_csv(args),
    }
}
