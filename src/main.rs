mod app;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app::Cli;

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "jobbank_harvest=debug"
    } else {
        "jobbank_harvest=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output.clone();

    match app::run(cli).await {
        Ok(summary) => {
            info!(
                output = %output,
                listed = summary.total_listed,
                pages = summary.pages_crawled,
                pages_failed = summary.pages_failed,
                discovered = summary.discovered,
                written = summary.written,
                fetch_failed = summary.fetch_failed,
                parse_failed = summary.parse_failed,
                panicked = summary.panicked,
                emails = summary.emails_found,
                recovery = summary.recovery_found,
                "finished crawl"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "crawl aborted");
            ExitCode::FAILURE
        }
    }
}
