//! Themis - contest judge
//!
//! Judges one problem per invocation:
//! `themis [problem-config-path]`.
//! The report goes to stdout, logs to stderr and the process exit code
//! carries the run outcome.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use themis_common::RunOutcome;
use themis_judge::capability::{CapabilityCheck, HostCapabilities};
use themis_judge::{Config, Judge};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "themis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(RunOutcome::InternalError.exit_code())
        }
    }
}

async fn run() -> Result<RunOutcome> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let problem = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.problem_config.clone());

    HostCapabilities::new(&config.storage.scratch_path)
        .verify()
        .context("Host is not able to judge")?;

    tracing::info!(problem = %problem.display(), "Starting Themis");

    let judge = Judge::native(config);
    let report = judge
        .run(&problem)
        .await
        .with_context(|| format!("Judging {} failed", problem.display()))?;

    print!("{report}");
    judge.persist(&report).await.context("Failed to write results")?;

    Ok(report.outcome)
}
