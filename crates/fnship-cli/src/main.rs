//! fnship — deploy changed functions, roll them back, inspect history.
//!
//! Exit codes: 0 success, 1 configuration failure, 2 deployment failure,
//! 3 unexpected failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use fnship_core::CoreError;
use fnship_deploy::{DeployError, Outcome, RunSummary};
use fnship_ledger::LedgerError;
use fnship_store::StoreError;
use tracing::error;

mod commands;

use commands::deploy::DeployArgs;
use commands::history::HistoryArgs;

const EXIT_SUCCESS: u8 = 0;
const EXIT_CONFIGURATION: u8 = 1;
const EXIT_DEPLOYMENT: u8 = 2;
const EXIT_UNEXPECTED: u8 = 3;

#[derive(Parser)]
#[command(
    name = "fnship",
    about = "fnship — content-addressed function deployments",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to fnship.toml (default: ./fnship.toml when present)
    #[arg(long, global = true, env = "FNSHIP_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Log level used when RUST_LOG is unset (e.g. info, debug).
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every function whose source changed since its last deployment.
    ///
    /// With --rollback, repoint each eligible function at the artifact it
    /// ran before its latest deployment instead.
    Deploy(DeployArgs),
    /// Roll functions back to their previous deployment (deploy --rollback).
    Rollback(DeployArgs),
    /// Show recorded deployments of a function, newest first.
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.log_level.as_deref());
    let json = cli.log_format == LogFormat::Json;

    let result = match cli.command {
        Commands::Deploy(args) => {
            commands::deploy::run(args, cli.config.as_deref(), false, json)
                .await
                .map(|summary| exit_for_summary(&summary))
        }
        Commands::Rollback(args) => {
            commands::deploy::run(args, cli.config.as_deref(), true, json)
                .await
                .map(|summary| exit_for_summary(&summary))
        }
        Commands::History(args) => {
            commands::history::run(args, cli.config.as_deref(), json).map(|()| EXIT_SUCCESS)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "fnship failed");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn init_tracing(format: LogFormat, level: Option<&str>) {
    let default = format!(
        "{},fnship=debug",
        level.map(str::to_ascii_lowercase).as_deref().unwrap_or("info")
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&default))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Exit status for a completed run.
fn exit_for_summary(summary: &RunSummary) -> u8 {
    if summary.is_success() {
        return EXIT_SUCCESS;
    }
    let panicked = summary
        .reports
        .iter()
        .any(|r| matches!(r.outcome, Outcome::Failed(DeployError::Worker(_))));
    if panicked {
        EXIT_UNEXPECTED
    } else {
        EXIT_DEPLOYMENT
    }
}

/// Exit status for an error that aborted the run before or instead of it.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<CoreError>()
            || matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::Bucket(_)))
        {
            return EXIT_CONFIGURATION;
        }
        if cause.is::<DeployError>() || cause.is::<LedgerError>() || cause.is::<StoreError>() {
            return EXIT_DEPLOYMENT;
        }
    }
    EXIT_UNEXPECTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use fnship_core::Environment;
    use fnship_deploy::UnitReport;

    #[test]
    fn configuration_errors_exit_1() {
        let err = anyhow::Error::from(CoreError::MissingEnvironment);
        assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);

        let err = anyhow::Error::from(StoreError::Bucket("missing".into()))
            .context("validating artifact bucket");
        assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);
    }

    #[test]
    fn ledger_errors_exit_2() {
        let err = Err::<(), _>(LedgerError::Open("locked".into()))
            .context("opening ledger")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_DEPLOYMENT);
    }

    #[test]
    fn anything_else_exits_3() {
        let err = anyhow::anyhow!("runtime exploded");
        assert_eq!(exit_code_for(&err), EXIT_UNEXPECTED);
    }

    #[test]
    fn summary_exit_codes() {
        let mut summary = RunSummary::default();
        assert_eq!(exit_for_summary(&summary), EXIT_SUCCESS);

        summary.push(UnitReport::from_result(
            "f1".into(),
            Err(DeployError::NoRollbackTarget {
                function: "f1".into(),
                environment: Environment::Prod,
            }),
        ));
        assert_eq!(exit_for_summary(&summary), EXIT_DEPLOYMENT);

        summary.push(UnitReport::from_result(
            "f2".into(),
            Err(DeployError::Worker("worker task panicked".into())),
        ));
        assert_eq!(exit_for_summary(&summary), EXIT_UNEXPECTED);
    }

    #[test]
    fn cli_parses_comma_separated_allow_list() {
        let cli = Cli::try_parse_from([
            "fnship",
            "rollback",
            "--environment",
            "prod",
            "--functions",
            "f1, f2",
        ])
        .unwrap();
        let Commands::Rollback(args) = cli.command else {
            panic!("expected rollback");
        };
        assert_eq!(args.functions, vec!["f1".to_string(), " f2".to_string()]);
    }
}
