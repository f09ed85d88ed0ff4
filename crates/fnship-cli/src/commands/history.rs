use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use fnship_core::Environment;
use fnship_core::config::{DEFAULT_STATE_DIR, LEDGER_FILE_NAME};
use fnship_ledger::RedbLedger;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Function name (its directory name).
    pub function: String,

    /// Environment: dev, qa or prod.
    #[arg(short, long, env = "ENVIRONMENT")]
    pub environment: String,

    /// Maximum number of records to show.
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Directory holding the ledger.
    #[arg(long, env = "FNSHIP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

pub fn run(args: HistoryArgs, config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let environment: Environment = args.environment.parse()?;
    let file = super::load_file_config(config_path)?;
    let state_dir = args
        .state_dir
        .or_else(|| file.as_ref().and_then(|f| f.state_dir()).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

    let ledger_path = state_dir.join(LEDGER_FILE_NAME);
    let ledger = RedbLedger::open(&ledger_path)
        .with_context(|| format!("opening ledger {}", ledger_path.display()))?;
    let records = ledger.list_history(&args.function, environment, args.limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No deployments of {} in {environment}", args.function);
        return Ok(());
    }

    println!(
        "{:<48} {:<14} {:<22} {:<12} DEVELOPER",
        "DEPLOYMENT", "FINGERPRINT", "DEPLOYED AT", "COMMIT"
    );
    for record in &records {
        println!(
            "{:<48} {:<14} {:<22} {:<12} {}",
            record.deployment_id.as_str(),
            record.fingerprint.short(),
            record.deployed_at,
            record.commit_id,
            record.developer
        );
    }
    Ok(())
}
