//! ledgerctl: operator CLI for the change journal.
//!
//! Usage:
//!   ledgerctl --config engine.toml replay --journal data/journal.log
//!   ledgerctl verify --journal data/journal.log

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use ledger_kernel::consistency::{check_ledger, ConsistencyReport};
use ledger_kernel::domain::{EntityBalance, LedgerType};
use ledger_kernel::fixes::LedgerFix;

use ledger_runtime::config::EngineConfig;
use ledger_runtime::documents;
use ledger_runtime::drift::verify_determinism;
use ledger_runtime::error::{ConfigError, JournalError, ServiceError};
use ledger_runtime::journal::read_journal;
use ledger_runtime::replay::{ledger_aggregates, rebuild_store, state_fingerprint};
use ledger_runtime::store::load;
use ledger_runtime::telemetry;

#[derive(Parser, Debug)]
#[command(name = "ledgerctl")]
#[command(about = "Replay and verify a ledger change journal")]
struct Args {
    /// Engine config (TOML). Defaults apply when omitted.
    #[arg(long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild a store from the journal and print a consistency report
    /// for every ledger aggregate.
    Replay {
        /// Journal file. Falls back to `[journal] path` from the config.
        #[arg(long)]
        journal: Option<PathBuf>,
    },
    /// Replay the journal twice and compare state fingerprints.
    Verify {
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no journal given: pass --journal or set [journal] path")]
    MissingJournal,
    #[error("failed to encode report")]
    Json(#[from] serde_json::Error),
    #[error("replay is not deterministic: {first} != {second}")]
    Nondeterministic { first: String, second: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerReportLine {
    organization_id: String,
    ledger_type: LedgerType,
    ledger_id: String,
    #[serde(flatten)]
    report: ConsistencyReport<LedgerFix>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayOutput {
    notifications: usize,
    fingerprint: String,
    ledgers: Vec<LedgerReportLine>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match args.config.as_deref().map(EngineConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("ledgerctl: {e}");
            return ExitCode::FAILURE;
        }
    };
    telemetry::init(&config.log_level);

    match run(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ledgerctl failed");
            eprintln!("ledgerctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &EngineConfig) -> Result<(), CliError> {
    match command {
        Command::Replay { journal } => {
            let path = journal_path(journal, config)?;
            let notifications = read_journal(&path)?;
            let store = rebuild_store(&notifications, config)?;

            let mut ledgers = Vec::new();
            for organization_id in store.organizations() {
                for aggregate in ledger_aggregates(&store, &organization_id)? {
                    let entity: Option<EntityBalance> = load(
                        &store,
                        &documents::entity(aggregate.ledger_type, &organization_id, &aggregate.entity_id),
                    )
                    .map_err(ServiceError::from)?;
                    let ledger_id = aggregate.ledger_id();
                    let report = check_ledger(&ledger_id, Some(&aggregate), entity.as_ref(), config.balance_policy());
                    ledgers.push(LedgerReportLine {
                        organization_id: organization_id.clone(),
                        ledger_type: aggregate.ledger_type,
                        ledger_id,
                        report,
                    });
                }
            }

            let output = ReplayOutput {
                notifications: notifications.len(),
                fingerprint: state_fingerprint(&store)?,
                ledgers,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Command::Verify { journal } => {
            let path = journal_path(journal, config)?;
            let notifications = read_journal(&path)?;
            let check = verify_determinism(&notifications, config)?;
            if !check.is_deterministic() {
                return Err(CliError::Nondeterministic {
                    first: check.first,
                    second: check.second,
                });
            }
            info!(notifications = notifications.len(), fingerprint = %check.first, "Replay is deterministic");
            println!("{}", check.first);
            Ok(())
        }
    }
}

fn journal_path(arg: Option<PathBuf>, config: &EngineConfig) -> Result<PathBuf, CliError> {
    arg.or_else(|| config.journal.path.clone())
        .ok_or(CliError::MissingJournal)
}
