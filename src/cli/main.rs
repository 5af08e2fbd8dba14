//! `send_license_expiration_reminders` - one reminder run from the command line.
//!
//! ```text
//! send_license_expiration_reminders --tenants "uuid1,uuid2" --days 30 --dry-run
//! ```
//!
//! Exit codes: 0 clean run, 1 run finished with failures (safe to retry),
//! 2 the run never started (configuration or setup error).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::error;

use lumen::config::LumenConfig;
use lumen::directory::EnterpriseApiClient;
use lumen::errors::{EngineError, EngineResult};
use lumen::logging::init_tracing;
use lumen::notify::BrazeClient;
use lumen::reminders::{ReminderEngine, RunRequest, RunSummary};
use lumen::storage::Database;
use lumen::tenants::parse_tenant_ids;
use lumen::NoticeKind;

#[derive(Debug, Parser)]
#[command(
    name = "send_license_expiration_reminders",
    about = "Email learners whose enterprise license is about to expire"
)]
struct Cli {
    /// Tenant UUID(s), separated by commas and/or whitespace
    #[arg(long = "tenants", alias = "enterprise-customer-uuid")]
    tenants: String,

    /// Window in days (reminder lookahead or plan-expired lookback)
    #[arg(long = "days", alias = "days-before-expiration")]
    days: Option<u32>,

    /// Log what would be sent without sending or recording anything
    #[arg(long)]
    dry_run: bool,

    /// Which notice to send: reminder or plan-expired
    #[arg(long, default_value = "reminder")]
    notice: NoticeKind,

    /// Configuration file (defaults to ./config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

async fn run(cli: Cli) -> EngineResult<RunSummary> {
    let config = match &cli.config {
        Some(path) => LumenConfig::load_from(path)?,
        None => LumenConfig::load()?,
    };
    config.validate()?;
    init_tracing(&config.logging);

    let tenant_ids = parse_tenant_ids(&cli.tenants)?;
    let days = cli
        .days
        .unwrap_or_else(|| config.reminders.default_days(cli.notice));

    let store = Database::new(&config.database).await?;
    store.ensure_schema().await?;
    let notifier = BrazeClient::new(
        &config.braze,
        Duration::from_secs(config.reminders.send_timeout_secs),
    )?;
    let directory =
        EnterpriseApiClient::new(&config.directory, &config.reminders.default_sender_alias)?;

    let engine = ReminderEngine::new(
        store,
        Arc::new(notifier),
        Arc::new(directory),
        config.reminders.clone(),
    );

    engine
        .run_request(&RunRequest {
            notice: cli.notice,
            tenant_ids,
            now: Utc::now(),
            days,
            dry_run: cli.dry_run,
        })
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) => {
            if let Ok(json) = serde_json::to_string_pretty(&summary) {
                println!("{json}");
            }
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                eprintln!(
                    "{} {} notice(s) failed across {} tenant(s); safe to retry on the next run",
                    summary.total_failure,
                    summary.notice,
                    summary.tenants.len()
                );
                ExitCode::from(1)
            }
        }
        Err(e) => {
            error!("Reminder run aborted: {e}");
            let kind = if matches!(e, EngineError::Config(_)) {
                "configuration error"
            } else {
                "setup error"
            };
            eprintln!("{kind}: {e}");
            ExitCode::from(2)
        }
    }
}
