//! Background job scheduler for Lumen.
//!
//! Registers cron-driven reminder runs. Requires the `background-jobs` feature.
//!
//! # Available Jobs
//!
//! - **Expiration Reminder**: emails learners whose plan expires within the
//!   configured window (default: hourly at minute 0)
//!
//! - **Plan Expired Notice** (optional): emails learners whose plan expired
//!   during the last few days (default: daily at 09:00)
//!
//! Frequent runs are safe: a license is notified at most once per plan cycle,
//! and anything that failed is simply picked up by the next tick.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lumen::jobs::{JobScheduler, JobConfig};
//!
//! let config = JobConfig::from_config(&lumen_config)?;
//! let scheduler = JobScheduler::new(engine, config).await?;
//! scheduler.start().await?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::LumenConfig;
use crate::errors::{EngineError, EngineResult};
use crate::license::NoticeKind;
use crate::reminders::{ReminderEngine, RunRequest, RunSummary};
use crate::tenants::parse_tenant_ids;

/// Configuration for background jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Tenants processed on every tick
    pub tenant_ids: Vec<Uuid>,
    /// Cron expression for the reminder job
    pub reminder_cron: String,
    /// Reminder window in days
    pub reminder_days: u32,
    /// Whether the plan-expired notice job is registered
    pub plan_expired_enabled: bool,
    /// Cron expression for the plan-expired notice job
    pub plan_expired_cron: String,
    /// Lookback in days for the plan-expired notice
    pub plan_expired_days: u32,
}

impl JobConfig {
    /// Build job settings from the loaded configuration.
    ///
    /// Tenant parsing happens here, so a bad tenant list fails at startup
    /// instead of on every tick.
    pub fn from_config(config: &LumenConfig) -> EngineResult<Self> {
        let tenant_ids = parse_tenant_ids(&config.jobs.tenants)?;
        if tenant_ids.is_empty() {
            return Err(EngineError::Config(
                "jobs.tenants must list at least one tenant".to_string(),
            ));
        }

        Ok(Self {
            tenant_ids,
            reminder_cron: config.jobs.reminder_cron.clone(),
            reminder_days: config.reminders.days_before_expiration,
            plan_expired_enabled: config.jobs.plan_expired_enabled,
            plan_expired_cron: config.jobs.plan_expired_cron.clone(),
            plan_expired_days: config.reminders.days_since_expiration,
        })
    }
}

/// Background job scheduler for Lumen.
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    engine: Arc<ReminderEngine>,
    config: JobConfig,
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub async fn new(engine: Arc<ReminderEngine>, config: JobConfig) -> EngineResult<Self> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            engine,
            config,
        })
    }

    /// Start the job scheduler with all configured jobs.
    pub async fn start(&self) -> EngineResult<()> {
        info!("Starting Lumen job scheduler");

        self.add_notice_job(
            NoticeKind::ExpirationReminder,
            &self.config.reminder_cron,
            self.config.reminder_days,
        )
        .await?;

        if self.config.plan_expired_enabled {
            self.add_notice_job(
                NoticeKind::PlanExpired,
                &self.config.plan_expired_cron,
                self.config.plan_expired_days,
            )
            .await?;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        info!("Lumen job scheduler started successfully");

        Ok(())
    }

    /// Stop the job scheduler.
    pub async fn shutdown(&mut self) -> EngineResult<()> {
        info!("Shutting down Lumen job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        Ok(())
    }

    async fn add_notice_job(&self, notice: NoticeKind, cron: &str, days: u32) -> EngineResult<()> {
        let engine = Arc::clone(&self.engine);
        let tenant_ids = self.config.tenant_ids.clone();

        let job = Job::new_async(cron, move |_uuid, _l| {
            let engine = Arc::clone(&engine);
            let tenant_ids = tenant_ids.clone();
            Box::pin(async move {
                let request = RunRequest {
                    notice,
                    tenant_ids,
                    now: Utc::now(),
                    days,
                    dry_run: false,
                };
                info!(%notice, "Running scheduled reminder job at {}", request.now);
                log_scheduled_outcome(notice, engine.run_request(&request).await);
            })
        })
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        info!(%notice, "Added reminder job (schedule: {}, window: {} days)", cron, days);

        Ok(())
    }

    /// Run a notice immediately (useful for testing or manual triggers).
    pub async fn run_now(&self, notice: NoticeKind, dry_run: bool) -> EngineResult<RunSummary> {
        let days = match notice {
            NoticeKind::ExpirationReminder => self.config.reminder_days,
            NoticeKind::PlanExpired => self.config.plan_expired_days,
        };

        self.engine
            .run_request(&RunRequest {
                notice,
                tenant_ids: self.config.tenant_ids.clone(),
                now: Utc::now(),
                days,
                dry_run,
            })
            .await
    }
}

fn log_scheduled_outcome(notice: NoticeKind, outcome: EngineResult<RunSummary>) {
    match outcome {
        Ok(summary) if summary.is_clean() => {
            info!(%notice, sent = summary.total_success, "Scheduled reminder job finished cleanly");
        }
        Ok(summary) => {
            warn!(
                %notice,
                sent = summary.total_success,
                failed = summary.total_failure,
                "Scheduled reminder job finished with failures; they will be retried next tick"
            );
        }
        Err(e) => {
            error!(%notice, "Scheduled reminder job failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_config_requires_tenants() {
        let config = LumenConfig::default();
        let err = JobConfig::from_config(&config).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn job_config_takes_defaults_from_reminders() {
        let mut config = LumenConfig::default();
        config.jobs.tenants = "550e8400-e29b-41d4-a716-446655440000".to_string();

        let job_config = JobConfig::from_config(&config).unwrap();
        assert_eq!(job_config.tenant_ids.len(), 1);
        assert_eq!(job_config.reminder_cron, "0 0 * * * *");
        assert_eq!(job_config.reminder_days, 30);
        assert_eq!(job_config.plan_expired_days, 7);
        assert!(!job_config.plan_expired_enabled);
    }
}
