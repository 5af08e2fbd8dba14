//! Batch orchestration across tenants.
//!
//! A run walks the requested tenants in order. Each tenant and each license is
//! its own error boundary: a failure becomes a count in the [`RunSummary`] and
//! the run moves on. Only configuration problems, detected before the first
//! tenant is touched, come back as `Err`.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{RemindersConfig, MAX_WINDOW_DAYS};
use crate::directory::{TenantDirectory, TenantMetadata};
use crate::errors::{EngineError, EngineResult};
use crate::license::{License, NoticeKind};
use crate::logging::{log_reminder_event, ReminderEvent};
use crate::notify::Notifier;
use crate::storage::{LicenseStore, StorageError};

use super::dispatcher::{DispatchError, DispatchSettings, ReminderDispatcher, SentinelWrite};
use super::selector::select_for_notice;

/// Counts for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSummary {
    pub tenant_id: Uuid,
    pub success: u32,
    pub failure: u32,
    pub would_notify: u32,
    /// Set when the tenant itself failed (directory lookup, query).
    pub error: Option<String>,
}

impl TenantSummary {
    fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            success: 0,
            failure: 0,
            would_notify: 0,
            error: None,
        }
    }

    fn record(&mut self, outcome: LicenseOutcome) {
        match outcome {
            LicenseOutcome::WouldNotify => self.would_notify += 1,
            LicenseOutcome::Sent => self.success += 1,
            LicenseOutcome::Failed => self.failure += 1,
        }
    }

    fn fail_tenant(&mut self, cause: String) {
        self.failure += 1;
        self.error = Some(cause);
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub notice: NoticeKind,
    pub dry_run: bool,
    pub total_success: u32,
    pub total_failure: u32,
    pub total_would_notify: u32,
    pub tenants: Vec<TenantSummary>,
}

impl RunSummary {
    /// False iff anything failed. A partially successful run is not clean.
    pub fn is_clean(&self) -> bool {
        self.total_failure == 0
    }

    pub fn tenant(&self, tenant_id: Uuid) -> Option<&TenantSummary> {
        self.tenants.iter().find(|t| t.tenant_id == tenant_id)
    }
}

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub notice: NoticeKind,
    pub tenant_ids: Vec<Uuid>,
    pub now: DateTime<Utc>,
    /// Window length in days: lookahead for reminders, lookback for the
    /// post-expiration notice.
    pub days: u32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LicenseOutcome {
    WouldNotify,
    Sent,
    Failed,
}

/// Runs reminder batches against a store, a notifier and a tenant directory.
pub struct ReminderEngine {
    store: Arc<dyn LicenseStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn TenantDirectory>,
    config: RemindersConfig,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn TenantDirectory>,
        config: RemindersConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            config,
        }
    }

    /// Send pre-expiration reminders for `tenant_ids`.
    pub async fn run(
        &self,
        tenant_ids: &[Uuid],
        now: DateTime<Utc>,
        window_days: u32,
        dry_run: bool,
    ) -> EngineResult<RunSummary> {
        self.run_request(&RunRequest {
            notice: NoticeKind::ExpirationReminder,
            tenant_ids: tenant_ids.to_vec(),
            now,
            days: window_days,
            dry_run,
        })
        .await
    }

    /// Run any notice kind.
    pub async fn run_request(&self, request: &RunRequest) -> EngineResult<RunSummary> {
        let dispatcher = self.prepare(request)?;
        let tenant_ids = dedup_in_order(&request.tenant_ids);

        info!(
            notice = %request.notice,
            tenants = tenant_ids.len(),
            days = request.days,
            dry_run = request.dry_run,
            "Starting reminder run"
        );

        let mut summary = RunSummary {
            notice: request.notice,
            dry_run: request.dry_run,
            total_success: 0,
            total_failure: 0,
            total_would_notify: 0,
            tenants: Vec::with_capacity(tenant_ids.len()),
        };

        for tenant_id in tenant_ids {
            let span = info_span!("tenant", tenant = %tenant_id);
            let tenant = self
                .process_tenant(&dispatcher, request, tenant_id)
                .instrument(span)
                .await;

            summary.total_success += tenant.success;
            summary.total_failure += tenant.failure;
            summary.total_would_notify += tenant.would_notify;
            summary.tenants.push(tenant);
        }

        info!(
            notice = %request.notice,
            tenants = summary.tenants.len(),
            total_success = summary.total_success,
            total_failure = summary.total_failure,
            total_would_notify = summary.total_would_notify,
            dry_run = request.dry_run,
            "Completed reminder run"
        );

        Ok(summary)
    }

    /// Configuration checks. Nothing has been queried when these fail.
    fn prepare(&self, request: &RunRequest) -> EngineResult<ReminderDispatcher> {
        let campaign_id = self.config.campaign_for(request.notice)?.to_string();

        if request.days == 0 {
            return Err(EngineError::Config(
                "window days must be a positive integer".to_string(),
            ));
        }
        let window = request.notice.window(request.now, request.days);
        if request.days > MAX_WINDOW_DAYS || window.is_none() {
            return Err(EngineError::Config(format!(
                "window of {} days is out of range (maximum {MAX_WINDOW_DAYS})",
                request.days
            )));
        }
        if request.tenant_ids.is_empty() {
            error!("No valid tenant identifiers provided");
            return Err(EngineError::Config(
                "no valid tenant identifiers provided".to_string(),
            ));
        }
        if self.config.max_concurrent_sends == 0 {
            return Err(EngineError::Config(
                "reminders.max_concurrent_sends must be greater than 0".to_string(),
            ));
        }

        Ok(ReminderDispatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            DispatchSettings {
                notice: request.notice,
                campaign_id,
                alias_label: self.config.alias_label.clone(),
                send_timeout: Duration::from_secs(self.config.send_timeout_secs.max(1)),
            },
        ))
    }

    async fn process_tenant(
        &self,
        dispatcher: &ReminderDispatcher,
        request: &RunRequest,
        tenant_id: Uuid,
    ) -> TenantSummary {
        info!(
            notice = %request.notice,
            days = request.days,
            dry_run = request.dry_run,
            "Processing tenant"
        );

        let mut tenant = TenantSummary::new(tenant_id);
        let mut stream_error: Option<StorageError> = None;

        let mut eligible = select_for_notice(
            self.store.as_ref(),
            tenant_id,
            request.notice,
            request.now,
            request.days,
        )
        .peekable();

        if Pin::new(&mut eligible).peek().await.is_none() {
            info!(
                notice = %request.notice,
                days = request.days,
                "No activated licenses found for tenant"
            );
            return tenant;
        }

        // Dry runs never touch the directory.
        let metadata = if request.dry_run {
            None
        } else {
            match self.directory.resolve_tenant_metadata(tenant_id).await {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    error!(cause = %e, "Failed to resolve tenant metadata");
                    tenant.fail_tenant(format!("tenant directory lookup failed: {e}"));
                    return tenant;
                }
            }
        };

        let licenses: Pin<Box<dyn Stream<Item = License> + Send + '_>> =
            Box::pin(eligible.scan(&mut stream_error, |slot, item| {
                future::ready(match item {
                    Ok(license) => Some(license),
                    Err(e) => {
                        **slot = Some(e);
                        None
                    }
                })
            }));

        let concurrency = self.config.max_concurrent_sends;
        tenant = licenses
            .map(|license| self.handle_license(dispatcher, metadata.as_ref(), request, license))
            .buffer_unordered(concurrency)
            .fold(tenant, |mut tenant, outcome| {
                tenant.record(outcome);
                future::ready(tenant)
            })
            .await;

        if let Some(e) = stream_error {
            error!(cause = %e, "License query failed mid-run");
            tenant.fail_tenant(format!("license query failed: {e}"));
        }

        info!(
            success = tenant.success,
            failure = tenant.failure,
            would_notify = tenant.would_notify,
            "Completed tenant"
        );

        tenant
    }

    async fn handle_license(
        &self,
        dispatcher: &ReminderDispatcher,
        metadata: Option<&TenantMetadata>,
        request: &RunRequest,
        license: License,
    ) -> LicenseOutcome {
        let license_id = license.license_id.to_string();

        let metadata = match metadata {
            Some(metadata) if !request.dry_run => metadata,
            _ => {
                let details = format!(
                    "email={} expiration_date={}",
                    license.user_email.as_deref().unwrap_or("<none>"),
                    license.plan.expiration_date.format("%Y-%m-%d")
                );
                log_reminder_event(ReminderEvent::WouldNotify, &license_id, Some(&details));
                return LicenseOutcome::WouldNotify;
            }
        };

        match dispatcher.dispatch(&license, metadata, request.now).await {
            Ok(sent) => {
                match sent.sentinel {
                    SentinelWrite::Recorded => {
                        log_reminder_event(ReminderEvent::Sent, &license_id, None)
                    }
                    SentinelWrite::AlreadySet => {
                        log_reminder_event(ReminderEvent::AlreadyMarked, &license_id, None)
                    }
                    SentinelWrite::Failed(cause) => log_reminder_event(
                        ReminderEvent::SentinelWriteFailed,
                        &license_id,
                        Some(&cause),
                    ),
                }
                LicenseOutcome::Sent
            }
            Err(e @ DispatchError::MissingRecipient(_)) => {
                log_reminder_event(
                    ReminderEvent::MissingRecipient,
                    &license_id,
                    Some(&e.to_string()),
                );
                LicenseOutcome::Failed
            }
            Err(e) => {
                log_reminder_event(ReminderEvent::Failed, &license_id, Some(&e.to_string()));
                LicenseOutcome::Failed
            }
        }
    }
}

fn dedup_in_order(tenant_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(tenant_ids.len());
    let deduped: Vec<Uuid> = tenant_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    if deduped.len() != tenant_ids.len() {
        warn!(
            requested = tenant_ids.len(),
            unique = deduped.len(),
            "Duplicate tenant identifiers ignored"
        );
    }
    deduped
}
