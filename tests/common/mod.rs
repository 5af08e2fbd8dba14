//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use lumen::config::RemindersConfig;
use lumen::directory::{DirectoryError, TenantDirectory, TenantMetadata};
use lumen::license::{ExpirationWindow, License, NoticeKind, SubscriptionPlan};
use lumen::notify::{CampaignRecipient, Notifier, NotifyError};
use lumen::reminders::ReminderEngine;
use lumen::storage::{LicenseStore, MemoryStore, StorageError, StorageResult};

pub const CAMPAIGN: &str = "campaign-reminder";
pub const PLAN_EXPIRED_CAMPAIGN: &str = "campaign-plan-expired";

/// A fixed instant with whole seconds, so window arithmetic is exact.
pub fn fixed_now() -> DateTime<Utc> {
    "2026-06-01T12:00:00Z".parse().unwrap()
}

pub fn plan(tenant_id: Uuid, expiration_date: DateTime<Utc>) -> SubscriptionPlan {
    SubscriptionPlan {
        plan_id: Uuid::new_v4(),
        tenant_id,
        title: "Enterprise Annual".to_string(),
        expiration_date,
    }
}

/// An activated license with a unique learner email.
pub fn activated(tenant_id: Uuid, expiration_date: DateTime<Utc>) -> License {
    let mut license = License::provision(plan(tenant_id, expiration_date));
    license
        .assign(&format!("learner-{}@example.com", Uuid::new_v4()))
        .unwrap();
    license.activate().unwrap();
    license
}

pub fn tenant_metadata(slug: &str) -> TenantMetadata {
    TenantMetadata {
        display_name: format!("{slug} Inc."),
        slug: slug.to_string(),
        sender_alias: format!("{slug} Learning"),
        contact_email: Some(format!("admin@{slug}.test")),
        default_language: Some("en".to_string()),
    }
}

pub fn reminders_config() -> RemindersConfig {
    RemindersConfig {
        campaign_id: CAMPAIGN.to_string(),
        plan_expired_campaign_id: PLAN_EXPIRED_CAMPAIGN.to_string(),
        send_timeout_secs: 2,
        ..RemindersConfig::default()
    }
}

// ----------------------------------------------------------------------------
// Notifier
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub alias_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub sent: Mutex<Vec<(String, CampaignRecipient)>>,
    fail_alias_for: Mutex<HashSet<String>>,
    fail_send_for: Mutex<HashSet<String>>,
    send_delay: Mutex<Option<Duration>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_alias_for(&self, email: &str) {
        self.fail_alias_for.lock().unwrap().insert(email.to_string());
    }

    pub fn fail_send_for(&self, email: &str) {
        self.fail_send_for.lock().unwrap().insert(email.to_string());
    }

    pub fn delay_sends(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn alias_count(&self) -> usize {
        self.alias_calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Emails of recipients whose send succeeded.
    pub fn delivered_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.email.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn create_alias(&self, emails: &[String], _label: &str) -> Result<(), NotifyError> {
        self.alias_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_alias_for.lock().unwrap().clone();
        if emails.iter().any(|e| failing.contains(e)) {
            return Err(NotifyError::Rejected {
                status: 400,
                body: "alias rejected".to_string(),
            });
        }
        Ok(())
    }

    async fn send_campaign(
        &self,
        campaign_id: &str,
        recipients: &[CampaignRecipient],
    ) -> Result<(), NotifyError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.fail_send_for.lock().unwrap().clone();
        if recipients.iter().any(|r| failing.contains(&r.email)) {
            return Err(NotifyError::Transport("connection reset".to_string()));
        }

        let mut sent = self.sent.lock().unwrap();
        for recipient in recipients {
            sent.push((campaign_id.to_string(), recipient.clone()));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Directory
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct StaticDirectory {
    tenants: Mutex<HashMap<Uuid, TenantMetadata>>,
    failing: Mutex<HashSet<Uuid>>,
    pub lookups: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, tenant_id: Uuid, metadata: TenantMetadata) {
        self.tenants.lock().unwrap().insert(tenant_id, metadata);
    }

    pub fn fail(&self, tenant_id: Uuid) {
        self.failing.lock().unwrap().insert(tenant_id);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn resolve_tenant_metadata(
        &self,
        tenant_id: Uuid,
    ) -> Result<TenantMetadata, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&tenant_id) {
            return Err(DirectoryError::Transport("directory unavailable".to_string()));
        }
        self.tenants
            .lock()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .ok_or(DirectoryError::NotFound(tenant_id))
    }
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

/// Wraps a [`MemoryStore`], counting calls and injecting failures.
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    pub queries: AtomicUsize,
    pub writes: AtomicUsize,
    fail_writes: Mutex<bool>,
    fail_query_for: Mutex<HashSet<Uuid>>,
    /// Tenants whose query yields this many rows and then an error.
    fail_after: Mutex<HashMap<Uuid, usize>>,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, license: License) {
        self.inner.insert(license).unwrap();
    }

    pub fn get(&self, license_id: Uuid) -> License {
        self.inner.get(license_id).unwrap().unwrap()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn fail_query_for(&self, tenant_id: Uuid) {
        self.fail_query_for.lock().unwrap().insert(tenant_id);
    }

    pub fn fail_after(&self, tenant_id: Uuid, rows: usize) {
        self.fail_after.lock().unwrap().insert(tenant_id, rows);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseStore for InstrumentedStore {
    fn query_activated_licenses<'a>(
        &'a self,
        tenant_id: Uuid,
        window: ExpirationWindow,
        notice: NoticeKind,
    ) -> BoxStream<'a, StorageResult<License>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.fail_query_for.lock().unwrap().contains(&tenant_id) {
            return stream::iter(vec![Err(StorageError::Query("connection lost".into()))])
                .boxed();
        }

        let fail_after = self.fail_after.lock().unwrap().get(&tenant_id).copied();
        let inner = self.inner.query_activated_licenses(tenant_id, window, notice);
        match fail_after {
            Some(rows) => inner
                .take(rows)
                .chain(stream::iter(vec![Err(StorageError::Query(
                    "cursor closed".into(),
                ))]))
                .boxed(),
            None => inner,
        }
    }

    async fn conditional_set_sent(
        &self,
        license_id: Uuid,
        notice: NoticeKind,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_writes.lock().unwrap() {
            return Err(StorageError::Query("disk full".into()));
        }
        self.inner
            .conditional_set_sent(license_id, notice, sent_at)
            .await
    }
}

// ----------------------------------------------------------------------------
// Wiring
// ----------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<InstrumentedStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub directory: Arc<StaticDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: InstrumentedStore::new(),
            notifier: RecordingNotifier::new(),
            directory: StaticDirectory::new(),
        }
    }

    pub fn engine(&self) -> ReminderEngine {
        self.engine_with(reminders_config())
    }

    pub fn engine_with(&self, config: RemindersConfig) -> ReminderEngine {
        ReminderEngine::new(
            self.store.clone(),
            self.notifier.clone(),
            self.directory.clone(),
            config,
        )
    }

    /// Register a tenant in the directory and return its id.
    pub fn tenant(&self, slug: &str) -> Uuid {
        let tenant_id = Uuid::new_v4();
        self.directory.add(tenant_id, tenant_metadata(slug));
        tenant_id
    }

    /// Insert `count` activated licenses for `tenant_id` expiring at `expires`.
    pub fn seed(&self, tenant_id: Uuid, expires: DateTime<Utc>, count: usize) -> Vec<License> {
        (0..count)
            .map(|_| {
                let license = activated(tenant_id, expires);
                self.store.insert(license.clone());
                license
            })
            .collect()
    }
}
