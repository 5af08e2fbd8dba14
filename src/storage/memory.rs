use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use crate::license::{ExpirationWindow, License, LicenseStatus, NoticeKind};

use super::{LicenseStore, StorageError, StorageResult};

/// An in-process license store.
///
/// Keyed by license id so query results come back in a stable order. The
/// whole map sits behind one mutex, which also makes the sentinel write a
/// true compare-and-set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: Mutex<BTreeMap<Uuid, License>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<Uuid, License>>> {
        self.licenses
            .lock()
            .map_err(|_| StorageError::Query("failed to acquire license store lock".into()))
    }

    /// Insert or replace a license.
    pub fn insert(&self, license: License) -> StorageResult<()> {
        self.lock()?.insert(license.license_id, license);
        Ok(())
    }

    pub fn get(&self, license_id: Uuid) -> StorageResult<Option<License>> {
        Ok(self.lock()?.get(&license_id).cloned())
    }

    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl LicenseStore for MemoryStore {
    fn query_activated_licenses<'a>(
        &'a self,
        tenant_id: Uuid,
        window: ExpirationWindow,
        notice: NoticeKind,
    ) -> BoxStream<'a, StorageResult<License>> {
        let matching = match self.lock() {
            Ok(map) => map
                .values()
                .filter(|l| {
                    l.status == LicenseStatus::Activated
                        && l.plan.tenant_id == tenant_id
                        && notice.sent_at(l).is_none()
                        && window.contains(l.plan.expiration_date)
                })
                .cloned()
                .map(Ok)
                .collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        };

        stream::iter(matching).boxed()
    }

    async fn conditional_set_sent(
        &self,
        license_id: Uuid,
        notice: NoticeKind,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut map = self.lock()?;
        let Some(license) = map.get_mut(&license_id) else {
            return Ok(false);
        };

        if license.status != LicenseStatus::Activated || notice.sent_at(license).is_some() {
            return Ok(false);
        }

        match notice {
            NoticeKind::ExpirationReminder => license.expiration_reminder_sent_at = Some(sent_at),
            NoticeKind::PlanExpired => license.plan_expiration_email_sent_at = Some(sent_at),
        }
        Ok(true)
    }
}
