//! Eligibility selection.
//!
//! The store evaluates the full predicate; this layer only computes the window
//! for the notice and re-checks each yielded row against the pure predicate, so
//! a misbehaving store can never cause a send to an ineligible license.

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::license::{is_notice_eligible, License, NoticeKind};
use crate::storage::{LicenseStore, StorageError, StorageResult};

/// Stream the licenses of `tenant_id` that need a pre-expiration reminder at
/// `now`, for a window of `window_days`.
pub fn select_eligible<'a>(
    store: &'a dyn LicenseStore,
    tenant_id: Uuid,
    now: DateTime<Utc>,
    window_days: u32,
) -> BoxStream<'a, StorageResult<License>> {
    select_for_notice(store, tenant_id, NoticeKind::ExpirationReminder, now, window_days)
}

/// Stream the licenses of `tenant_id` that need `notice` at `now`.
pub fn select_for_notice<'a>(
    store: &'a dyn LicenseStore,
    tenant_id: Uuid,
    notice: NoticeKind,
    now: DateTime<Utc>,
    days: u32,
) -> BoxStream<'a, StorageResult<License>> {
    let Some(window) = notice.window(now, days) else {
        warn!(tenant = %tenant_id, %notice, days, "Expiration window out of range");
        return stream::once(future::ready(Err(StorageError::Query(format!(
            "{notice} window of {days} days is out of range"
        )))))
        .boxed();
    };
    debug!(
        tenant = %tenant_id,
        %notice,
        from = %window.from,
        to = %window.to,
        "Selecting eligible licenses"
    );

    store
        .query_activated_licenses(tenant_id, window, notice)
        .filter(move |item| {
            let keep = match item {
                Ok(license) if license.tenant_id() != tenant_id => {
                    warn!(
                        license_id = %license.license_id,
                        tenant = %tenant_id,
                        "Store returned a license of another tenant; skipping"
                    );
                    false
                }
                Ok(license) if !is_notice_eligible(license, notice, now, days) => {
                    warn!(
                        license_id = %license.license_id,
                        %notice,
                        "Store returned an ineligible license; skipping"
                    );
                    false
                }
                _ => true,
            };
            future::ready(keep)
        })
        .boxed()
}
