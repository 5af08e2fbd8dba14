//! Single-license notify-and-mark.
//!
//! A dispatch is: resolve the recipient, register the provider alias, send the
//! campaign, then compare-and-set the notice sentinel. Nothing is written
//! unless the send succeeded, and nothing is retried here; the next scheduled
//! run picks up whatever is still unmarked.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::directory::TenantMetadata;
use crate::license::{License, NoticeKind};
use crate::notify::{CampaignRecipient, Notifier, NotifyError};
use crate::storage::LicenseStore;

/// Timestamp layout used in template properties.
pub const TEMPLATE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Why a license was not notified.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("license {0} has no recipient email")]
    MissingRecipient(Uuid),

    #[error("alias creation failed: {0}")]
    Alias(#[source] NotifyError),

    #[error("campaign send failed: {0}")]
    Send(#[source] NotifyError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
}

/// What happened to the sentinel after a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelWrite {
    /// This dispatch set the sentinel.
    Recorded,
    /// Someone else set it first; nothing was written.
    AlreadySet,
    /// The write failed; the license will be notified again on a later run.
    Failed(String),
}

/// A successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub license_id: Uuid,
    pub sentinel: SentinelWrite,
}

/// Fixed per-run dispatch parameters.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub notice: NoticeKind,
    pub campaign_id: String,
    pub alias_label: String,
    pub send_timeout: Duration,
}

pub struct ReminderDispatcher {
    store: Arc<dyn LicenseStore>,
    notifier: Arc<dyn Notifier>,
    settings: DispatchSettings,
}

impl ReminderDispatcher {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        notifier: Arc<dyn Notifier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Notify the learner holding `license` and record the send.
    pub async fn dispatch(
        &self,
        license: &License,
        tenant: &TenantMetadata,
        now: DateTime<Utc>,
    ) -> Result<Sent, DispatchError> {
        let email = license
            .user_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(DispatchError::MissingRecipient(license.license_id))?;

        let emails = [email.to_string()];
        self.bounded(
            "alias creation",
            self.notifier
                .create_alias(&emails, &self.settings.alias_label),
        )
        .await?
        .map_err(DispatchError::Alias)?;

        let recipient = build_recipient(
            license,
            email,
            tenant,
            self.settings.notice,
            &self.settings.alias_label,
            now,
        );
        self.bounded(
            "campaign send",
            self.notifier.send_campaign(
                &self.settings.campaign_id,
                std::slice::from_ref(&recipient),
            ),
        )
        .await?
        .map_err(DispatchError::Send)?;

        debug!(
            license_id = %license.license_id,
            notice = %self.settings.notice,
            "Campaign accepted by provider"
        );

        let sentinel = match self
            .store
            .conditional_set_sent(license.license_id, self.settings.notice, now)
            .await
        {
            Ok(true) => SentinelWrite::Recorded,
            Ok(false) => SentinelWrite::AlreadySet,
            Err(e) => SentinelWrite::Failed(e.to_string()),
        };

        Ok(Sent {
            license_id: license.license_id,
            sentinel,
        })
    }

    async fn bounded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, DispatchError> {
        tokio::time::timeout(self.settings.send_timeout, fut)
            .await
            .map_err(|_| DispatchError::Timeout {
                stage,
                after: self.settings.send_timeout,
            })
    }
}

/// Build the campaign recipient for one license.
pub fn build_recipient(
    license: &License,
    email: &str,
    tenant: &TenantMetadata,
    notice: NoticeKind,
    alias_label: &str,
    now: DateTime<Utc>,
) -> CampaignRecipient {
    let expiration_date = license.plan.expiration_date;

    let mut trigger_properties: BTreeMap<String, Value> = BTreeMap::new();
    trigger_properties.insert("license_uuid".into(), json!(license.license_id));
    trigger_properties.insert("enterprise_customer_slug".into(), json!(tenant.slug));
    trigger_properties.insert("enterprise_customer_name".into(), json!(tenant.display_name));
    trigger_properties.insert("enterprise_sender_alias".into(), json!(tenant.sender_alias));
    trigger_properties.insert("enterprise_contact_email".into(), json!(tenant.contact_email));
    trigger_properties.insert(
        "expiration_date".into(),
        json!(expiration_date.format(TEMPLATE_TIMESTAMP_FORMAT).to_string()),
    );
    trigger_properties.insert("subscription_plan_title".into(), json!(license.plan.title));

    match notice {
        NoticeKind::ExpirationReminder => {
            let days = (expiration_date - now).num_days();
            trigger_properties.insert("days_until_expiration".into(), json!(days));
        }
        NoticeKind::PlanExpired => {
            let days = (now.date_naive() - expiration_date.date_naive()).num_days();
            trigger_properties.insert("days_since_expiration".into(), json!(days));
        }
    }

    let mut attributes: BTreeMap<String, Value> = BTreeMap::new();
    attributes.insert(
        "enterprise_default_language".into(),
        json!(tenant.default_language.clone().unwrap_or_default()),
    );

    CampaignRecipient {
        email: email.to_string(),
        alias_label: alias_label.to_string(),
        attributes,
        trigger_properties,
    }
}
