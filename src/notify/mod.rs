//! Notification delivery.
//!
//! The reminder engine needs two things from an email provider: registering
//! an alias for a learner email, and triggering a templated campaign for a
//! list of recipients. [`Notifier`] is that seam; [`BrazeClient`] implements
//! it over the Braze REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub mod braze;

pub use braze::BrazeClient;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification provider is not configured: {0}")]
    NotConfigured(String),

    #[error("request to notification provider failed: {0}")]
    Transport(String),

    #[error("notification provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// One campaign recipient.
///
/// `attributes` are stored on the provider's user profile; `trigger_properties`
/// are only visible to the message template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRecipient {
    pub email: String,
    pub alias_label: String,
    pub attributes: BTreeMap<String, Value>,
    pub trigger_properties: BTreeMap<String, Value>,
}

/// Email provider operations consumed by the dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Register `emails` under `label`. Re-registering an existing alias is
    /// not an error.
    async fn create_alias(&self, emails: &[String], label: &str) -> Result<(), NotifyError>;

    /// Trigger `campaign_id` for `recipients`.
    async fn send_campaign(
        &self,
        campaign_id: &str,
        recipients: &[CampaignRecipient],
    ) -> Result<(), NotifyError>;
}
