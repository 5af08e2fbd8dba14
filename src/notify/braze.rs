//! Braze REST client.
//!
//! Only the two endpoints the reminder engine uses are wrapped:
//! - `POST /users/alias/new`
//! - `POST /campaigns/trigger/send`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::BrazeConfig;

use super::{CampaignRecipient, NotifyError, Notifier};

#[derive(Debug, Clone)]
pub struct BrazeClient {
    http: Client,
    api_url: String,
    api_key: String,
}

impl BrazeClient {
    /// Build a client from the `[braze]` section.
    ///
    /// `timeout` bounds each HTTP request; the dispatcher applies its own
    /// timeout on top, so either one firing is a failed send.
    pub fn new(config: &BrazeConfig, timeout: Duration) -> Result<Self, NotifyError> {
        if config.api_key.trim().is_empty() {
            return Err(NotifyError::NotConfigured("missing braze.api_key".into()));
        }
        if config.api_url.trim().is_empty() {
            return Err(NotifyError::NotConfigured("missing braze.api_url".into()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), NotifyError> {
        let url = format!("{}{}", self.api_url, path);
        debug!(%url, "Calling Braze");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn recipient_payload(recipient: &CampaignRecipient) -> Value {
    let mut attributes = serde_json::Map::new();
    attributes.insert("email".to_string(), Value::String(recipient.email.clone()));
    for (key, value) in &recipient.attributes {
        attributes.insert(key.clone(), value.clone());
    }

    json!({
        "user_alias": {
            "alias_label": recipient.alias_label,
            "alias_name": recipient.email,
        },
        "attributes": attributes,
        "trigger_properties": recipient.trigger_properties,
    })
}

#[async_trait]
impl Notifier for BrazeClient {
    async fn create_alias(&self, emails: &[String], label: &str) -> Result<(), NotifyError> {
        let aliases: Vec<Value> = emails
            .iter()
            .map(|email| json!({ "alias_name": email, "alias_label": label }))
            .collect();

        self.post("/users/alias/new", &json!({ "user_aliases": aliases }))
            .await
    }

    async fn send_campaign(
        &self,
        campaign_id: &str,
        recipients: &[CampaignRecipient],
    ) -> Result<(), NotifyError> {
        let recipients: Vec<Value> = recipients.iter().map(recipient_payload).collect();

        self.post(
            "/campaigns/trigger/send",
            &json!({
                "campaign_id": campaign_id,
                "recipients": recipients,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_api_key_is_rejected() {
        let config = BrazeConfig::default();
        let err = BrazeClient::new(&config, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }

    #[test]
    fn recipient_payload_carries_alias_and_email_attribute() {
        let mut attributes = BTreeMap::new();
        attributes.insert("enterprise_default_language".to_string(), json!("fr"));

        let payload = recipient_payload(&CampaignRecipient {
            email: "learner@example.com".to_string(),
            alias_label: "Enterprise".to_string(),
            attributes,
            trigger_properties: BTreeMap::new(),
        });

        assert_eq!(payload["user_alias"]["alias_name"], "learner@example.com");
        assert_eq!(payload["user_alias"]["alias_label"], "Enterprise");
        assert_eq!(payload["attributes"]["email"], "learner@example.com");
        assert_eq!(payload["attributes"]["enterprise_default_language"], "fr");
    }
}
