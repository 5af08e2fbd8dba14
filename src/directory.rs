//! Tenant directory lookup.
//!
//! Resolves an enterprise customer UUID to the display metadata that goes into
//! reminder emails.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::DirectoryConfig;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("tenant {0} not found")]
    NotFound(Uuid),

    #[error("tenant directory request failed: {0}")]
    Transport(String),

    #[error("tenant directory returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("tenant directory response could not be decoded: {0}")]
    Decode(String),
}

/// Display metadata for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMetadata {
    pub display_name: String,
    pub slug: String,
    pub sender_alias: String,
    pub contact_email: Option<String>,
    pub default_language: Option<String>,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve_tenant_metadata(&self, tenant_id: Uuid)
        -> Result<TenantMetadata, DirectoryError>;
}

/// Wire shape of the enterprise customer endpoint.
#[derive(Debug, Deserialize)]
struct EnterpriseCustomer {
    name: String,
    slug: String,
    #[serde(default)]
    sender_alias: Option<String>,
    #[serde(default)]
    contact_email: Option<String>,
    #[serde(default)]
    default_language: Option<String>,
}

/// HTTP client for the enterprise customer API.
#[derive(Debug, Clone)]
pub struct EnterpriseApiClient {
    http: Client,
    api_url: String,
    api_token: String,
    default_sender_alias: String,
}

impl EnterpriseApiClient {
    pub fn new(
        config: &DirectoryConfig,
        default_sender_alias: &str,
    ) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            default_sender_alias: default_sender_alias.to_string(),
        })
    }
}

#[async_trait]
impl TenantDirectory for EnterpriseApiClient {
    async fn resolve_tenant_metadata(
        &self,
        tenant_id: Uuid,
    ) -> Result<TenantMetadata, DirectoryError> {
        let url = format!("{}/enterprise-customer/{}/", self.api_url, tenant_id);
        debug!(%url, "Resolving tenant metadata");

        let mut request = self.http.get(&url);
        if !self.api_token.is_empty() {
            request = request.bearer_auth(&self.api_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(tenant_id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let customer: EnterpriseCustomer = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        let sender_alias = customer
            .sender_alias
            .filter(|alias| !alias.trim().is_empty())
            .unwrap_or_else(|| self.default_sender_alias.clone());

        Ok(TenantMetadata {
            display_name: customer.name,
            slug: customer.slug,
            sender_alias,
            contact_email: customer.contact_email,
            default_language: customer.default_language.filter(|l| !l.is_empty()),
        })
    }
}
