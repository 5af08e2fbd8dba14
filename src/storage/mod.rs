//! License storage.
//!
//! The engine talks to persistence through [`LicenseStore`], which exposes the
//! two operations a reminder run needs: a filtered, streaming query and a
//! compare-and-set write of a notice sentinel.
//!
//! - `database` → sqlx-backed store over SQLite/Postgres
//! - `memory`   → in-process store for tests and local dry runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::license::{ExpirationWindow, License, NoticeKind};

pub mod database;
pub mod memory;

pub use database::Database;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("corrupt row for license {license_id}: {reason}")]
    CorruptRow { license_id: String, reason: String },

    #[error("unsupported database: {0}")]
    Unsupported(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence operations consumed by the reminder engine.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Stream activated licenses of `tenant_id` whose `notice` sentinel is
    /// unset and whose plan expires inside `window`.
    ///
    /// Implementations must apply the whole predicate in the store. Errors
    /// may surface at any point of the stream.
    fn query_activated_licenses<'a>(
        &'a self,
        tenant_id: Uuid,
        window: ExpirationWindow,
        notice: NoticeKind,
    ) -> BoxStream<'a, StorageResult<License>>;

    /// Set the `notice` sentinel to `sent_at` if, and only if, it is still
    /// unset and the license is still activated.
    ///
    /// Returns `false` when another writer got there first.
    async fn conditional_set_sent(
        &self,
        license_id: Uuid,
        notice: NoticeKind,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool>;
}
