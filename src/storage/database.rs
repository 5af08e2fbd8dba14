use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::{query, query_as, FromRow};
use tracing::error;
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use std::str::FromStr;

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::license::{ExpirationWindow, License, LicenseStatus, NoticeKind, SubscriptionPlan};

use super::{LicenseStore, StorageError, StorageResult};

/// A license joined with its plan, as returned by the eligibility query.
#[derive(Debug, Clone, FromRow)]
pub struct LicenseRow {
    pub license_id: String,
    pub status: String,
    pub user_email: Option<String>,
    pub plan_id: String,
    pub tenant_id: String,
    pub title: String,
    pub expiration_date: NaiveDateTime,
    pub expiration_reminder_sent_at: Option<NaiveDateTime>,
    pub plan_expiration_email_sent_at: Option<NaiveDateTime>,
}

impl LicenseRow {
    pub fn into_license(self) -> StorageResult<License> {
        let corrupt = |reason: String| StorageError::CorruptRow {
            license_id: self.license_id.clone(),
            reason,
        };

        let license_id = Uuid::parse_str(&self.license_id)
            .map_err(|e| corrupt(format!("license_id: {e}")))?;
        let plan_id =
            Uuid::parse_str(&self.plan_id).map_err(|e| corrupt(format!("plan_id: {e}")))?;
        let tenant_id =
            Uuid::parse_str(&self.tenant_id).map_err(|e| corrupt(format!("tenant_id: {e}")))?;
        let status = self
            .status
            .parse::<LicenseStatus>()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(License {
            license_id,
            status,
            user_email: self.user_email,
            plan: SubscriptionPlan {
                plan_id,
                tenant_id,
                title: self.title,
                expiration_date: self.expiration_date.and_utc(),
            },
            expiration_reminder_sent_at: self.expiration_reminder_sent_at.map(|t| t.and_utc()),
            plan_expiration_email_sent_at: self
                .plan_expiration_email_sent_at
                .map(|t| t.and_utc()),
        })
    }
}

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS subscription_plans (
        plan_id          TEXT PRIMARY KEY,
        tenant_id        TEXT NOT NULL,
        title            TEXT NOT NULL,
        expiration_date  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        license_id                     TEXT PRIMARY KEY,
        plan_id                        TEXT NOT NULL REFERENCES subscription_plans(plan_id),
        status                         TEXT NOT NULL,
        user_email                     TEXT,
        expiration_reminder_sent_at    TEXT,
        plan_expiration_email_sent_at  TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_plans_tenant_expiration \
     ON subscription_plans (tenant_id, expiration_date)",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS subscription_plans (
        plan_id          TEXT PRIMARY KEY,
        tenant_id        TEXT NOT NULL,
        title            TEXT NOT NULL,
        expiration_date  TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        license_id                     TEXT PRIMARY KEY,
        plan_id                        TEXT NOT NULL REFERENCES subscription_plans(plan_id),
        status                         TEXT NOT NULL,
        user_email                     TEXT,
        expiration_reminder_sent_at    TIMESTAMP,
        plan_expiration_email_sent_at  TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_plans_tenant_expiration \
     ON subscription_plans (tenant_id, expiration_date)",
];

macro_rules! select_eligible {
    ($sentinel:literal, $upper:literal, $p1:literal, $p2:literal, $p3:literal) => {
        concat!(
            "SELECT l.license_id, l.status, l.user_email, p.plan_id, p.tenant_id, p.title, ",
            "p.expiration_date, l.expiration_reminder_sent_at, l.plan_expiration_email_sent_at ",
            "FROM licenses l JOIN subscription_plans p ON p.plan_id = l.plan_id ",
            "WHERE l.status = 'activated' AND p.tenant_id = ",
            $p1,
            " AND l.",
            $sentinel,
            " IS NULL AND p.expiration_date >= ",
            $p2,
            " AND p.expiration_date ",
            $upper,
            " ",
            $p3,
            " ORDER BY l.license_id"
        )
    };
}

macro_rules! mark_sent {
    ($sentinel:literal, $p1:literal, $p2:literal) => {
        concat!(
            "UPDATE licenses SET ",
            $sentinel,
            " = ",
            $p1,
            " WHERE license_id = ",
            $p2,
            " AND status = 'activated' AND ",
            $sentinel,
            " IS NULL"
        )
    };
}

#[cfg(feature = "sqlite")]
fn sqlite_eligible_sql(notice: NoticeKind, include_upper: bool) -> &'static str {
    match (notice, include_upper) {
        (NoticeKind::ExpirationReminder, true) => {
            select_eligible!("expiration_reminder_sent_at", "<=", "?", "?", "?")
        }
        (NoticeKind::ExpirationReminder, false) => {
            select_eligible!("expiration_reminder_sent_at", "<", "?", "?", "?")
        }
        (NoticeKind::PlanExpired, true) => {
            select_eligible!("plan_expiration_email_sent_at", "<=", "?", "?", "?")
        }
        (NoticeKind::PlanExpired, false) => {
            select_eligible!("plan_expiration_email_sent_at", "<", "?", "?", "?")
        }
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_mark_sql(notice: NoticeKind) -> &'static str {
    match notice {
        NoticeKind::ExpirationReminder => mark_sent!("expiration_reminder_sent_at", "?", "?"),
        NoticeKind::PlanExpired => mark_sent!("plan_expiration_email_sent_at", "?", "?"),
    }
}

#[cfg(feature = "postgres")]
fn postgres_eligible_sql(notice: NoticeKind, include_upper: bool) -> &'static str {
    match (notice, include_upper) {
        (NoticeKind::ExpirationReminder, true) => {
            select_eligible!("expiration_reminder_sent_at", "<=", "$1", "$2", "$3")
        }
        (NoticeKind::ExpirationReminder, false) => {
            select_eligible!("expiration_reminder_sent_at", "<", "$1", "$2", "$3")
        }
        (NoticeKind::PlanExpired, true) => {
            select_eligible!("plan_expiration_email_sent_at", "<=", "$1", "$2", "$3")
        }
        (NoticeKind::PlanExpired, false) => {
            select_eligible!("plan_expiration_email_sent_at", "<", "$1", "$2", "$3")
        }
    }
}

#[cfg(feature = "postgres")]
fn postgres_mark_sql(notice: NoticeKind) -> &'static str {
    match notice {
        NoticeKind::ExpirationReminder => mark_sent!("expiration_reminder_sent_at", "$1", "$2"),
        NoticeKind::PlanExpired => mark_sent!("plan_expiration_email_sent_at", "$1", "$2"),
    }
}

fn query_err(op: &str, e: sqlx::Error) -> StorageError {
    error!("{op} failed: {e}");
    StorageError::Query(format!("{op}: {e}"))
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect using the `[database]` configuration section.
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Arc<Self>> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                // WAL lets sentinel writes commit while an eligibility stream
                // is still open on another connection.
                let options = SqliteConnectOptions::from_str(&config.sqlite_url)
                    .map_err(|e| StorageError::Connection(format!("invalid SQLite URL: {e}")))?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal);

                let pool = SqlitePool::connect_with(options).await.map_err(|e| {
                    error!("Failed to connect to SQLite: {e}");
                    StorageError::Connection(format!("failed to connect to SQLite: {e}"))
                })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(StorageError::Unsupported(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&config.postgres_url).await.map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    StorageError::Connection(format!("failed to connect to PostgreSQL: {e}"))
                })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(StorageError::Unsupported(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(StorageError::Unsupported(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => pool.close().await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => pool.close().await,
        }
    }

    /// Create the plan and license tables if they are missing.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                for statement in SQLITE_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| query_err("SQLite ensure_schema", e))?;
                }
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                for statement in POSTGRES_SCHEMA {
                    query(statement)
                        .execute(pool)
                        .await
                        .map_err(|e| query_err("Postgres ensure_schema", e))?;
                }
            }
        }

        Ok(())
    }

    /// Insert a plan or update an existing one, keyed on `plan_id`.
    pub async fn upsert_plan(&self, plan: &SubscriptionPlan) -> StorageResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO subscription_plans (plan_id, tenant_id, title, expiration_date)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(plan_id) DO UPDATE SET
                        tenant_id       = excluded.tenant_id,
                        title           = excluded.title,
                        expiration_date = excluded.expiration_date
                    "#,
                )
                .bind(plan.plan_id.to_string())
                .bind(plan.tenant_id.to_string())
                .bind(&plan.title)
                .bind(plan.expiration_date.naive_utc())
                .execute(pool)
                .await
                .map_err(|e| query_err("SQLite upsert_plan", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO subscription_plans (plan_id, tenant_id, title, expiration_date)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (plan_id) DO UPDATE SET
                        tenant_id       = EXCLUDED.tenant_id,
                        title           = EXCLUDED.title,
                        expiration_date = EXCLUDED.expiration_date
                    "#,
                )
                .bind(plan.plan_id.to_string())
                .bind(plan.tenant_id.to_string())
                .bind(&plan.title)
                .bind(plan.expiration_date.naive_utc())
                .execute(pool)
                .await
                .map_err(|e| query_err("Postgres upsert_plan", e))?;
            }
        }

        Ok(())
    }

    /// Insert a license (and its plan) or update existing rows.
    ///
    /// Sentinels are written as given, so this is also how the renewal side
    /// clears them when a license enters a new plan cycle.
    pub async fn upsert_license(&self, license: &License) -> StorageResult<()> {
        self.upsert_plan(&license.plan).await?;

        let reminder_sent = license.expiration_reminder_sent_at.map(|t| t.naive_utc());
        let expired_sent = license.plan_expiration_email_sent_at.map(|t| t.naive_utc());

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        license_id,
                        plan_id,
                        status,
                        user_email,
                        expiration_reminder_sent_at,
                        plan_expiration_email_sent_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(license_id) DO UPDATE SET
                        plan_id                       = excluded.plan_id,
                        status                        = excluded.status,
                        user_email                    = excluded.user_email,
                        expiration_reminder_sent_at   = excluded.expiration_reminder_sent_at,
                        plan_expiration_email_sent_at = excluded.plan_expiration_email_sent_at
                    "#,
                )
                .bind(license.license_id.to_string())
                .bind(license.plan.plan_id.to_string())
                .bind(license.status.as_str())
                .bind(&license.user_email)
                .bind(reminder_sent)
                .bind(expired_sent)
                .execute(pool)
                .await
                .map_err(|e| query_err("SQLite upsert_license", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        license_id,
                        plan_id,
                        status,
                        user_email,
                        expiration_reminder_sent_at,
                        plan_expiration_email_sent_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (license_id) DO UPDATE SET
                        plan_id                       = EXCLUDED.plan_id,
                        status                        = EXCLUDED.status,
                        user_email                    = EXCLUDED.user_email,
                        expiration_reminder_sent_at   = EXCLUDED.expiration_reminder_sent_at,
                        plan_expiration_email_sent_at = EXCLUDED.plan_expiration_email_sent_at
                    "#,
                )
                .bind(license.license_id.to_string())
                .bind(license.plan.plan_id.to_string())
                .bind(license.status.as_str())
                .bind(&license.user_email)
                .bind(reminder_sent)
                .bind(expired_sent)
                .execute(pool)
                .await
                .map_err(|e| query_err("Postgres upsert_license", e))?;
            }
        }

        Ok(())
    }

    /// Fetch a license by its ID.
    ///
    /// Returns:
    /// - `Ok(Some(License))` if found
    /// - `Ok(None)` if not found
    pub async fn get_license(&self, license_id: Uuid) -> StorageResult<Option<License>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(
                "SELECT l.license_id, l.status, l.user_email, p.plan_id, p.tenant_id, p.title, \
                        p.expiration_date, l.expiration_reminder_sent_at, \
                        l.plan_expiration_email_sent_at \
                 FROM licenses l JOIN subscription_plans p ON p.plan_id = l.plan_id \
                 WHERE l.license_id = ?",
            )
            .bind(license_id.to_string())
            .fetch_optional(pool)
            .await
            .map_err(|e| query_err("SQLite get_license", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(
                "SELECT l.license_id, l.status, l.user_email, p.plan_id, p.tenant_id, p.title, \
                        p.expiration_date, l.expiration_reminder_sent_at, \
                        l.plan_expiration_email_sent_at \
                 FROM licenses l JOIN subscription_plans p ON p.plan_id = l.plan_id \
                 WHERE l.license_id = $1",
            )
            .bind(license_id.to_string())
            .fetch_optional(pool)
            .await
            .map_err(|e| query_err("Postgres get_license", e))?,
        };

        row.map(LicenseRow::into_license).transpose()
    }
}

#[async_trait]
impl LicenseStore for Database {
    fn query_activated_licenses<'a>(
        &'a self,
        tenant_id: Uuid,
        window: ExpirationWindow,
        notice: NoticeKind,
    ) -> BoxStream<'a, StorageResult<License>> {
        let tenant_id = tenant_id.to_string();
        let from = window.from.naive_utc();
        let to = window.to.naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, LicenseRow>(sqlite_eligible_sql(notice, window.include_upper))
                    .bind(tenant_id)
                    .bind(from)
                    .bind(to)
                    .fetch(pool)
                    .map(|row| {
                        row.map_err(|e| query_err("SQLite query_activated_licenses", e))
                            .and_then(LicenseRow::into_license)
                    })
                    .boxed()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, LicenseRow>(postgres_eligible_sql(notice, window.include_upper))
                    .bind(tenant_id)
                    .bind(from)
                    .bind(to)
                    .fetch(pool)
                    .map(|row| {
                        row.map_err(|e| query_err("Postgres query_activated_licenses", e))
                            .and_then(LicenseRow::into_license)
                    })
                    .boxed()
            }
        }
    }

    async fn conditional_set_sent(
        &self,
        license_id: Uuid,
        notice: NoticeKind,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(sqlite_mark_sql(notice))
                .bind(sent_at.naive_utc())
                .bind(license_id.to_string())
                .execute(pool)
                .await
                .map_err(|e| query_err("SQLite conditional_set_sent", e))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(postgres_mark_sql(notice))
                .bind(sent_at.naive_utc())
                .bind(license_id.to_string())
                .execute(pool)
                .await
                .map_err(|e| query_err("Postgres conditional_set_sent", e))?
                .rows_affected(),
        };

        Ok(rows_affected > 0)
    }
}
