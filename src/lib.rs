//! Lumen - license lifecycle tracking and expiration reminders for enterprise
//! subscription plans.
//!
//! # Features
//!
//! - `sqlite` - SQLite license store. Enabled by default.
//! - `postgres` - PostgreSQL license store.
//! - `background-jobs` - Cron-driven reminder runs.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (sqlite)
//! lumen = { git = "https://github.com/dmriding/lumen" }
//!
//! # PostgreSQL with scheduled runs
//! lumen = { git = "https://github.com/dmriding/lumen", features = ["postgres", "background-jobs"] }
//! ```

pub mod config;
pub mod directory;
pub mod errors;
pub mod license;
pub mod logging;
pub mod notify;
pub mod reminders;
pub mod storage;
pub mod tenants;

#[cfg(feature = "background-jobs")]
pub mod jobs;

pub use errors::{EngineError, EngineResult};
pub use license::{is_reminder_eligible, License, LicenseStatus, NoticeKind, SubscriptionPlan};
pub use reminders::{ReminderEngine, RunRequest, RunSummary, TenantSummary};
