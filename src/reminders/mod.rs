//! Expiration reminder engine.
//!
//! - `selector`     → which licenses of a tenant need a notice right now
//! - `dispatcher`   → notify one license and record the send
//! - `orchestrator` → run a batch over many tenants with failure isolation
//!
//! # Usage
//!
//! ```rust,ignore
//! use lumen::reminders::ReminderEngine;
//!
//! let engine = ReminderEngine::new(store, notifier, directory, config.reminders.clone());
//! let summary = engine.run(&tenant_ids, Utc::now(), 30, false).await?;
//! if !summary.is_clean() {
//!     // safe to retry on the next scheduled run
//! }
//! ```

pub mod dispatcher;
pub mod orchestrator;
pub mod selector;

pub use dispatcher::{
    build_recipient, DispatchError, DispatchSettings, ReminderDispatcher, Sent, SentinelWrite,
};
pub use orchestrator::{ReminderEngine, RunRequest, RunSummary, TenantSummary};
pub use selector::{select_eligible, select_for_notice};
