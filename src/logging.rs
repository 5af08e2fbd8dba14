//! Structured logging for reminder runs.
//!
//! Every license that a run touches produces exactly one [`ReminderEvent`]
//! line, so the run summary can be rebuilt from logs alone.

use std::fmt;

use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Per-license outcome of a reminder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderEvent {
    /// Dry run: the license would have been notified
    WouldNotify,
    /// Notification sent and sentinel recorded
    Sent,
    /// Notification sent, but a concurrent writer had already set the sentinel
    AlreadyMarked,
    /// Notification sent, sentinel write failed; the license will be notified again
    SentinelWriteFailed,
    /// Notification failed; the license stays eligible
    Failed,
    /// License skipped because it has no recipient email
    MissingRecipient,
}

impl fmt::Display for ReminderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReminderEvent::WouldNotify => "would_notify",
            ReminderEvent::Sent => "sent",
            ReminderEvent::AlreadyMarked => "already_marked",
            ReminderEvent::SentinelWriteFailed => "sentinel_write_failed",
            ReminderEvent::Failed => "failed",
            ReminderEvent::MissingRecipient => "missing_recipient",
        };
        write!(f, "{}", s)
    }
}

/// Log one license outcome inside a `reminder_event` span.
///
/// # Arguments
///
/// * `event` - What happened to the license
/// * `license_id` - The license ID
/// * `details` - Optional cause or context
pub fn log_reminder_event(event: ReminderEvent, license_id: &str, details: Option<&str>) {
    let span = info_span!(
        "reminder_event",
        event = %event,
        license_id = %license_id,
    );
    let _enter = span.enter();

    match (event, details) {
        (ReminderEvent::Failed, Some(d)) => error!(cause = %d, "Reminder not sent"),
        (ReminderEvent::Failed, None) => error!("Reminder not sent"),
        (ReminderEvent::SentinelWriteFailed | ReminderEvent::MissingRecipient, Some(d)) => {
            warn!(cause = %d, "Reminder event occurred")
        }
        (ReminderEvent::SentinelWriteFailed | ReminderEvent::MissingRecipient, None) => {
            warn!("Reminder event occurred")
        }
        (_, Some(d)) => info!(details = %d, "Reminder event occurred"),
        (_, None) => info!("Reminder event occurred"),
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_tracing(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if result.is_err() {
        warn!("Tracing subscriber already installed; keeping the existing one");
    }
}
