//! License entity and lifecycle state machine.
//!
//! A license moves through `Unassigned -> Assigned -> Activated`, and can be
//! revoked from `Assigned` or `Activated`. "Expired" is never stored: it is a
//! function of the current instant and the owning plan's expiration date.
//!
//! Everything in this module is pure. Persistence lives in [`crate::storage`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stored license status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Unassigned,
    Assigned,
    Activated,
    Revoked,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Unassigned => "unassigned",
            LicenseStatus::Assigned => "assigned",
            LicenseStatus::Activated => "activated",
            LicenseStatus::Revoked => "revoked",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: LicenseStatus) -> bool {
        matches!(
            (self, next),
            (LicenseStatus::Unassigned, LicenseStatus::Assigned)
                | (LicenseStatus::Assigned, LicenseStatus::Activated)
                | (LicenseStatus::Assigned, LicenseStatus::Revoked)
                | (LicenseStatus::Activated, LicenseStatus::Revoked)
        )
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unassigned" => Ok(LicenseStatus::Unassigned),
            "assigned" => Ok(LicenseStatus::Assigned),
            "activated" => Ok(LicenseStatus::Activated),
            "revoked" => Ok(LicenseStatus::Revoked),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Rejected lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move license from {from} to {to}")]
    Illegal {
        from: LicenseStatus,
        to: LicenseStatus,
    },

    #[error("a learner email is required to assign a license")]
    MissingEmail,

    #[error("unknown license status '{0}'")]
    UnknownStatus(String),
}

/// An enterprise subscription plan. Every license on the plan shares its
/// expiration date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub plan_id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub expiration_date: DateTime<Utc>,
}

/// A per-learner license, joined with its owning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub license_id: Uuid,
    pub status: LicenseStatus,
    pub user_email: Option<String>,
    pub plan: SubscriptionPlan,
    /// Set once the pre-expiration reminder went out for this plan cycle.
    pub expiration_reminder_sent_at: Option<DateTime<Utc>>,
    /// Set once the post-expiration notice went out for this plan cycle.
    pub plan_expiration_email_sent_at: Option<DateTime<Utc>>,
}

impl License {
    /// A fresh, unassigned license on `plan`.
    pub fn provision(plan: SubscriptionPlan) -> Self {
        Self {
            license_id: Uuid::new_v4(),
            status: LicenseStatus::Unassigned,
            user_email: None,
            plan,
            expiration_reminder_sent_at: None,
            plan_expiration_email_sent_at: None,
        }
    }

    pub fn assign(&mut self, email: &str) -> Result<(), TransitionError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(TransitionError::MissingEmail);
        }
        self.transition(LicenseStatus::Assigned)?;
        self.user_email = Some(email.to_string());
        Ok(())
    }

    pub fn activate(&mut self) -> Result<(), TransitionError> {
        self.transition(LicenseStatus::Activated)
    }

    pub fn revoke(&mut self) -> Result<(), TransitionError> {
        self.transition(LicenseStatus::Revoked)
    }

    fn transition(&mut self, next: LicenseStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Derived expiry: true once `now` reaches the plan's expiration date,
    /// whatever the stored status.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.plan.expiration_date
    }

    pub fn expiration_date(&self) -> DateTime<Utc> {
        self.plan.expiration_date
    }

    pub fn tenant_id(&self) -> Uuid {
        self.plan.tenant_id
    }
}

/// A range of plan expiration instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Whether `to` itself belongs to the window.
    pub include_upper: bool,
}

impl ExpirationWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if instant < self.from {
            return false;
        }
        if self.include_upper {
            instant <= self.to
        } else {
            instant < self.to
        }
    }
}

/// The kinds of expiration email the engine sends. Each has its own window
/// and its own sentinel column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Sent before the plan expires, within `days` of now.
    #[default]
    ExpirationReminder,
    /// Sent after the plan expired, for plans that expired during the last
    /// `days` full UTC calendar days (today excluded).
    PlanExpired,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::ExpirationReminder => "expiration_reminder",
            NoticeKind::PlanExpired => "plan_expired",
        }
    }

    /// The expiration window this notice covers at `now`.
    ///
    /// `None` when the window does not fit in the representable date range.
    pub fn window(&self, now: DateTime<Utc>, days: u32) -> Option<ExpirationWindow> {
        let span = Duration::try_days(i64::from(days))?;
        match self {
            NoticeKind::ExpirationReminder => Some(ExpirationWindow {
                from: now,
                to: now.checked_add_signed(span)?,
                include_upper: true,
            }),
            NoticeKind::PlanExpired => {
                let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
                Some(ExpirationWindow {
                    from: midnight.checked_sub_signed(span)?,
                    to: midnight,
                    include_upper: false,
                })
            }
        }
    }

    /// The sentinel this notice reads and writes.
    pub fn sent_at(&self, license: &License) -> Option<DateTime<Utc>> {
        match self {
            NoticeKind::ExpirationReminder => license.expiration_reminder_sent_at,
            NoticeKind::PlanExpired => license.plan_expiration_email_sent_at,
        }
    }

    pub fn sentinel_column(&self) -> &'static str {
        match self {
            NoticeKind::ExpirationReminder => "expiration_reminder_sent_at",
            NoticeKind::PlanExpired => "plan_expiration_email_sent_at",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoticeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expiration_reminder" | "reminder" => Ok(NoticeKind::ExpirationReminder),
            "plan_expired" | "plan-expired" => Ok(NoticeKind::PlanExpired),
            other => Err(format!("unknown notice kind '{other}'")),
        }
    }
}

/// Whether `license` should get `kind` at `now`: activated, sentinel unset,
/// plan expiration inside the notice window.
pub fn is_notice_eligible(license: &License, kind: NoticeKind, now: DateTime<Utc>, days: u32) -> bool {
    license.status == LicenseStatus::Activated
        && kind.sent_at(license).is_none()
        && kind
            .window(now, days)
            .is_some_and(|window| window.contains(license.plan.expiration_date))
}

/// Pre-expiration reminder eligibility.
///
/// True iff the license is `Activated`, has no reminder recorded, and its
/// plan expires within `[now, now + window_days]`.
pub fn is_reminder_eligible(license: &License, now: DateTime<Utc>, window_days: u32) -> bool {
    is_notice_eligible(license, NoticeKind::ExpirationReminder, now, window_days)
}
