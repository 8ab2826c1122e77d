//! Boost records and the status state machine.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BoostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

/// Events that move a boost between statuses.
///
/// Renewal is not an event of the renewed boost: it opens a new purchase and
/// leaves the original record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostEvent {
    PaymentCompleted,
    Cancel,
    EndDatePassed,
}

impl BoostEvent {
    fn verb(self) -> &'static str {
        match self {
            BoostEvent::PaymentCompleted => "activate",
            BoostEvent::Cancel => "cancel",
            BoostEvent::EndDatePassed => "expire",
        }
    }
}

impl BoostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BoostStatus::Pending => "pending",
            BoostStatus::Active => "active",
            BoostStatus::Expired => "expired",
            BoostStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(anyhow!(
                "invalid boost status '{other}': expected pending, active, expired or cancelled"
            )),
        }
    }

    pub fn can_renew(self) -> bool {
        matches!(self, BoostStatus::Active | BoostStatus::Expired)
    }

    /// Apply `event` to this status.
    ///
    /// | From    | Event            | To        |
    /// |---------|------------------|-----------|
    /// | pending | PaymentCompleted | active    |
    /// | pending | Cancel           | cancelled |
    /// | active  | Cancel           | cancelled |
    /// | active  | EndDatePassed    | expired   |
    ///
    /// Every other pair is rejected with [`BoostError::InvalidState`].
    pub fn transition(self, event: BoostEvent) -> Result<BoostStatus, BoostError> {
        match (self, event) {
            (BoostStatus::Pending, BoostEvent::PaymentCompleted) => Ok(BoostStatus::Active),
            (BoostStatus::Pending | BoostStatus::Active, BoostEvent::Cancel) => {
                Ok(BoostStatus::Cancelled)
            }
            (BoostStatus::Active, BoostEvent::EndDatePassed) => Ok(BoostStatus::Expired),
            (from, event) => Err(BoostError::InvalidState(format!(
                "cannot {} a boost that is {}",
                event.verb(),
                from
            ))),
        }
    }
}

impl fmt::Display for BoostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    pub id: String,
    pub listing_id: String,
    pub package_id: String,
    pub user_id: String,
    pub status: BoostStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub payment_id: String,
    pub renewed_from: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Boost {
    /// `true` while the boost is active and its end date is still ahead.
    ///
    /// An active boost whose end date passed but which the sweep has not
    /// reached yet is not live.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == BoostStatus::Active && self.end_date.is_some_and(|end| end > now)
    }
}

/// Start and end of a boost activated at `now`.
pub fn activation_window(
    now: DateTime<Utc>,
    duration_days: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), BoostError> {
    let end = now
        .checked_add_signed(Duration::days(i64::from(duration_days)))
        .ok_or_else(|| {
            BoostError::Validation(format!(
                "a {duration_days}-day boost starting {now} ends out of range"
            ))
        })?;
    Ok((now, end))
}

/// Read model for a single listing.
#[derive(Debug, Clone, Serialize)]
pub struct BoostStatusView {
    pub listing_id: String,
    pub has_active_boost: bool,
    pub current_boost: Option<Boost>,
}
