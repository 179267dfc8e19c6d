//! Signing-session state machine and expiry rules
//!
//! A session moves `pending -> in_progress -> completed`. Expiry is not
//! swept by a background job; it is derived whenever the session is read
//! and persisted lazily by the caller. Nothing leaves `completed` or
//! `expired`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default session lifetime: creation + 30 days.
pub const SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Expired)
    }

    pub fn can_transition(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Expired)
                | (InProgress, Completed)
                | (InProgress, Expired)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status a session should be observed in at `now`. A stored
/// `pending`/`in_progress` session past its deadline reads as `Expired`;
/// terminal states are immutable.
pub fn effective_status(
    stored: SessionStatus,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> SessionStatus {
    if stored.is_terminal() {
        return stored;
    }
    if now >= expires_at {
        SessionStatus::Expired
    } else {
        stored
    }
}
