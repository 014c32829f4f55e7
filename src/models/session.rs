use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle state of an attendance session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Closed,
}

/// One open attendance window for one (class meeting, instructor) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSession {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The schedule the session belongs to.
    pub schedule_id: Uuid,
    /// The user who opened the session.
    pub opened_by: Uuid,
    /// The server time the session was opened.
    pub created_at: DateTime<Utc>,
    /// The server time after which redemptions are rejected.
    pub expires_at: DateTime<Utc>,
    /// The server time the session was closed, if it was.
    pub closed_at: Option<DateTime<Utc>>,
    /// The credential currently encoded in the QR code.
    pub credential: String,
}

impl AttendanceSession {
    /// The session's lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.closed_at.is_some() {
            SessionState::Closed
        } else {
            SessionState::Active
        }
    }

    /// Whether a redemption arriving at `now` may still be considered.
    pub fn accepts_redemptions_at(&self, now: DateTime<Utc>) -> bool {
        self.state() == SessionState::Active && now <= self.expires_at
    }

    /// Time left before expiry, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.state() == SessionState::Closed {
            return Duration::zero();
        }
        (self.expires_at - now).max(Duration::zero())
    }

    /// The owner-facing projection, which includes the credential.
    pub fn grant(&self, now: DateTime<Utc>) -> SessionGrant {
        SessionGrant {
            session_id: self.id,
            schedule_id: self.schedule_id,
            credential: self.credential.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            remaining_secs: self.remaining(now).num_seconds(),
        }
    }

    /// The read-only projection, without the credential.
    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            id: self.id,
            schedule_id: self.schedule_id,
            state: self.state(),
            accepting_redemptions: self.accepts_redemptions_at(now),
            created_at: self.created_at,
            expires_at: self.expires_at,
            closed_at: self.closed_at,
            remaining_secs: self.remaining(now).num_seconds(),
        }
    }
}

/// What the owner of a session needs to display and resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub session_id: Uuid,
    pub schedule_id: Uuid,
    pub credential: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_secs: i64,
}

/// The public state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub state: SessionState,
    pub accepting_redemptions: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub remaining_secs: i64,
}

/// The result of asking to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new session was created.
    Opened(SessionGrant),
    /// A session was already active for the schedule; resume it instead.
    Conflict(SessionGrant),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session_at(created: DateTime<Utc>) -> AttendanceSession {
        AttendanceSession {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            opened_by: Uuid::new_v4(),
            created_at: created,
            expires_at: created + Duration::minutes(30),
            closed_at: None,
            credential: "cred".to_string(),
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 8, 0, 0).unwrap();
        let session = session_at(t0);

        assert!(session.accepts_redemptions_at(t0 + Duration::minutes(30)));
        assert!(!session.accepts_redemptions_at(t0 + Duration::minutes(30) + Duration::seconds(1)));
        assert_eq!(session.remaining(t0 + Duration::minutes(45)), Duration::zero());
    }

    #[test]
    fn closed_session_reports_no_time_left() {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 8, 0, 0).unwrap();
        let mut session = session_at(t0);
        session.closed_at = Some(t0 + Duration::minutes(1));

        let view = session.view(t0 + Duration::minutes(2));
        assert_eq!(view.state, SessionState::Closed);
        assert!(!view.accepting_redemptions);
        assert_eq!(view.remaining_secs, 0);
    }
}
