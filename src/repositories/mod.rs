//! Persistence seams.
//!
//! `AttendanceStore` owns users, schedules, sessions and records; the
//! operations that must be atomic (`open_session`, `redeem`) are single
//! trait methods so each backend can make them so. `RefreshTokenStore`
//! holds refresh grants.

pub mod memory;
pub mod postgres;
pub mod refresh_tokens;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        audit::{AuditEntry, NewAuditEntry},
        record::{HistoryEntry, RecordView, ScanOutcome},
        schedule::{ClassSchedule, RosterEntry},
        session::AttendanceSession,
        token::RefreshGrant,
        user::User,
    },
    services::scan::ScanPolicy,
};

/// A session to be created by `open_session`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub opened_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub credential: String,
}

/// The result of an atomic open.
#[derive(Debug, Clone)]
pub enum OpenResult {
    Opened(AttendanceSession),
    AlreadyActive(AttendanceSession),
}

/// One redemption attempt, stamped with server time.
#[derive(Debug, Clone)]
pub struct RedemptionAttempt {
    pub credential: String,
    pub student_id: Uuid,
    pub arrived_at: DateTime<Utc>,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ClassSchedule>>;

    async fn roster(&self, schedule_id: Uuid) -> Result<Vec<RosterEntry>>;

    /// Creates a session unless one is already active for the schedule.
    /// An unclosed session whose expiry has passed is closed (at its expiry
    /// time) first.
    async fn open_session(&self, new: NewSession) -> Result<OpenResult>;

    async fn find_session(&self, id: Uuid) -> Result<Option<AttendanceSession>>;

    /// The unclosed session for a schedule, expired or not.
    async fn find_open_session(&self, schedule_id: Uuid) -> Result<Option<AttendanceSession>>;

    /// Sets `closed_at` if the session is still open and returns the
    /// session as stored afterwards. `None` if the session does not exist.
    async fn close_session(&self, id: Uuid, closed_at: DateTime<Utc>) -> Result<Option<AttendanceSession>>;

    /// Replaces the credential of an open session. Returns the stored
    /// session; its credential is unchanged if it was already closed.
    async fn replace_credential(&self, id: Uuid, credential: String) -> Result<Option<AttendanceSession>>;

    /// Sessions newest first, optionally only those of one instructor's schedules.
    async fn list_sessions(&self, instructor_id: Option<Uuid>) -> Result<Vec<AttendanceSession>>;

    /// Judges and, when accepted, records a redemption as one atomic unit.
    async fn redeem(&self, attempt: &RedemptionAttempt, policy: &ScanPolicy) -> Result<ScanOutcome>;

    async fn list_records(&self, session_id: Uuid) -> Result<Vec<RecordView>>;

    /// Every record of one student, newest first.
    async fn student_history(&self, student_id: Uuid) -> Result<Vec<HistoryEntry>>;

    /// Closes every open session whose expiry is at or before `now`.
    async fn close_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()>;

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>>;

    async fn insert_user(&self, user: User) -> Result<()>;

    async fn insert_schedule(&self, schedule: ClassSchedule) -> Result<()>;

    async fn enroll(&self, schedule_id: Uuid, student_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Stores a grant. `now` is the server time the grant's lifetime is
    /// measured from.
    async fn save(&self, fingerprint: &str, grant: &RefreshGrant, now: DateTime<Utc>) -> Result<()>;

    async fn find(&self, fingerprint: &str) -> Result<Option<RefreshGrant>>;

    async fn revoke(&self, fingerprint: &str) -> Result<()>;
}
