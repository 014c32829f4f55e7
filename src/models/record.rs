use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a redemption was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "attendance_status")]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[postgres(name = "present")]
    Present,
    #[postgres(name = "late")]
    Late,
}

/// The outcome of one student redeeming one session's credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub classification: Classification,
    pub recorded_at: DateTime<Utc>,
}

/// A record joined with the student's names, as served to monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub classification: Classification,
    pub recorded_at: DateTime<Utc>,
}

/// One of a student's own records, with the class it was taken in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: Uuid,
    pub schedule_id: Uuid,
    pub course_code: String,
    pub section_name: String,
    pub classification: Classification,
    pub recorded_at: DateTime<Utc>,
}

/// Why a redemption was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanRejection {
    /// No session owns the presented credential.
    InvalidCredential,
    /// The session is closed or past its expiry.
    ExpiredSession,
    /// The student is not on the schedule's roster.
    NotEnrolled,
}

impl ScanRejection {
    /// The wire code for the rejection.
    pub fn code(&self) -> &'static str {
        match self {
            ScanRejection::InvalidCredential => "invalid_credential",
            ScanRejection::ExpiredSession => "expired_session",
            ScanRejection::NotEnrolled => "not_enrolled",
        }
    }

    /// Parses a wire code back into a rejection.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "invalid_credential" => Some(ScanRejection::InvalidCredential),
            "expired_session" => Some(ScanRejection::ExpiredSession),
            "not_enrolled" => Some(ScanRejection::NotEnrolled),
            _ => None,
        }
    }

    /// The reason shown to the student.
    pub fn message(&self) -> &'static str {
        match self {
            ScanRejection::InvalidCredential => "Invalid attendance code",
            ScanRejection::ExpiredSession => "This attendance session has expired",
            ScanRejection::NotEnrolled => "You are not enrolled in this class",
        }
    }
}

/// The outcome of a redemption attempt. Only `Rejected` is a failure; a
/// repeated scan is a success that reports the original record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Recorded {
        classification: Classification,
        recorded_at: DateTime<Utc>,
    },
    AlreadyRecorded {
        classification: Classification,
        recorded_at: DateTime<Utc>,
    },
    Rejected {
        reason: ScanRejection,
    },
}

impl ScanOutcome {
    /// The classification carried by a successful outcome.
    pub fn classification(&self) -> Option<Classification> {
        match self {
            ScanOutcome::Recorded { classification, .. }
            | ScanOutcome::AlreadyRecorded { classification, .. } => Some(*classification),
            ScanOutcome::Rejected { .. } => None,
        }
    }
}

/// Final status of one rostered student once a session is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Present,
    Late,
    Absent,
}

impl From<Classification> for FinalStatus {
    fn from(value: Classification) -> Self {
        match value {
            Classification::Present => FinalStatus::Present,
            Classification::Late => FinalStatus::Late,
        }
    }
}

/// One line of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub student_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub status: FinalStatus,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Per-student attendance for one session, absences derived from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub entries: Vec<SummaryEntry>,
}
