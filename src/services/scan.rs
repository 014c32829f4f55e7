use chrono::{DateTime, Duration, Utc};

use crate::{
    crypto::jwt::Claims,
    error::{AppError, Result},
    models::{
        audit::NewAuditEntry,
        record::{AttendanceRecord, Classification, ScanOutcome, ScanRejection},
        session::AttendanceSession,
        user::Role,
    },
    repositories::RedemptionAttempt,
    state::AppState,
};

/// Longest text that can be an issued credential. Anything longer is
/// rejected without a store lookup.
pub const MAX_CREDENTIAL_LEN: usize = 256;

/// Present-versus-late policy applied to every redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// How long after a session opens a redemption still counts as present.
    pub grace_period: Duration,
}

/// What a store knows about an attempt at the moment it judges it.
#[derive(Debug, Clone, Copy)]
pub struct RedemptionFacts<'a> {
    /// The session owning the presented credential, if any.
    pub session: Option<&'a AttendanceSession>,
    /// Whether the student is on the session's roster.
    pub enrolled: bool,
    /// The student's existing record for the session, if any.
    pub existing: Option<&'a AttendanceRecord>,
}

/// The decision a store must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Reject(ScanRejection),
    Duplicate(AttendanceRecord),
    Accept(Classification),
}

impl ScanPolicy {
    /// `Present` up to and including `created_at + grace_period`, `Late` after.
    pub fn classify(&self, session: &AttendanceSession, at: DateTime<Utc>) -> Classification {
        if at <= session.created_at + self.grace_period {
            Classification::Present
        } else {
            Classification::Late
        }
    }

    /// Applies the redemption rules in order: credential, expiry, roster,
    /// duplicate, classification.
    pub fn judge(&self, facts: RedemptionFacts<'_>, at: DateTime<Utc>) -> Verdict {
        let Some(session) = facts.session else {
            return Verdict::Reject(ScanRejection::InvalidCredential);
        };

        if !session.accepts_redemptions_at(at) {
            return Verdict::Reject(ScanRejection::ExpiredSession);
        }

        if !facts.enrolled {
            return Verdict::Reject(ScanRejection::NotEnrolled);
        }

        if let Some(record) = facts.existing {
            return Verdict::Duplicate(record.clone());
        }

        Verdict::Accept(self.classify(session, at))
    }
}

/// Redeems `credential` for the calling student.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `claims` - The verified identity of the caller.
/// * `credential` - The value decoded from the QR code.
///
/// # Returns
///
/// A `Result` containing the `ScanOutcome`. Business rejections are
/// `ScanOutcome::Rejected`, not errors.
pub async fn redeem(state: &AppState, claims: &Claims, credential: &str) -> Result<ScanOutcome> {
    if claims.role != Role::Student {
        tracing::warn!("❌ Non-student {} attempted a scan", claims.sub);
        return Err(AppError::Forbidden);
    }

    let credential = credential.trim();
    if credential.is_empty() || credential.len() > MAX_CREDENTIAL_LEN {
        tracing::info!("❌ Scan by {} rejected: unreadable credential", claims.sub);
        return Ok(ScanOutcome::Rejected {
            reason: ScanRejection::InvalidCredential,
        });
    }

    let attempt = RedemptionAttempt {
        credential: credential.to_string(),
        student_id: claims.sub,
        arrived_at: state.clock.now(),
    };

    let outcome = state.store.redeem(&attempt, &state.scan_policy()).await?;

    match &outcome {
        ScanOutcome::Recorded { classification, .. } => {
            tracing::info!("✅ Attendance recorded for {}: {:?}", claims.sub, classification);
            state
                .store
                .append_audit(NewAuditEntry {
                    actor_id: Some(claims.sub),
                    action: "scan.recorded",
                    description: format!("{} recorded as {:?}", claims.username, classification),
                    created_at: attempt.arrived_at,
                })
                .await?;
        }
        ScanOutcome::AlreadyRecorded { .. } => {
            tracing::debug!("🔁 Repeat scan by {}", claims.sub);
        }
        ScanOutcome::Rejected { reason } => {
            tracing::info!("❌ Scan by {} rejected: {}", claims.sub, reason.code());
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn policy() -> ScanPolicy {
        ScanPolicy {
            grace_period: Duration::minutes(10),
        }
    }

    fn session(t0: DateTime<Utc>) -> AttendanceSession {
        AttendanceSession {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            opened_by: Uuid::new_v4(),
            created_at: t0,
            expires_at: t0 + Duration::minutes(30),
            closed_at: None,
            credential: "c".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 8, 0, 0).unwrap()
    }

    #[test]
    fn classification_switches_after_grace_period() {
        let s = session(t0());
        let p = policy();

        assert_eq!(p.classify(&s, t0()), Classification::Present);
        assert_eq!(p.classify(&s, t0() + Duration::minutes(10)), Classification::Present);
        assert_eq!(
            p.classify(&s, t0() + Duration::minutes(10) + Duration::seconds(1)),
            Classification::Late
        );
        assert_eq!(p.classify(&s, t0() + Duration::minutes(30)), Classification::Late);
    }

    #[test]
    fn unknown_credential_is_invalid() {
        let facts = RedemptionFacts {
            session: None,
            enrolled: true,
            existing: None,
        };
        assert_eq!(
            policy().judge(facts, t0()),
            Verdict::Reject(ScanRejection::InvalidCredential)
        );
    }

    #[test]
    fn expiry_wins_over_roster_and_duplicate_checks() {
        let s = session(t0());
        let record = AttendanceRecord {
            session_id: s.id,
            student_id: Uuid::new_v4(),
            classification: Classification::Present,
            recorded_at: t0(),
        };
        let facts = RedemptionFacts {
            session: Some(&s),
            enrolled: false,
            existing: Some(&record),
        };
        assert_eq!(
            policy().judge(facts, t0() + Duration::minutes(31)),
            Verdict::Reject(ScanRejection::ExpiredSession)
        );
    }

    #[test]
    fn closed_session_rejects_even_before_expiry() {
        let mut s = session(t0());
        s.closed_at = Some(t0() + Duration::minutes(2));
        let facts = RedemptionFacts {
            session: Some(&s),
            enrolled: true,
            existing: None,
        };
        assert_eq!(
            policy().judge(facts, t0() + Duration::minutes(3)),
            Verdict::Reject(ScanRejection::ExpiredSession)
        );
    }

    #[test]
    fn existing_record_is_reported_unchanged() {
        let s = session(t0());
        let record = AttendanceRecord {
            session_id: s.id,
            student_id: Uuid::new_v4(),
            classification: Classification::Present,
            recorded_at: t0() + Duration::minutes(5),
        };
        let facts = RedemptionFacts {
            session: Some(&s),
            enrolled: true,
            existing: Some(&record),
        };
        assert_eq!(
            policy().judge(facts, t0() + Duration::minutes(20)),
            Verdict::Duplicate(record)
        );
    }
}
