use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        audit::{AuditEntry, NewAuditEntry},
        record::{AttendanceRecord, HistoryEntry, RecordView, ScanOutcome},
        schedule::{ClassSchedule, RosterEntry},
        session::AttendanceSession,
        user::User,
    },
    repositories::{AttendanceStore, NewSession, OpenResult, RedemptionAttempt},
    services::scan::{RedemptionFacts, ScanPolicy, Verdict},
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    schedules: HashMap<Uuid, ClassSchedule>,
    enrollments: HashMap<Uuid, BTreeSet<Uuid>>,
    sessions: HashMap<Uuid, AttendanceSession>,
    credentials: HashMap<String, Uuid>,
    records: HashMap<(Uuid, Uuid), AttendanceRecord>,
    audit: Vec<AuditEntry>,
}

impl Inner {
    fn open_session_for(&self, schedule_id: Uuid) -> Option<&AttendanceSession> {
        self.sessions
            .values()
            .find(|s| s.schedule_id == schedule_id && s.closed_at.is_none())
    }

    fn is_enrolled(&self, schedule_id: Uuid, student_id: Uuid) -> bool {
        self.enrollments
            .get(&schedule_id)
            .is_some_and(|roster| roster.contains(&student_id))
    }
}

/// A process-local store. Every operation holds one lock for its whole
/// duration, which is what makes `open_session` and `redeem` atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username && u.is_active)
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ClassSchedule>> {
        Ok(self.inner.lock().await.schedules.get(&id).cloned())
    }

    async fn roster(&self, schedule_id: Uuid) -> Result<Vec<RosterEntry>> {
        let inner = self.inner.lock().await;
        let mut roster: Vec<RosterEntry> = inner
            .enrollments
            .get(&schedule_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.users.get(id))
            .map(|u| RosterEntry {
                student_id: u.id,
                username: u.username.clone(),
                display_name: u.display_name.clone(),
            })
            .collect();
        roster.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(roster)
    }

    async fn open_session(&self, new: NewSession) -> Result<OpenResult> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.open_session_for(new.schedule_id).cloned() {
            if existing.expires_at >= new.created_at {
                return Ok(OpenResult::AlreadyActive(existing));
            }
            tracing::info!("🧹 Auto-closing expired session {}", existing.id);
            if let Some(stale) = inner.sessions.get_mut(&existing.id) {
                stale.closed_at = Some(stale.expires_at);
            }
        }

        let session = AttendanceSession {
            id: new.id,
            schedule_id: new.schedule_id,
            opened_by: new.opened_by,
            created_at: new.created_at,
            expires_at: new.created_at + new.ttl,
            closed_at: None,
            credential: new.credential,
        };

        if inner.credentials.contains_key(&session.credential) {
            return Err(AppError::Internal("Credential collision".to_string()));
        }
        inner.credentials.insert(session.credential.clone(), session.id);
        inner.sessions.insert(session.id, session.clone());

        Ok(OpenResult::Opened(session))
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<AttendanceSession>> {
        Ok(self.inner.lock().await.sessions.get(&id).cloned())
    }

    async fn find_open_session(&self, schedule_id: Uuid) -> Result<Option<AttendanceSession>> {
        Ok(self.inner.lock().await.open_session_for(schedule_id).cloned())
    }

    async fn close_session(&self, id: Uuid, closed_at: DateTime<Utc>) -> Result<Option<AttendanceSession>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.sessions.get_mut(&id).map(|session| {
            if session.closed_at.is_none() {
                session.closed_at = Some(closed_at);
            }
            session.clone()
        }))
    }

    async fn replace_credential(&self, id: Uuid, credential: String) -> Result<Option<AttendanceSession>> {
        let mut inner = self.inner.lock().await;

        let Some(session) = inner.sessions.get(&id).cloned() else {
            return Ok(None);
        };
        if session.closed_at.is_some() {
            return Ok(Some(session));
        }

        inner.credentials.remove(&session.credential);
        inner.credentials.insert(credential.clone(), id);
        let stored = inner
            .sessions
            .get_mut(&id)
            .ok_or(AppError::NotFound)?;
        stored.credential = credential;
        Ok(Some(stored.clone()))
    }

    async fn list_sessions(&self, instructor_id: Option<Uuid>) -> Result<Vec<AttendanceSession>> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<AttendanceSession> = inner
            .sessions
            .values()
            .filter(|s| match instructor_id {
                Some(instructor) => inner
                    .schedules
                    .get(&s.schedule_id)
                    .is_some_and(|schedule| schedule.instructor_id == Some(instructor)),
                None => true,
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn redeem(&self, attempt: &RedemptionAttempt, policy: &ScanPolicy) -> Result<ScanOutcome> {
        let mut inner = self.inner.lock().await;

        let session = inner
            .credentials
            .get(&attempt.credential)
            .and_then(|id| inner.sessions.get(id))
            .cloned();

        let key = session.as_ref().map(|s| (s.id, attempt.student_id));
        let facts = RedemptionFacts {
            session: session.as_ref(),
            enrolled: session
                .as_ref()
                .is_some_and(|s| inner.is_enrolled(s.schedule_id, attempt.student_id)),
            existing: key.and_then(|k| inner.records.get(&k)),
        };

        let outcome = match policy.judge(facts, attempt.arrived_at) {
            Verdict::Reject(reason) => ScanOutcome::Rejected { reason },
            Verdict::Duplicate(record) => ScanOutcome::AlreadyRecorded {
                classification: record.classification,
                recorded_at: record.recorded_at,
            },
            Verdict::Accept(classification) => {
                let (session_id, student_id) = key.ok_or(AppError::NotFound)?;
                inner.records.insert(
                    (session_id, student_id),
                    AttendanceRecord {
                        session_id,
                        student_id,
                        classification,
                        recorded_at: attempt.arrived_at,
                    },
                );
                ScanOutcome::Recorded {
                    classification,
                    recorded_at: attempt.arrived_at,
                }
            }
        };

        Ok(outcome)
    }

    async fn list_records(&self, session_id: Uuid) -> Result<Vec<RecordView>> {
        let inner = self.inner.lock().await;
        let mut records: Vec<RecordView> = inner
            .records
            .values()
            .filter(|r| r.session_id == session_id)
            .map(|r| {
                let user = inner.users.get(&r.student_id);
                RecordView {
                    session_id: r.session_id,
                    student_id: r.student_id,
                    username: user.map(|u| u.username.clone()).unwrap_or_default(),
                    display_name: user.map(|u| u.display_name.clone()).unwrap_or_default(),
                    classification: r.classification,
                    recorded_at: r.recorded_at,
                }
            })
            .collect();
        records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(records)
    }

    async fn student_history(&self, student_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock().await;
        let mut history: Vec<HistoryEntry> = inner
            .records
            .values()
            .filter(|r| r.student_id == student_id)
            .filter_map(|r| {
                let session = inner.sessions.get(&r.session_id)?;
                let schedule = inner.schedules.get(&session.schedule_id)?;
                Some(HistoryEntry {
                    session_id: r.session_id,
                    schedule_id: schedule.id,
                    course_code: schedule.course_code.clone(),
                    section_name: schedule.section_name.clone(),
                    classification: r.classification,
                    recorded_at: r.recorded_at,
                })
            })
            .collect();
        history.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(history)
    }

    async fn close_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut closed = 0;
        for session in inner.sessions.values_mut() {
            if session.closed_at.is_none() && session.expires_at < now {
                session.closed_at = Some(session.expires_at);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let id = inner.audit.len() as i64 + 1;
        inner.audit.push(AuditEntry {
            id,
            actor_id: entry.actor_id,
            action: entry.action.to_string(),
            description: entry.description,
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|u| u.username == user.username && u.id != user.id)
        {
            return Err(AppError::Validation(format!(
                "Username already taken: {}",
                user.username
            )));
        }
        inner.users.insert(user.id, user);
        Ok(())
    }

    async fn insert_schedule(&self, schedule: ClassSchedule) -> Result<()> {
        self.inner.lock().await.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn enroll(&self, schedule_id: Uuid, student_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.schedules.contains_key(&schedule_id) {
            return Err(AppError::NotFound);
        }
        inner.enrollments.entry(schedule_id).or_default().insert(student_id);
        Ok(())
    }
}
