use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        audit::{AuditEntry, NewAuditEntry},
        record::{AttendanceRecord, Classification, HistoryEntry, RecordView, ScanOutcome},
        schedule::{ClassSchedule, RosterEntry},
        session::AttendanceSession,
        user::{Role, User},
    },
    repositories::{AttendanceStore, NewSession, OpenResult, RedemptionAttempt},
    services::scan::{RedemptionFacts, ScanPolicy, Verdict},
};

const SESSION_COLUMNS: &str =
    "id, schedule_id, opened_by, created_at, expires_at, closed_at, credential";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        password: row.try_get("password")?,
        role: role.parse::<Role>().map_err(AppError::MissingData)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// A helper function to map a `tokio_postgres::Row` to an `AttendanceSession`.
fn row_to_session(row: &Row) -> Result<AttendanceSession> {
    Ok(AttendanceSession {
        id: row.try_get("id")?,
        schedule_id: row.try_get("schedule_id")?,
        opened_by: row.try_get("opened_by")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        closed_at: row.try_get("closed_at")?,
        credential: row.try_get("credential")?,
    })
}

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        session_id: row.try_get("session_id")?,
        student_id: row.try_get("student_id")?,
        classification: row.try_get("status")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn row_to_schedule(row: &Row) -> Result<ClassSchedule> {
    Ok(ClassSchedule {
        id: row.try_get("id")?,
        course_code: row.try_get("course_code")?,
        section_name: row.try_get("section_name")?,
        instructor_id: row.try_get("instructor_id")?,
        room: row.try_get("room")?,
    })
}

/// The PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Creates a new `PgStore` over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT *
                FROM users
                WHERE username = $1 AND is_active = true
                "#,
                &[&username],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM users WHERE id = $1", &[&id])
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<ClassSchedule>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, course_code, section_name, instructor_id, room
                FROM class_schedules
                WHERE id = $1
                "#,
                &[&id],
            )
            .await?;
        row.map(|r| row_to_schedule(&r)).transpose()
    }

    async fn roster(&self, schedule_id: Uuid) -> Result<Vec<RosterEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT u.id, u.username, u.display_name
                FROM enrollments e
                JOIN users u ON u.id = e.student_id
                WHERE e.schedule_id = $1
                ORDER BY u.display_name ASC
                "#,
                &[&schedule_id],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<RosterEntry> {
                Ok(RosterEntry {
                    student_id: row.try_get("id")?,
                    username: row.try_get("username")?,
                    display_name: row.try_get("display_name")?,
                })
            })
            .collect()
    }

    async fn open_session(&self, new: NewSession) -> Result<OpenResult> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Serializes concurrent opens for the same schedule.
        tx.query_opt(
            "SELECT id FROM class_schedules WHERE id = $1 FOR UPDATE",
            &[&new.schedule_id],
        )
        .await?
        .ok_or(AppError::NotFound)?;

        let existing = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM attendance_sessions WHERE schedule_id = $1 AND closed_at IS NULL FOR UPDATE",
                    SESSION_COLUMNS
                ),
                &[&new.schedule_id],
            )
            .await?
            .map(|r| row_to_session(&r))
            .transpose()?;

        if let Some(existing) = existing {
            if existing.expires_at >= new.created_at {
                tx.commit().await?;
                return Ok(OpenResult::AlreadyActive(existing));
            }
            tracing::info!("🧹 Auto-closing expired session {}", existing.id);
            tx.execute(
                "UPDATE attendance_sessions SET closed_at = expires_at WHERE id = $1",
                &[&existing.id],
            )
            .await?;
        }

        let expires_at = new.created_at + new.ttl;
        let row = tx
            .query_one(
                &format!(
                    r#"
                    INSERT INTO attendance_sessions
                        (id, schedule_id, opened_by, created_at, expires_at, credential)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING {}
                    "#,
                    SESSION_COLUMNS
                ),
                &[
                    &new.id,
                    &new.schedule_id,
                    &new.opened_by,
                    &new.created_at,
                    &expires_at,
                    &new.credential,
                ],
            )
            .await?;
        let session = row_to_session(&row)?;

        tx.commit().await?;
        Ok(OpenResult::Opened(session))
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<AttendanceSession>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM attendance_sessions WHERE id = $1", SESSION_COLUMNS),
                &[&id],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn find_open_session(&self, schedule_id: Uuid) -> Result<Option<AttendanceSession>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM attendance_sessions WHERE schedule_id = $1 AND closed_at IS NULL",
                    SESSION_COLUMNS
                ),
                &[&schedule_id],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn close_session(&self, id: Uuid, closed_at: DateTime<Utc>) -> Result<Option<AttendanceSession>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE attendance_sessions
                    SET closed_at = COALESCE(closed_at, $2)
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    SESSION_COLUMNS
                ),
                &[&id, &closed_at],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn replace_credential(&self, id: Uuid, credential: String) -> Result<Option<AttendanceSession>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE attendance_sessions
                    SET credential = $2
                    WHERE id = $1 AND closed_at IS NULL
                    RETURNING {}
                    "#,
                    SESSION_COLUMNS
                ),
                &[&id, &credential],
            )
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_session(&r)?)),
            None => self.find_session(id).await,
        }
    }

    async fn list_sessions(&self, instructor_id: Option<Uuid>) -> Result<Vec<AttendanceSession>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT s.id, s.schedule_id, s.opened_by, s.created_at, s.expires_at,
                       s.closed_at, s.credential
                FROM attendance_sessions s
                JOIN class_schedules c ON c.id = s.schedule_id
                WHERE $1::uuid IS NULL OR c.instructor_id = $1
                ORDER BY s.created_at DESC
                "#,
                &[&instructor_id],
            )
            .await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn redeem(&self, attempt: &RedemptionAttempt, policy: &ScanPolicy) -> Result<ScanOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // FOR SHARE makes a concurrent close wait for this redemption.
        let session = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM attendance_sessions WHERE credential = $1 FOR SHARE",
                    SESSION_COLUMNS
                ),
                &[&attempt.credential],
            )
            .await?
            .map(|r| row_to_session(&r))
            .transpose()?;

        let (enrolled, existing) = match &session {
            Some(s) => {
                let enrolled: bool = tx
                    .query_one(
                        r#"
                        SELECT EXISTS (
                            SELECT 1 FROM enrollments
                            WHERE schedule_id = $1 AND student_id = $2
                        ) AS enrolled
                        "#,
                        &[&s.schedule_id, &attempt.student_id],
                    )
                    .await?
                    .try_get("enrolled")?;
                let existing = tx
                    .query_opt(
                        r#"
                        SELECT session_id, student_id, status, recorded_at
                        FROM attendance_records
                        WHERE session_id = $1 AND student_id = $2
                        "#,
                        &[&s.id, &attempt.student_id],
                    )
                    .await?
                    .map(|r| row_to_record(&r))
                    .transpose()?;
                (enrolled, existing)
            }
            None => (false, None),
        };

        let facts = RedemptionFacts {
            session: session.as_ref(),
            enrolled,
            existing: existing.as_ref(),
        };

        let outcome = match policy.judge(facts, attempt.arrived_at) {
            Verdict::Reject(reason) => ScanOutcome::Rejected { reason },
            Verdict::Duplicate(record) => ScanOutcome::AlreadyRecorded {
                classification: record.classification,
                recorded_at: record.recorded_at,
            },
            Verdict::Accept(classification) => {
                let session_id = session.as_ref().map(|s| s.id).ok_or(AppError::NotFound)?;
                let inserted = tx
                    .query_opt(
                        r#"
                        INSERT INTO attendance_records (session_id, student_id, status, recorded_at)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (session_id, student_id) DO NOTHING
                        RETURNING session_id, student_id, status, recorded_at
                        "#,
                        &[
                            &session_id,
                            &attempt.student_id,
                            &classification,
                            &attempt.arrived_at,
                        ],
                    )
                    .await?;

                match inserted {
                    Some(row) => {
                        let record = row_to_record(&row)?;
                        ScanOutcome::Recorded {
                            classification: record.classification,
                            recorded_at: record.recorded_at,
                        }
                    }
                    // A concurrent redemption for the same student won the insert.
                    None => {
                        let row = tx
                            .query_one(
                                r#"
                                SELECT session_id, student_id, status, recorded_at
                                FROM attendance_records
                                WHERE session_id = $1 AND student_id = $2
                                "#,
                                &[&session_id, &attempt.student_id],
                            )
                            .await?;
                        let record = row_to_record(&row)?;
                        ScanOutcome::AlreadyRecorded {
                            classification: record.classification,
                            recorded_at: record.recorded_at,
                        }
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_records(&self, session_id: Uuid) -> Result<Vec<RecordView>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT r.session_id, r.student_id, r.status, r.recorded_at,
                       u.username, u.display_name
                FROM attendance_records r
                JOIN users u ON u.id = r.student_id
                WHERE r.session_id = $1
                ORDER BY r.recorded_at ASC
                "#,
                &[&session_id],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<RecordView> {
                let classification: Classification = row.try_get("status")?;
                Ok(RecordView {
                    session_id: row.try_get("session_id")?,
                    student_id: row.try_get("student_id")?,
                    username: row.try_get("username")?,
                    display_name: row.try_get("display_name")?,
                    classification,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn student_history(&self, student_id: Uuid) -> Result<Vec<HistoryEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT r.session_id, r.status, r.recorded_at,
                       c.id AS schedule_id, c.course_code, c.section_name
                FROM attendance_records r
                JOIN attendance_sessions s ON s.id = r.session_id
                JOIN class_schedules c ON c.id = s.schedule_id
                WHERE r.student_id = $1
                ORDER BY r.recorded_at DESC
                "#,
                &[&student_id],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<HistoryEntry> {
                let classification: Classification = row.try_get("status")?;
                Ok(HistoryEntry {
                    session_id: row.try_get("session_id")?,
                    schedule_id: row.try_get("schedule_id")?,
                    course_code: row.try_get("course_code")?,
                    section_name: row.try_get("section_name")?,
                    classification,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn close_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let closed = client
            .execute(
                r#"
                UPDATE attendance_sessions
                SET closed_at = expires_at
                WHERE closed_at IS NULL AND expires_at < $1
                "#,
                &[&now],
            )
            .await?;
        Ok(closed)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO audit_log (actor_id, action, description, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
                &[&entry.actor_id, &entry.action, &entry.description, &entry.created_at],
            )
            .await?;
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, actor_id, action, description, created_at
                FROM audit_log
                ORDER BY id DESC
                LIMIT $1
                "#,
                &[&limit],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<AuditEntry> {
                Ok(AuditEntry {
                    id: row.try_get("id")?,
                    actor_id: row.try_get("actor_id")?,
                    action: row.try_get("action")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO users (id, username, display_name, password, role, is_active, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE
                SET username = EXCLUDED.username,
                    display_name = EXCLUDED.display_name,
                    password = EXCLUDED.password,
                    role = EXCLUDED.role,
                    is_active = EXCLUDED.is_active
                "#,
                &[
                    &user.id,
                    &user.username,
                    &user.display_name,
                    &user.password,
                    &user.role.as_str(),
                    &user.is_active,
                    &user.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_schedule(&self, schedule: ClassSchedule) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO class_schedules (id, course_code, section_name, instructor_id, room)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE
                SET course_code = EXCLUDED.course_code,
                    section_name = EXCLUDED.section_name,
                    instructor_id = EXCLUDED.instructor_id,
                    room = EXCLUDED.room
                "#,
                &[
                    &schedule.id,
                    &schedule.course_code,
                    &schedule.section_name,
                    &schedule.instructor_id,
                    &schedule.room,
                ],
            )
            .await?;
        Ok(())
    }

    async fn enroll(&self, schedule_id: Uuid, student_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO enrollments (schedule_id, student_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
                &[&schedule_id, &student_id],
            )
            .await?;
        Ok(())
    }
}
