use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    crypto::{jwt::Claims, token::generate_token},
    error::{AppError, Result},
    models::{
        audit::NewAuditEntry,
        record::{FinalStatus, HistoryEntry, RecordView, SessionSummary, SummaryEntry},
        schedule::ClassSchedule,
        session::{AttendanceSession, OpenOutcome, SessionGrant, SessionView},
        user::Role,
    },
    repositories::{NewSession, OpenResult},
    state::AppState,
};

/// Whether `claims` may run sessions for `schedule`.
fn may_manage(claims: &Claims, schedule: &ClassSchedule) -> bool {
    match claims.role {
        Role::Admin => true,
        Role::Teacher => schedule.instructor_id == Some(claims.sub),
        Role::Student => false,
    }
}

/// Loads a schedule the caller is allowed to manage.
async fn authorized_schedule(state: &AppState, claims: &Claims, schedule_id: Uuid) -> Result<ClassSchedule> {
    let schedule = state
        .store
        .find_schedule(schedule_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !may_manage(claims, &schedule) {
        tracing::warn!("❌ {} is not authorized for schedule {}", claims.sub, schedule_id);
        return Err(AppError::Forbidden);
    }

    Ok(schedule)
}

/// Loads a session the caller owns.
async fn owned_session(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<AttendanceSession> {
    let session = state
        .store
        .find_session(session_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if session.opened_by != claims.sub {
        authorized_schedule(state, claims, session.schedule_id).await?;
    } else if claims.role == Role::Student {
        return Err(AppError::Forbidden);
    }

    Ok(session)
}

async fn audit(state: &AppState, claims: &Claims, action: &'static str, description: String) -> Result<()> {
    state
        .store
        .append_audit(NewAuditEntry {
            actor_id: Some(claims.sub),
            action,
            description,
            created_at: state.clock.now(),
        })
        .await
}

/// Opens an attendance session for a schedule.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `claims` - The verified identity of the caller.
/// * `schedule_id` - The schedule to open a session for.
///
/// # Returns
///
/// `OpenOutcome::Opened` with the new credential, or `OpenOutcome::Conflict`
/// carrying the session that is already active.
pub async fn open_session(state: &AppState, claims: &Claims, schedule_id: Uuid) -> Result<OpenOutcome> {
    let schedule = authorized_schedule(state, claims, schedule_id).await?;

    let now = state.clock.now();
    let new = NewSession {
        id: Uuid::new_v4(),
        schedule_id,
        opened_by: claims.sub,
        created_at: now,
        ttl: state.config.session_ttl(),
        credential: generate_token()?,
    };

    match state.store.open_session(new).await? {
        OpenResult::Opened(session) => {
            tracing::info!(
                "✅ Session {} opened for {} ({}), expires at {}",
                session.id,
                schedule.course_code,
                schedule.section_name,
                session.expires_at
            );
            audit(
                state,
                claims,
                "session.open",
                format!("Opened session {} for {}", session.id, schedule.course_code),
            )
            .await?;
            Ok(OpenOutcome::Opened(session.grant(now)))
        }
        OpenResult::AlreadyActive(session) => {
            tracing::warn!("⚠️ Schedule {} already has active session {}", schedule_id, session.id);
            Ok(OpenOutcome::Conflict(session.grant(now)))
        }
    }
}

/// Closes a session. Closing a closed session succeeds without changes.
pub async fn close_session(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<SessionView> {
    let session = owned_session(state, claims, session_id).await?;
    let now = state.clock.now();

    if session.closed_at.is_some() {
        tracing::debug!("🔁 Session {} already closed", session_id);
        return Ok(session.view(now));
    }

    let closed = state
        .store
        .close_session(session_id, now)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!("✅ Session {} closed", session_id);
    audit(state, claims, "session.close", format!("Closed session {}", session_id)).await?;

    Ok(closed.view(now))
}

/// The live credential of a schedule's active session, if there is one.
///
/// Lets a client resume a session after a reload instead of opening another.
pub async fn active_credential(
    state: &AppState,
    claims: &Claims,
    schedule_id: Uuid,
) -> Result<Option<SessionGrant>> {
    authorized_schedule(state, claims, schedule_id).await?;
    let now = state.clock.now();

    Ok(state
        .store
        .find_open_session(schedule_id)
        .await?
        .filter(|session| session.accepts_redemptions_at(now))
        .map(|session| session.grant(now)))
}

/// Replaces the credential of an active session; the old one stops working.
pub async fn rotate_credential(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<SessionGrant> {
    let session = owned_session(state, claims, session_id).await?;
    let now = state.clock.now();

    if !session.accepts_redemptions_at(now) {
        return Err(AppError::Validation("Session is no longer active".to_string()));
    }

    let rotated = state
        .store
        .replace_credential(session_id, generate_token()?)
        .await?
        .ok_or(AppError::NotFound)?;

    if rotated.credential == session.credential {
        return Err(AppError::Validation("Session is no longer active".to_string()));
    }

    tracing::info!("🔄 Credential rotated for session {}", session_id);
    audit(state, claims, "session.rotate", format!("Rotated credential of session {}", session_id)).await?;

    Ok(rotated.grant(now))
}

/// The public state of one session.
pub async fn session_view(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<SessionView> {
    let session = owned_session(state, claims, session_id).await?;
    Ok(session.view(state.clock.now()))
}

/// Sessions visible to the caller, newest first.
pub async fn list_sessions(state: &AppState, claims: &Claims) -> Result<Vec<SessionView>> {
    let instructor = match claims.role {
        Role::Admin => None,
        Role::Teacher => Some(claims.sub),
        Role::Student => return Err(AppError::Forbidden),
    };

    let now = state.clock.now();
    Ok(state
        .store
        .list_sessions(instructor)
        .await?
        .iter()
        .map(|s| s.view(now))
        .collect())
}

/// The records of one session in redemption order.
pub async fn list_records(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<Vec<RecordView>> {
    owned_session(state, claims, session_id).await?;
    state.store.list_records(session_id).await
}

/// The calling student's own records across every class, newest first.
pub async fn own_history(state: &AppState, claims: &Claims) -> Result<Vec<HistoryEntry>> {
    if claims.role != Role::Student {
        return Err(AppError::Forbidden);
    }
    state.store.student_history(claims.sub).await
}

/// Joins the roster with the session's records. Rostered students without
/// a record are reported absent; nothing is written.
pub async fn summarize(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<SessionSummary> {
    let session = owned_session(state, claims, session_id).await?;

    let roster = state.store.roster(session.schedule_id).await?;
    let records: HashMap<Uuid, RecordView> = state
        .store
        .list_records(session_id)
        .await?
        .into_iter()
        .map(|r| (r.student_id, r))
        .collect();

    let entries: Vec<SummaryEntry> = roster
        .into_iter()
        .map(|student| {
            let record = records.get(&student.student_id);
            SummaryEntry {
                student_id: student.student_id,
                username: student.username,
                display_name: student.display_name,
                status: record
                    .map(|r| FinalStatus::from(r.classification))
                    .unwrap_or(FinalStatus::Absent),
                recorded_at: record.map(|r| r.recorded_at),
            }
        })
        .collect();

    let count = |status: FinalStatus| entries.iter().filter(|e| e.status == status).count();

    Ok(SessionSummary {
        session_id,
        present: count(FinalStatus::Present),
        late: count(FinalStatus::Late),
        absent: count(FinalStatus::Absent),
        entries,
    })
}

/// Closes sessions that expired without an explicit close.
pub async fn sweep_expired(state: &AppState) -> Result<u64> {
    let closed = state.store.close_expired_sessions(state.clock.now()).await?;
    if closed > 0 {
        tracing::info!("🧹 Closed {} expired session(s)", closed);
    }
    Ok(closed)
}
