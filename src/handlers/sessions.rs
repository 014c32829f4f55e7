use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    crypto::jwt::Claims,
    error::Result,
    models::{
        record::{HistoryEntry, RecordView, SessionSummary},
        session::{OpenOutcome, SessionGrant, SessionView},
    },
    services::sessions as session_service,
    state::AppState,
};

/// The request payload for opening a session.
#[derive(Deserialize)]
pub struct OpenSessionRequest {
    pub schedule_id: Uuid,
}

/// Query parameters for looking up a schedule's active session.
#[derive(Deserialize)]
pub struct ActiveQuery {
    pub schedule_id: Uuid,
}

/// The 409 body returned when a schedule already has an active session.
#[derive(Serialize)]
pub struct ConflictBody {
    pub error: &'static str,
    pub code: &'static str,
    pub session: SessionGrant,
}

/// Opens a session, or reports the one already running.
pub async fn open(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<Response> {
    let response = match session_service::open_session(&state, &claims, payload.schedule_id).await? {
        OpenOutcome::Opened(grant) => (StatusCode::CREATED, Json(grant)).into_response(),
        OpenOutcome::Conflict(grant) => (
            StatusCode::CONFLICT,
            Json(ConflictBody {
                error: "An attendance session is already active for this class",
                code: "conflict",
                session: grant,
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// Closes a session.
pub async fn close(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let view = session_service::close_session(&state, &claims, session_id).await?;
    Ok(Json(view))
}

/// Issues a fresh credential for an active session.
pub async fn rotate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionGrant>> {
    let grant = session_service::rotate_credential(&state, &claims, session_id).await?;
    Ok(Json(grant))
}

/// The live credential of a schedule, or `null`.
pub async fn active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<Option<SessionGrant>>> {
    let grant = session_service::active_credential(&state, &claims, query.schedule_id).await?;
    Ok(Json(grant))
}

/// One session's public state.
pub async fn view(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>> {
    let view = session_service::session_view(&state, &claims, session_id).await?;
    Ok(Json(view))
}

/// Sessions visible to the caller.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SessionView>>> {
    let sessions = session_service::list_sessions(&state, &claims).await?;
    tracing::debug!("📋 Listed {} sessions for {}", sessions.len(), claims.sub);
    Ok(Json(sessions))
}

/// The records of a session.
pub async fn records(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<RecordView>>> {
    let records = session_service::list_records(&state, &claims, session_id).await?;
    Ok(Json(records))
}

/// The reconciliation of a session against its roster.
pub async fn summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSummary>> {
    let summary = session_service::summarize(&state, &claims, session_id).await?;
    Ok(Json(summary))
}

/// The calling student's attendance history.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let history = session_service::own_history(&state, &claims).await?;
    Ok(Json(history))
}
