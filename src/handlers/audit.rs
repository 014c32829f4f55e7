use axum::{extract::State, Extension, Json};

use crate::{
    crypto::jwt::Claims,
    error::{AppError, Result},
    models::{audit::AuditEntry, user::Role},
    state::AppState,
};

const AUDIT_PAGE_SIZE: i64 = 50;

/// The most recent audit entries. Admins only.
pub async fn recent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<AuditEntry>>> {
    if claims.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    let entries = state.store.recent_audit(AUDIT_PAGE_SIZE).await?;
    Ok(Json(entries))
}
