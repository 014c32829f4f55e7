use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    crypto::jwt::Claims,
    error::{error_body, Result},
    models::record::{ScanOutcome, ScanRejection},
    services::scan as scan_service,
    state::AppState,
};

/// The request payload for a redemption. Any decoded QR text is accepted
/// here; text that is not a live credential is judged by the scan service.
#[derive(Deserialize)]
pub struct ScanRequest {
    pub credential: String,
}

fn rejection_status(reason: ScanRejection) -> StatusCode {
    match reason {
        ScanRejection::InvalidCredential => StatusCode::BAD_REQUEST,
        ScanRejection::ExpiredSession => StatusCode::GONE,
        ScanRejection::NotEnrolled => StatusCode::FORBIDDEN,
    }
}

/// Redeems a scanned credential for the calling student.
pub async fn scan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ScanRequest>,
) -> Result<Response> {
    let outcome = scan_service::redeem(&state, &claims, &payload.credential).await?;

    let response = match outcome {
        ScanOutcome::Recorded { .. } => (StatusCode::CREATED, Json(outcome)).into_response(),
        ScanOutcome::AlreadyRecorded { .. } => (StatusCode::OK, Json(outcome)).into_response(),
        ScanOutcome::Rejected { reason } => (
            rejection_status(reason),
            [(header::CONTENT_TYPE, "application/json")],
            error_body(reason.message(), reason.code()),
        )
            .into_response(),
    };

    Ok(response)
}
