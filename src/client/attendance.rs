use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    client::{
        error::ClientError,
        pipeline::{ApiRequest, RequestPipeline},
    },
    models::{
        audit::AuditEntry,
        record::{HistoryEntry, RecordView, ScanOutcome, ScanRejection, SessionSummary},
        session::{OpenOutcome, SessionGrant, SessionView},
    },
};

#[derive(Serialize)]
struct OpenBody {
    schedule_id: Uuid,
}

#[derive(Serialize)]
struct ScanBody<'a> {
    credential: &'a str,
}

#[derive(Deserialize)]
struct ConflictResponse {
    session: SessionGrant,
}

#[derive(Deserialize)]
struct RejectionResponse {
    code: String,
}

/// Typed calls for the attendance endpoints, sent through the pipeline.
#[derive(Clone)]
pub struct SessionClient {
    pipeline: RequestPipeline,
}

impl SessionClient {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Opens a session, or returns the one already active for the schedule.
    pub async fn open(&self, schedule_id: Uuid) -> Result<OpenOutcome, ClientError> {
        let request = ApiRequest::post("/api/sessions/open").json(&OpenBody { schedule_id })?;
        let response = self.pipeline.dispatch(&request).await?;

        match response.status {
            StatusCode::CREATED => Ok(OpenOutcome::Opened(response.decode()?)),
            StatusCode::CONFLICT => {
                let ConflictResponse { session } = response.decode()?;
                Ok(OpenOutcome::Conflict(session))
            }
            _ => Err(response.error()),
        }
    }

    pub async fn close(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::post(format!("/api/sessions/{}/close", session_id)))
            .await?
            .success()
    }

    pub async fn active_credential(&self, schedule_id: Uuid) -> Result<Option<SessionGrant>, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get("/api/sessions/active").query("schedule_id", schedule_id))
            .await?
            .success()
    }

    pub async fn rotate(&self, session_id: Uuid) -> Result<SessionGrant, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::post(format!("/api/sessions/{}/rotate", session_id)))
            .await?
            .success()
    }

    pub async fn view(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get(format!("/api/sessions/{}", session_id)))
            .await?
            .success()
    }

    pub async fn list(&self) -> Result<Vec<SessionView>, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get("/api/sessions"))
            .await?
            .success()
    }

    /// Redeems a scanned credential. Business refusals come back as
    /// `ScanOutcome::Rejected`, not as errors.
    pub async fn scan(&self, credential: &str) -> Result<ScanOutcome, ClientError> {
        let request = ApiRequest::post("/api/scan").json(&ScanBody { credential })?;
        let response = self.pipeline.dispatch(&request).await?;

        if response.status.is_success() {
            return response.decode();
        }

        let reason = response
            .decode::<RejectionResponse>()
            .ok()
            .and_then(|body| ScanRejection::from_code(&body.code));

        match reason {
            Some(reason) => Ok(ScanOutcome::Rejected { reason }),
            None => Err(response.error()),
        }
    }

    pub async fn records(&self, session_id: Uuid) -> Result<Vec<RecordView>, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get(format!("/api/sessions/{}/records", session_id)))
            .await?
            .success()
    }

    /// The logged-in student's own records, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get("/api/records/mine"))
            .await?
            .success()
    }

    pub async fn summary(&self, session_id: Uuid) -> Result<SessionSummary, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get(format!("/api/sessions/{}/summary", session_id)))
            .await?
            .success()
    }

    pub async fn audit(&self) -> Result<Vec<AuditEntry>, ClientError> {
        self.pipeline
            .dispatch(&ApiRequest::get("/api/audit"))
            .await?
            .success()
    }
}
