use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// The user who performed the action, if known.
    pub actor_id: Option<Uuid>,
    /// A short action slug, e.g. `session.open`.
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An audit entry waiting to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Option<Uuid>,
    pub action: &'static str,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
