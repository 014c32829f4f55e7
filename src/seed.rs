//! Start-up provisioning of users, schedules and rosters from a JSON file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{schedule::ClassSchedule, user::{Role, User}},
    services::auth::hash_password,
    state::AppState,
    validation::auth::{validate_password, validate_username},
};

/// A user to provision. The password is plaintext and hashed on load.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
}

/// A schedule to provision, referring to users by username.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSchedule {
    pub id: Uuid,
    pub course_code: String,
    pub section_name: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub students: Vec<String>,
}

/// The contents of a seed file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub schedules: Vec<SeedSchedule>,
}

impl Fixture {
    /// Reads and parses a seed file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        sonic_rs::from_str(&raw)
            .map_err(|e| AppError::Validation(format!("Invalid seed file {}: {}", path.display(), e)))
    }
}

/// Provisions everything in `fixture`. Existing users keep their ID.
///
/// # Returns
///
/// The provisioned user IDs keyed by username.
pub async fn apply(state: &AppState, fixture: &Fixture) -> Result<HashMap<String, Uuid>> {
    let mut ids = HashMap::new();

    for seed in &fixture.users {
        validate_username(&seed.username)?;
        validate_password(&seed.password)?;

        let existing = state.store.find_user_by_username(&seed.username).await?;
        let id = seed
            .id
            .or(existing.as_ref().map(|u| u.id))
            .unwrap_or_else(Uuid::new_v4);

        state
            .store
            .insert_user(User {
                id,
                username: seed.username.clone(),
                display_name: seed.display_name.clone(),
                password: hash_password(&seed.password)?,
                role: seed.role,
                is_active: true,
                created_at: existing
                    .map(|u| u.created_at)
                    .unwrap_or_else(|| state.clock.now()),
            })
            .await?;

        ids.insert(seed.username.clone(), id);
    }

    let lookup = |username: &str| -> Result<Uuid> {
        ids.get(username)
            .copied()
            .ok_or_else(|| AppError::Validation(format!("Seed refers to unknown user: {}", username)))
    };

    for seed in &fixture.schedules {
        let instructor_id = seed.instructor.as_deref().map(lookup).transpose()?;

        state
            .store
            .insert_schedule(ClassSchedule {
                id: seed.id,
                course_code: seed.course_code.clone(),
                section_name: seed.section_name.clone(),
                instructor_id,
                room: seed.room.clone(),
            })
            .await?;

        for student in &seed.students {
            state.store.enroll(seed.id, lookup(student)?).await?;
        }

        tracing::debug!("📚 Seeded {} with {} students", seed.course_code, seed.students.len());
    }

    tracing::info!(
        "✅ Seed applied: {} users, {} schedules",
        fixture.users.len(),
        fixture.schedules.len()
    );
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_roster_member_is_rejected() {
        let state = AppState::in_memory(Config::in_memory(vec![7; 32]), Arc::new(SystemClock));
        let fixture: Fixture = sonic_rs::from_str(
            r#"{
                "users": [],
                "schedules": [{
                    "id": "6f1c9a52-3d1e-4e0b-9a57-0c1f2e3d4b5a",
                    "course_code": "CS101",
                    "section_name": "A",
                    "students": ["ghost"]
                }]
            }"#,
        )
        .unwrap();

        let err = apply(&state, &fixture).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
