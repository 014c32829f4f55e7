use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recurring class meeting: a course taught to a section by an instructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSchedule {
    /// The unique identifier for the schedule.
    pub id: Uuid,
    /// The course code, e.g. `IT101`.
    pub course_code: String,
    /// The section name, e.g. `BSIT 4A`.
    pub section_name: String,
    /// The instructor who may open sessions for this schedule.
    pub instructor_id: Option<Uuid>,
    /// The room the class meets in.
    pub room: Option<String>,
}

/// A student on a schedule's roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: Uuid,
    pub username: String,
    pub display_name: String,
}
