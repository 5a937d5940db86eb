use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A quiz with its resolved position in the course tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: i64,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub title: String,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertQuizRequest {
    pub id: i64,
    pub course_id: i64,
    pub parent_step_id: Option<i64>,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDeadlineRequest {
    #[serde(default)]
    pub expiry_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Lesson,
    Topic,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Lesson => "lesson",
            StepKind::Topic => "topic",
        }
    }
}

/// A lesson or a topic. Topics hang off a parent lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertStepRequest {
    pub id: i64,
    pub course_id: i64,
    pub kind: StepKind,
    pub parent_lesson_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    /// Assignment deadline, stored as entered.
    pub assignment_expiry_time: Option<String>,
}
