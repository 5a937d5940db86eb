use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReminderRule {
    pub id: String,
    pub title: String,
    /// "Before how many days?" exactly as it was saved.
    pub quiz_expires_days: String,
    pub course_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub quiz_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRuleRequest {
    pub title: String,
    #[serde(default)]
    pub quiz_expires_days: String,
    pub course_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub quiz_id: Option<i64>,
}

/// One reminder owed to one user for one quiz.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub rule_id: String,
    pub user_id: i64,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub quiz_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SentReminder {
    pub id: String,
    pub rule_id: String,
    pub user_id: i64,
    pub course_id: i64,
    pub lesson_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub quiz_id: i64,
    pub reference_date: String,
    pub delivered: bool,
    pub sent_at: String,
}
