use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Course,
    Lesson,
    Topic,
    Quiz,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Course => "course",
            CompletionKind::Lesson => "lesson",
            CompletionKind::Topic => "topic",
            CompletionKind::Quiz => "quiz",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "course" => Some(CompletionKind::Course),
            "lesson" => Some(CompletionKind::Lesson),
            "topic" => Some(CompletionKind::Topic),
            "quiz" => Some(CompletionKind::Quiz),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub user_id: i64,
    pub kind: CompletionKind,
    pub item_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantAccessRequest {
    pub user_id: i64,
}
