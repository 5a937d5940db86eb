use serde::Serialize;

pub const DEADLINE_QUIZ: &str = "deadline_quiz";

#[derive(Debug, Clone, Serialize)]
pub struct SettingField {
    pub key: &'static str,
    pub kind: &'static str,
    pub title: &'static str,
    pub help_text: &'static str,
    pub label: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trigger {
    pub key: &'static str,
    pub label: &'static str,
    pub fields: Vec<SettingField>,
    /// Generic notification settings that don't apply to this trigger.
    pub hidden: Vec<&'static str>,
    pub placeholders: Vec<&'static str>,
}

/// Placeholders shared with the "user passed a quiz" trigger.
const QUIZ_PLACEHOLDERS: &[&str] = &[
    "[ld_notifications field=\"user\" show=\"username\"]",
    "[ld_notifications field=\"user\" show=\"first_name\"]",
    "[ld_notifications field=\"user\" show=\"last_name\"]",
    "[ld_notifications field=\"user\" show=\"display_name\"]",
    "[ld_notifications field=\"user\" show=\"email\"]",
    "[ld_notifications field=\"course\" show=\"title\"]",
    "[ld_notifications field=\"course\" show=\"url\"]",
    "[ld_notifications field=\"lesson\" show=\"title\"]",
    "[ld_notifications field=\"topic\" show=\"title\"]",
    "[ld_notifications field=\"quiz\" show=\"title\"]",
    "[ld_notifications field=\"quiz\" show=\"url\"]",
];

fn scope_field(key: &'static str, title: &'static str) -> SettingField {
    SettingField {
        key,
        kind: "select",
        title,
        help_text: "Leave empty to match any.",
        label: None,
    }
}

pub fn deadline_quiz() -> Trigger {
    Trigger {
        key: DEADLINE_QUIZ,
        label: "\"X\" days before quiz deadline",
        fields: vec![
            scope_field("course_id", "Course"),
            scope_field("lesson_id", "Lesson"),
            scope_field("topic_id", "Topic"),
            scope_field("quiz_id", "Quiz"),
            SettingField {
                key: "quiz_expires_days",
                kind: "text",
                title: "Before how many days?",
                help_text: "Setting associated with the email trigger setting above.",
                label: Some("day(s)"),
            },
        ],
        hidden: vec!["delay"],
        placeholders: QUIZ_PLACEHOLDERS.to_vec(),
    }
}

/// Deadline field available on lesson assignment settings.
pub fn assignment_expiry_field() -> SettingField {
    SettingField {
        key: "assignment_expiry_time",
        kind: "date",
        title: "Date of Expiry",
        help_text: "Specify the expiry date of assignment.",
        label: None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registry {
    pub triggers: Vec<Trigger>,
    pub lesson_fields: Vec<SettingField>,
}

pub fn registry() -> Registry {
    Registry {
        triggers: vec![deadline_quiz()],
        lesson_fields: vec![assignment_expiry_field()],
    }
}
