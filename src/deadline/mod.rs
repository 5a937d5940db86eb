//! Deadline reminder matching.
//!
//! Everything here is a pure function of a [`ReminderInputs`] snapshot and a
//! reference date. Loading the snapshot and delivering the resulting events
//! is done by `services::reminder_service`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{CompletionKind, NotificationEvent, Quiz, ReminderRule};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Per-user completion flags for courses, lessons, topics and quizzes.
#[derive(Debug, Clone, Default)]
pub struct Completions {
    done: HashSet<(i64, CompletionKind, i64)>,
}

impl Completions {
    pub fn insert(&mut self, user_id: i64, kind: CompletionKind, item_id: i64) {
        self.done.insert((user_id, kind, item_id));
    }

    pub fn is_complete(&self, user_id: i64, kind: CompletionKind, item_id: i64) -> bool {
        self.done.contains(&(user_id, kind, item_id))
    }

    /// True when the user has finished the quiz or anything that contains it.
    fn has_finished(&self, user_id: i64, quiz: &Quiz) -> bool {
        if self.is_complete(user_id, CompletionKind::Course, quiz.course_id) {
            return true;
        }
        if let Some(lesson_id) = quiz.lesson_id {
            if self.is_complete(user_id, CompletionKind::Lesson, lesson_id) {
                return true;
            }
        }
        if let Some(topic_id) = quiz.topic_id {
            if self.is_complete(user_id, CompletionKind::Topic, topic_id) {
                return true;
            }
        }
        self.is_complete(user_id, CompletionKind::Quiz, quiz.id)
    }
}

/// Snapshot the evaluator works on. Access lists keep their stored order.
#[derive(Debug, Clone, Default)]
pub struct ReminderInputs {
    pub quizzes: Vec<Quiz>,
    pub course_access: HashMap<i64, Vec<i64>>,
    pub completions: Completions,
    pub rules: Vec<ReminderRule>,
}

/// Signed number of whole days from `reference` to `expiry`.
/// Negative once the deadline has passed.
pub fn days_until(expiry: NaiveDate, reference: NaiveDate) -> i64 {
    (expiry - reference).num_days()
}

/// Parses a stored deadline. Returns `None` for anything unrecognised.
pub fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

/// Parses a rule's "days before" value. Only positive integers are active.
pub fn parse_threshold(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|days| *days > 0)
}

fn scope_admits(filter: Option<i64>, value: Option<i64>) -> bool {
    match filter {
        None | Some(0) => true,
        Some(id) => value == Some(id),
    }
}

/// Whether the rule's course/lesson/topic/quiz filters let this quiz through.
pub fn rule_admits(rule: &ReminderRule, quiz: &Quiz) -> bool {
    scope_admits(rule.course_id, Some(quiz.course_id))
        && scope_admits(rule.lesson_id, quiz.lesson_id)
        && scope_admits(rule.topic_id, quiz.topic_id)
        && scope_admits(rule.quiz_id, Some(quiz.id))
}

/// Rules with a usable threshold, paired with it, in input order.
pub fn active_rules(rules: &[ReminderRule]) -> Vec<(&ReminderRule, i64)> {
    rules
        .iter()
        .filter_map(|rule| parse_threshold(&rule.quiz_expires_days).map(|days| (rule, days)))
        .collect()
}

/// Produces every reminder due on `reference`, in quiz → user → rule order.
pub fn evaluate(inputs: &ReminderInputs, reference: NaiveDate) -> Vec<NotificationEvent> {
    let rules = active_rules(&inputs.rules);
    if inputs.quizzes.is_empty() || inputs.course_access.is_empty() || rules.is_empty() {
        return Vec::new();
    }

    let mut events = Vec::new();

    for quiz in &inputs.quizzes {
        let Some(expiry) = quiz.expiry_date.as_deref().and_then(parse_expiry_date) else {
            continue;
        };

        let users = match inputs.course_access.get(&quiz.course_id) {
            Some(users) if !users.is_empty() => users,
            _ => continue,
        };

        let remaining = days_until(expiry, reference);

        for &user_id in users {
            if inputs.completions.has_finished(user_id, quiz) {
                continue;
            }

            for (rule, threshold) in &rules {
                if remaining >= 0 && remaining == *threshold && rule_admits(rule, quiz) {
                    events.push(NotificationEvent {
                        rule_id: rule.id.clone(),
                        user_id,
                        course_id: quiz.course_id,
                        lesson_id: quiz.lesson_id,
                        topic_id: quiz.topic_id,
                        quiz_id: quiz.id,
                    });
                }
            }
        }
    }

    events
}
