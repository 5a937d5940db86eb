use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::repository;
use crate::deadline::{self, ReminderInputs};
use crate::error::AppError;
use crate::models::{NotificationEvent, ReminderRule};
use crate::notifier::NotificationSink;

pub struct ReminderService {
    db: SqlitePool,
    sink: Arc<dyn NotificationSink>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReminderStats {
    pub reference_date: Option<NaiveDate>,
    pub quizzes_considered: usize,
    pub quizzes_skipped_bad_date: usize,
    pub rules_active: usize,
    pub events: usize,
    pub already_sent: usize,
    pub delivered: usize,
    pub failed: usize,
    pub audit_failed: usize,
}

#[derive(Debug, Serialize)]
pub struct ReminderPreview {
    pub stats: ReminderStats,
    pub events: Vec<NotificationEvent>,
}

impl ReminderService {
    pub fn new(db: SqlitePool, sink: Arc<dyn NotificationSink>) -> Self {
        Self { db, sink }
    }

    /// Reads everything the evaluator needs in one go.
    pub async fn load_inputs(&self) -> Result<ReminderInputs, AppError> {
        Ok(ReminderInputs {
            quizzes: repository::fetch_quizzes_with_deadline(&self.db).await?,
            course_access: repository::fetch_course_access(&self.db).await?,
            completions: repository::fetch_completions(&self.db).await?,
            rules: repository::fetch_rules(&self.db).await?,
        })
    }

    /// Evaluates without sending anything.
    pub async fn preview(&self, reference: NaiveDate) -> Result<ReminderPreview, AppError> {
        let inputs = self.load_inputs().await?;
        let mut stats = summarize(&inputs, reference);
        let events = deadline::evaluate(&inputs, reference);
        stats.events = events.len();
        Ok(ReminderPreview { stats, events })
    }

    /// Evaluates and hands every event to the sink. Events already delivered
    /// for `reference` are skipped. Delivery and audit failures are counted,
    /// not returned.
    pub async fn run_for(&self, reference: NaiveDate) -> Result<ReminderStats, AppError> {
        info!("Evaluating quiz deadline reminders for {}", reference);

        let inputs = self.load_inputs().await?;
        let mut stats = summarize(&inputs, reference);
        let events = deadline::evaluate(&inputs, reference);
        stats.events = events.len();

        if events.is_empty() {
            info!("No reminders due on {}: {:?}", reference, stats);
            return Ok(stats);
        }

        let rules: HashMap<&str, &ReminderRule> =
            inputs.rules.iter().map(|r| (r.id.as_str(), r)).collect();
        let delivered_before = repository::fetch_delivered_keys(&self.db, reference).await?;

        for event in &events {
            let Some(rule) = rules.get(event.rule_id.as_str()) else {
                continue;
            };

            let key = (event.rule_id.clone(), event.user_id, event.quiz_id);
            if delivered_before.contains(&key) {
                stats.already_sent += 1;
                continue;
            }

            let delivered = match self.sink.send(rule, event, reference).await {
                Ok(()) => {
                    stats.delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(
                        "Reminder delivery failed for user {} quiz {}: {}",
                        event.user_id, event.quiz_id, e
                    );
                    stats.failed += 1;
                    false
                }
            };

            if let Err(e) =
                repository::insert_sent_reminder(&self.db, event, reference, delivered).await
            {
                warn!(
                    "Could not record reminder for user {} quiz {}: {}",
                    event.user_id, event.quiz_id, e
                );
                stats.audit_failed += 1;
            }
        }

        info!("Reminders for {} done: {:?}", reference, stats);
        Ok(stats)
    }
}

fn summarize(inputs: &ReminderInputs, reference: NaiveDate) -> ReminderStats {
    let mut stats = ReminderStats {
        reference_date: Some(reference),
        quizzes_considered: inputs.quizzes.len(),
        rules_active: deadline::active_rules(&inputs.rules).len(),
        ..Default::default()
    };

    for quiz in &inputs.quizzes {
        let raw = quiz.expiry_date.as_deref().unwrap_or_default();
        if deadline::parse_expiry_date(raw).is_none() {
            warn!("Skipping quiz {} (unreadable deadline {:?})", quiz.id, raw);
            stats.quizzes_skipped_bad_date += 1;
        }
    }

    stats
}
