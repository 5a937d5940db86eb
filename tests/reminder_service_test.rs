use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use quiz_deadline::db::repository;
use quiz_deadline::error::AppError;
use quiz_deadline::models::{
    CompletionKind, CompletionRequest, NotificationEvent, ReminderRule, ReminderRuleRequest,
    StepKind, UpsertQuizRequest, UpsertStepRequest,
};
use quiz_deadline::notifier::NotificationSink;
use quiz_deadline::services::{DailyScheduler, ReminderService};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<NotificationEvent>>,
    reject_user: Option<i64>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        _rule: &ReminderRule,
        event: &NotificationEvent,
        _reference: NaiveDate,
    ) -> Result<(), AppError> {
        if self.reject_user == Some(event.user_id) {
            return Err(AppError::Notify("mailbox full".to_string()));
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn setup_db() -> SqlitePool {
    // one connection, otherwise every connection gets its own in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Course 1 with lesson 100, topic 200 under it, and quiz 10 under the topic
/// due on 2024-03-10. User 7 has access; one rule fires 3 days before.
async fn seed(pool: &SqlitePool) -> ReminderRule {
    repository::upsert_step(
        pool,
        &UpsertStepRequest {
            id: 100,
            course_id: 1,
            kind: StepKind::Lesson,
            parent_lesson_id: None,
            title: "Lesson".to_string(),
            assignment_expiry_time: None,
        },
    )
    .await
    .expect("Failed to insert lesson");

    repository::upsert_step(
        pool,
        &UpsertStepRequest {
            id: 200,
            course_id: 1,
            kind: StepKind::Topic,
            parent_lesson_id: Some(100),
            title: "Topic".to_string(),
            assignment_expiry_time: None,
        },
    )
    .await
    .expect("Failed to insert topic");

    repository::upsert_quiz(
        pool,
        &UpsertQuizRequest {
            id: 10,
            course_id: 1,
            parent_step_id: Some(200),
            title: "Final quiz".to_string(),
        },
    )
    .await
    .expect("Failed to insert quiz");

    repository::set_quiz_deadline(pool, 10, " 03/10/2024 ")
        .await
        .expect("Failed to set deadline");

    repository::grant_access(pool, 1, 7)
        .await
        .expect("Failed to grant access");

    repository::insert_rule(
        pool,
        ReminderRuleRequest {
            title: "Three days left".to_string(),
            quiz_expires_days: "3".to_string(),
            course_id: None,
            lesson_id: None,
            topic_id: None,
            quiz_id: None,
        },
    )
    .await
    .expect("Failed to insert rule")
}

#[tokio::test]
async fn test_sends_reminder_three_days_before_deadline() {
    let pool = setup_db().await;
    let rule = seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool.clone(), sink.clone());

    let stats = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(stats.events, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.rules_active, 1);

    assert_eq!(
        sink.sent(),
        vec![NotificationEvent {
            rule_id: rule.id.clone(),
            user_id: 7,
            course_id: 1,
            lesson_id: Some(100),
            topic_id: Some(200),
            quiz_id: 10,
        }]
    );

    let log = repository::fetch_sent_reminders(&pool).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].delivered);
    assert_eq!(log[0].reference_date, "2024-03-07");
}

#[tokio::test]
async fn test_nothing_sent_on_other_days() {
    let pool = setup_db().await;
    seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool, sink.clone());

    for day in ["2024-03-06", "2024-03-08", "2024-03-10", "2024-03-11"] {
        let stats = service.run_for(date(day)).await.unwrap();
        assert_eq!(stats.events, 0, "unexpected reminder on {}", day);
    }
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_completed_topic_suppresses_reminder() {
    let pool = setup_db().await;
    seed(&pool).await;
    repository::mark_complete(
        &pool,
        &CompletionRequest {
            user_id: 7,
            kind: CompletionKind::Topic,
            item_id: 200,
        },
    )
    .await
    .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool, sink.clone());

    let stats = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(stats.events, 0);
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn test_delivery_failure_does_not_stop_the_run() {
    let pool = setup_db().await;
    seed(&pool).await;
    repository::grant_access(&pool, 1, 8).await.unwrap();

    let sink = Arc::new(RecordingSink {
        reject_user: Some(7),
        ..Default::default()
    });
    let service = ReminderService::new(pool.clone(), sink.clone());

    let stats = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(sink.sent()[0].user_id, 8);

    let log = repository::fetch_sent_reminders(&pool).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.iter().filter(|r| !r.delivered).count(), 1);
}

#[tokio::test]
async fn test_unreadable_deadline_is_skipped_not_fatal() {
    let pool = setup_db().await;
    seed(&pool).await;
    repository::upsert_quiz(
        &pool,
        &UpsertQuizRequest {
            id: 11,
            course_id: 1,
            parent_step_id: Some(100),
            title: "Broken".to_string(),
        },
    )
    .await
    .unwrap();
    repository::set_quiz_deadline(&pool, 11, "sometime in march")
        .await
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool, sink.clone());

    let stats = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(stats.quizzes_considered, 2);
    assert_eq!(stats.quizzes_skipped_bad_date, 1);
    assert_eq!(stats.events, 1);
    assert_eq!(sink.sent()[0].quiz_id, 10);
}

#[tokio::test]
async fn test_preview_does_not_send() {
    let pool = setup_db().await;
    seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool.clone(), sink.clone());

    let preview = service.preview(date("2024-03-07")).await.unwrap();
    assert_eq!(preview.events.len(), 1);
    assert!(sink.sent().is_empty());
    assert!(repository::fetch_sent_reminders(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clearing_deadline_removes_quiz_from_evaluation() {
    let pool = setup_db().await;
    seed(&pool).await;

    let quiz = repository::set_quiz_deadline(&pool, 10, "   ")
        .await
        .unwrap()
        .expect("quiz exists");
    assert_eq!(quiz.expiry_date, None);
    assert!(repository::fetch_quizzes_with_deadline(&pool).await.unwrap().is_empty());

    let missing = repository::set_quiz_deadline(&pool, 999, "2024-03-10").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_scheduler_runs_once_per_day() {
    let pool = setup_db().await;
    seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let scheduler = DailyScheduler::new(pool.clone(), sink.clone(), 6);

    let first = scheduler.run_if_due(date("2024-03-07")).await.unwrap();
    assert_eq!(first.map(|s| s.events), Some(1));

    let again = scheduler.run_if_due(date("2024-03-07")).await.unwrap();
    assert!(again.is_none());
    assert_eq!(sink.sent().len(), 1);

    let next_day = scheduler.run_if_due(date("2024-03-08")).await.unwrap();
    assert_eq!(next_day.map(|s| s.events), Some(0));
}

#[tokio::test]
async fn test_same_reminder_is_delivered_once_per_day() {
    let pool = setup_db().await;
    seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let service = ReminderService::new(pool.clone(), sink.clone());
    let scheduler = DailyScheduler::new(pool.clone(), sink.clone(), 6);

    let manual = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(manual.delivered, 1);

    let scheduled = scheduler
        .run_if_due(date("2024-03-07"))
        .await
        .unwrap()
        .expect("day not yet on record");
    assert_eq!(scheduled.events, 1);
    assert_eq!(scheduled.already_sent, 1);
    assert_eq!(scheduled.delivered, 0);

    let again = service.run_for(date("2024-03-07")).await.unwrap();
    assert_eq!(again.already_sent, 1);
    assert!(scheduler.run_if_due(date("2024-03-07")).await.unwrap().is_none());

    assert_eq!(sink.sent().len(), 1);
    assert_eq!(repository::fetch_sent_reminders(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_by_a_later_run_the_same_day() {
    let pool = setup_db().await;
    seed(&pool).await;

    let rejecting = Arc::new(RecordingSink {
        reject_user: Some(7),
        ..Default::default()
    });
    let first = ReminderService::new(pool.clone(), rejecting)
        .run_for(date("2024-03-07"))
        .await
        .unwrap();
    assert_eq!(first.failed, 1);

    let sink = Arc::new(RecordingSink::default());
    let second = ReminderService::new(pool.clone(), sink.clone())
        .run_for(date("2024-03-07"))
        .await
        .unwrap();
    assert_eq!(second.already_sent, 0);
    assert_eq!(second.delivered, 1);
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_overlap() {
    let pool = setup_db().await;
    seed(&pool).await;
    let sink = Arc::new(RecordingSink::default());
    let scheduler = Arc::new(DailyScheduler::new(pool.clone(), sink.clone(), 6));

    let (a, b) = tokio::join!(
        scheduler.run_if_due(date("2024-03-07")),
        scheduler.run_if_due(date("2024-03-07"))
    );
    let ran = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_some()).count();

    assert_eq!(ran, 1);
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn test_audit_failure_does_not_stop_the_run() {
    let pool = setup_db().await;
    seed(&pool).await;
    repository::grant_access(&pool, 1, 8).await.unwrap();

    sqlx::query(
        r#"
        CREATE TRIGGER reject_audit BEFORE INSERT ON sent_reminders
        WHEN NEW.user_id = 7
        BEGIN
            SELECT RAISE(ABORT, 'audit log unavailable');
        END
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create trigger");

    let sink = Arc::new(RecordingSink::default());
    let scheduler = DailyScheduler::new(pool.clone(), sink.clone(), 6);

    let stats = scheduler
        .run_if_due(date("2024-03-07"))
        .await
        .expect("run should finish despite the audit failure")
        .expect("day not yet on record");
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.audit_failed, 1);

    let users: Vec<_> = sink.sent().iter().map(|e| e.user_id).collect();
    assert_eq!(users, vec![7, 8]);

    // the day is on record, so a restart doesn't notify user 7 again
    assert!(scheduler.run_if_due(date("2024-03-07")).await.unwrap().is_none());
    assert_eq!(sink.sent().len(), 2);
}

#[tokio::test]
async fn test_quiz_under_lesson_has_no_topic() {
    let pool = setup_db().await;
    seed(&pool).await;

    let quiz = repository::upsert_quiz(
        &pool,
        &UpsertQuizRequest {
            id: 12,
            course_id: 1,
            parent_step_id: Some(100),
            title: "Lesson quiz".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(quiz.lesson_id, Some(100));
    assert_eq!(quiz.topic_id, None);

    let loose = repository::upsert_quiz(
        &pool,
        &UpsertQuizRequest {
            id: 13,
            course_id: 1,
            parent_step_id: None,
            title: "Course quiz".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!((loose.lesson_id, loose.topic_id), (None, None));

    let in_topic = repository::find_quiz_by_id(&pool, 10).await.unwrap().unwrap();
    assert_eq!((in_topic.lesson_id, in_topic.topic_id), (Some(100), Some(200)));
}

#[tokio::test]
async fn test_editing_a_rule_keeps_its_position() {
    let pool = setup_db().await;
    let first = seed(&pool).await;
    let second = repository::insert_rule(
        &pool,
        ReminderRuleRequest {
            title: "Last call".to_string(),
            quiz_expires_days: "1".to_string(),
            course_id: None,
            lesson_id: None,
            topic_id: None,
            quiz_id: None,
        },
    )
    .await
    .unwrap();

    repository::update_rule(
        &pool,
        &first.id,
        ReminderRuleRequest {
            title: "Three days left!".to_string(),
            quiz_expires_days: "3".to_string(),
            course_id: Some(1),
            lesson_id: None,
            topic_id: None,
            quiz_id: None,
        },
    )
    .await
    .unwrap()
    .expect("rule exists");

    let ids: Vec<_> = repository::fetch_rules(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}
