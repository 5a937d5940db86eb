use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::deadline::Completions;
use crate::models::{
    CompletionKind, CompletionRequest, NotificationEvent, Quiz, ReminderRule, ReminderRuleRequest,
    SentReminder, UpsertQuizRequest, UpsertStepRequest,
};

const QUIZ_SELECT: &str = r#"
    SELECT
        q.id AS id,
        q.course_id AS course_id,
        CASE s.kind
            WHEN 'topic' THEN s.parent_lesson_id
            WHEN 'lesson' THEN s.id
            ELSE NULL
        END AS lesson_id,
        CASE s.kind WHEN 'topic' THEN s.id ELSE NULL END AS topic_id,
        q.title AS title,
        q.expiry_date AS expiry_date
    FROM quizzes q
    LEFT JOIN steps s ON s.id = q.parent_step_id
"#;

const RULE_SELECT: &str = r#"
    SELECT id, title, quiz_expires_days, course_id, lesson_id, topic_id, quiz_id
    FROM reminder_rules
"#;

pub async fn upsert_step(db: &SqlitePool, req: &UpsertStepRequest) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO steps (id, course_id, kind, parent_lesson_id, title, assignment_expiry_time)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            course_id = excluded.course_id,
            kind = excluded.kind,
            parent_lesson_id = excluded.parent_lesson_id,
            title = excluded.title,
            assignment_expiry_time = excluded.assignment_expiry_time
        "#,
    )
    .bind(req.id)
    .bind(req.course_id)
    .bind(req.kind.as_str())
    .bind(req.parent_lesson_id)
    .bind(&req.title)
    .bind(req.assignment_expiry_time.as_deref().map(str::trim))
    .execute(db)
    .await?;

    Ok(())
}

/// Creates or moves a quiz. A stored deadline is left untouched.
pub async fn upsert_quiz(db: &SqlitePool, req: &UpsertQuizRequest) -> Result<Quiz, sqlx::Error> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO quizzes (id, course_id, parent_step_id, title, expiry_date, updated_at)
        VALUES (?1, ?2, ?3, ?4, NULL, ?5)
        ON CONFLICT(id) DO UPDATE SET
            course_id = excluded.course_id,
            parent_step_id = excluded.parent_step_id,
            title = excluded.title,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(req.id)
    .bind(req.course_id)
    .bind(req.parent_step_id)
    .bind(&req.title)
    .bind(&now)
    .execute(db)
    .await?;

    find_quiz_by_id(db, req.id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn find_quiz_by_id(db: &SqlitePool, id: i64) -> Result<Option<Quiz>, sqlx::Error> {
    let sql = format!("{} WHERE q.id = ?1", QUIZ_SELECT);
    sqlx::query_as::<_, Quiz>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_quizzes(db: &SqlitePool) -> Result<Vec<Quiz>, sqlx::Error> {
    let sql = format!("{} ORDER BY q.id", QUIZ_SELECT);
    sqlx::query_as::<_, Quiz>(&sql).fetch_all(db).await
}

/// Quizzes that have something stored as their deadline.
pub async fn fetch_quizzes_with_deadline(db: &SqlitePool) -> Result<Vec<Quiz>, sqlx::Error> {
    let sql = format!(
        "{} WHERE q.expiry_date IS NOT NULL AND q.expiry_date != '' ORDER BY q.id",
        QUIZ_SELECT
    );
    sqlx::query_as::<_, Quiz>(&sql).fetch_all(db).await
}

/// Stores the deadline as entered (trimmed). An empty value clears it.
pub async fn set_quiz_deadline(
    db: &SqlitePool,
    id: i64,
    expiry_date: &str,
) -> Result<Option<Quiz>, sqlx::Error> {
    let trimmed = expiry_date.trim();
    let value = if trimmed.is_empty() { None } else { Some(trimmed) };
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query("UPDATE quizzes SET expiry_date = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(value)
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_quiz_by_id(db, id).await
}

pub async fn grant_access(db: &SqlitePool, course_id: i64, user_id: i64) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO course_access (course_id, user_id, granted_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(course_id, user_id) DO NOTHING",
    )
    .bind(course_id)
    .bind(user_id)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn revoke_access(db: &SqlitePool, course_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM course_access WHERE course_id = ?1 AND user_id = ?2")
        .bind(course_id)
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Access lists per course, in the order users were granted access.
pub async fn fetch_course_access(db: &SqlitePool) -> Result<HashMap<i64, Vec<i64>>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT course_id, user_id FROM course_access ORDER BY course_id, granted_at, user_id",
    )
    .fetch_all(db)
    .await?;

    let mut access: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        let course_id: i64 = row.try_get("course_id")?;
        let user_id: i64 = row.try_get("user_id")?;
        access.entry(course_id).or_default().push(user_id);
    }

    Ok(access)
}

pub async fn mark_complete(db: &SqlitePool, req: &CompletionRequest) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO completions (user_id, kind, item_id, completed_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, kind, item_id) DO NOTHING",
    )
    .bind(req.user_id)
    .bind(req.kind.as_str())
    .bind(req.item_id)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn fetch_completions(db: &SqlitePool) -> Result<Completions, sqlx::Error> {
    let rows = sqlx::query("SELECT user_id, kind, item_id FROM completions")
        .fetch_all(db)
        .await?;

    let mut completions = Completions::default();
    for row in rows {
        let kind: String = row.try_get("kind")?;
        // the CHECK constraint keeps this exhaustive
        let Some(kind) = CompletionKind::parse(&kind) else {
            continue;
        };
        completions.insert(row.try_get("user_id")?, kind, row.try_get("item_id")?);
    }

    Ok(completions)
}

pub async fn fetch_rules(db: &SqlitePool) -> Result<Vec<ReminderRule>, sqlx::Error> {
    let sql = format!("{} ORDER BY created_at, rowid", RULE_SELECT);
    sqlx::query_as::<_, ReminderRule>(&sql).fetch_all(db).await
}

pub async fn find_rule_by_id(db: &SqlitePool, id: &str) -> Result<Option<ReminderRule>, sqlx::Error> {
    let sql = format!("{} WHERE id = ?1", RULE_SELECT);
    sqlx::query_as::<_, ReminderRule>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_rule(db: &SqlitePool, req: ReminderRuleRequest) -> Result<ReminderRule, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO reminder_rules
            (id, title, quiz_expires_days, course_id, lesson_id, topic_id, quiz_id,
            created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
        "#,
    )
    .bind(&id)
    .bind(&req.title)
    .bind(&req.quiz_expires_days)
    .bind(req.course_id)
    .bind(req.lesson_id)
    .bind(req.topic_id)
    .bind(req.quiz_id)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(ReminderRule {
        id,
        title: req.title,
        quiz_expires_days: req.quiz_expires_days,
        course_id: req.course_id,
        lesson_id: req.lesson_id,
        topic_id: req.topic_id,
        quiz_id: req.quiz_id,
    })
}

pub async fn update_rule(
    db: &SqlitePool,
    id: &str,
    req: ReminderRuleRequest,
) -> Result<Option<ReminderRule>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE reminder_rules
        SET title = ?1, quiz_expires_days = ?2, course_id = ?3, lesson_id = ?4,
            topic_id = ?5, quiz_id = ?6, updated_at = ?7
        WHERE id = ?8
        "#,
    )
    .bind(&req.title)
    .bind(&req.quiz_expires_days)
    .bind(req.course_id)
    .bind(req.lesson_id)
    .bind(req.topic_id)
    .bind(req.quiz_id)
    .bind(&now)
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_rule_by_id(db, id).await
}

pub async fn delete_rule(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reminder_rules WHERE id = ?1")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_sent_reminder(
    db: &SqlitePool,
    event: &NotificationEvent,
    reference: NaiveDate,
    delivered: bool,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO sent_reminders
            (id, rule_id, user_id, course_id, lesson_id, topic_id, quiz_id,
            reference_date, delivered, sent_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(&event.rule_id)
    .bind(event.user_id)
    .bind(event.course_id)
    .bind(event.lesson_id)
    .bind(event.topic_id)
    .bind(event.quiz_id)
    .bind(reference.to_string())
    .bind(delivered)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn fetch_sent_reminders(db: &SqlitePool) -> Result<Vec<SentReminder>, sqlx::Error> {
    sqlx::query_as::<_, SentReminder>(
        r#"
        SELECT id, rule_id, user_id, course_id, lesson_id, topic_id, quiz_id,
            reference_date, delivered, sent_at
        FROM sent_reminders
        ORDER BY sent_at DESC
        "#,
    )
    .fetch_all(db)
    .await
}

/// `(rule_id, user_id, quiz_id)` of reminders already delivered for `reference`.
pub async fn fetch_delivered_keys(
    db: &SqlitePool,
    reference: NaiveDate,
) -> Result<HashSet<(String, i64, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT rule_id, user_id, quiz_id FROM sent_reminders WHERE reference_date = ?1 AND delivered = 1",
    )
    .bind(reference.to_string())
    .fetch_all(db)
    .await?;

    let mut keys = HashSet::new();
    for row in rows {
        keys.insert((row.try_get("rule_id")?, row.try_get("user_id")?, row.try_get("quiz_id")?));
    }

    Ok(keys)
}

pub async fn has_run(db: &SqlitePool, job: &str, date: NaiveDate) -> Result<bool, sqlx::Error> {
    let found: Option<String> =
        sqlx::query_scalar("SELECT run_date FROM cron_runs WHERE job = ?1 AND run_date = ?2")
            .bind(job)
            .bind(date.to_string())
            .fetch_optional(db)
            .await?;

    Ok(found.is_some())
}

pub async fn record_run(db: &SqlitePool, job: &str, date: NaiveDate) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO cron_runs (job, run_date, completed_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(job, run_date) DO UPDATE SET completed_at = excluded.completed_at",
    )
    .bind(job)
    .bind(date.to_string())
    .bind(&now)
    .execute(db)
    .await?;

    Ok(())
}
