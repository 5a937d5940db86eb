use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{delete, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::db::repository;
use crate::error::AppError;
use crate::models::*;
use crate::services::{ReminderPreview, ReminderService, ReminderStats};
use crate::state::AppState;
use crate::triggers::{self, Registry};

#[derive(Deserialize)]
struct RunQueryParams {
    date: Option<String>,
}

impl RunQueryParams {
    fn reference_date(&self) -> Result<NaiveDate, AppError> {
        match self.date.as_deref() {
            None => Ok(Utc::now().date_naive()),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(format!("date must be YYYY-MM-DD, got {:?}", raw))),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/triggers", get(list_triggers))
        .route("/steps", post(upsert_step))
        .route("/quizzes", get(list_quizzes).post(upsert_quiz))
        .route("/quizzes/{id}/deadline", put(set_deadline))
        .route("/courses/{id}/access", post(grant_access))
        .route("/courses/{id}/access/{user_id}", delete(revoke_access))
        .route("/completions", post(mark_complete))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{id}", put(update_rule).delete(delete_rule))
        .route("/reminders/preview", get(preview_reminders))
        .route("/reminders/run", post(run_reminders))
        .route("/reminders/sent", get(list_sent_reminders))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_triggers() -> Json<Registry> {
    Json(triggers::registry())
}

async fn upsert_step(
    State(state): State<AppState>,
    Json(req): Json<UpsertStepRequest>,
) -> Result<StatusCode, AppError> {
    if req.kind == StepKind::Topic && req.parent_lesson_id.is_none() {
        return Err(AppError::BadRequest("a topic needs parent_lesson_id".to_string()));
    }
    repository::upsert_step(&state.db, &req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_quizzes(State(state): State<AppState>) -> Result<Json<Vec<Quiz>>, AppError> {
    let quizzes = repository::fetch_quizzes(&state.db).await?;
    Ok(Json(quizzes))
}

async fn upsert_quiz(
    State(state): State<AppState>,
    Json(req): Json<UpsertQuizRequest>,
) -> Result<Json<Quiz>, AppError> {
    let quiz = repository::upsert_quiz(&state.db, &req).await?;
    Ok(Json(quiz))
}

async fn set_deadline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetDeadlineRequest>,
) -> Result<Json<Quiz>, AppError> {
    let quiz = repository::set_quiz_deadline(&state.db, id, &req.expiry_date)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(quiz))
}

async fn grant_access(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
    Json(req): Json<GrantAccessRequest>,
) -> Result<StatusCode, AppError> {
    repository::grant_access(&state.db, course_id, req.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_access(
    State(state): State<AppState>,
    Path((course_id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let ok = repository::revoke_access(&state.db, course_id, user_id).await?;
    if ok {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn mark_complete(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> Result<StatusCode, AppError> {
    repository::mark_complete(&state.db, &req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_rules(State(state): State<AppState>) -> Result<Json<Vec<ReminderRule>>, AppError> {
    let rules = repository::fetch_rules(&state.db).await?;
    Ok(Json(rules))
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<ReminderRuleRequest>,
) -> Result<Json<ReminderRule>, AppError> {
    let rule = repository::insert_rule(&state.db, req).await?;
    Ok(Json(rule))
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReminderRuleRequest>,
) -> Result<Json<ReminderRule>, AppError> {
    let rule = repository::update_rule(&state.db, &id, req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let ok = repository::delete_rule(&state.db, &id).await?;
    if ok {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

async fn preview_reminders(
    State(state): State<AppState>,
    Query(params): Query<RunQueryParams>,
) -> Result<Json<ReminderPreview>, AppError> {
    let reference = params.reference_date()?;
    let service = ReminderService::new(state.db.clone(), state.sink.clone());
    let preview = service.preview(reference).await?;
    Ok(Json(preview))
}

async fn run_reminders(
    State(state): State<AppState>,
    Query(params): Query<RunQueryParams>,
) -> Result<Json<ReminderStats>, AppError> {
    let reference = params.reference_date()?;
    let stats = state
        .scheduler
        .run_if_due(reference)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("reminders for {} already ran", reference)))?;
    Ok(Json(stats))
}

async fn list_sent_reminders(
    State(state): State<AppState>,
) -> Result<Json<Vec<SentReminder>>, AppError> {
    let sent = repository::fetch_sent_reminders(&state.db).await?;
    Ok(Json(sent))
}
