use std::env;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{NotificationEvent, ReminderRule};
use crate::triggers::DEADLINE_QUIZ;

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub webhook_url: String,
}

impl NotifierConfig {
    /// `None` when no webhook is configured.
    pub fn new_from_env() -> Option<Self> {
        env::var("REMINDER_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|webhook_url| Self { webhook_url })
    }
}

/// Body posted to the webhook for each reminder.
#[derive(Debug, Serialize)]
pub struct ReminderPayload<'a> {
    pub trigger: &'static str,
    pub rule_title: &'a str,
    pub reference_date: NaiveDate,
    #[serde(flatten)]
    pub event: &'a NotificationEvent,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        rule: &ReminderRule,
        event: &NotificationEvent,
        reference: NaiveDate,
    ) -> Result<(), AppError>;
}

pub struct WebhookNotifier {
    client: Client,
    config: NotifierConfig,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Notify(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(
        &self,
        rule: &ReminderRule,
        event: &NotificationEvent,
        reference: NaiveDate,
    ) -> Result<(), AppError> {
        let payload = ReminderPayload {
            trigger: DEADLINE_QUIZ,
            rule_title: &rule.title,
            reference_date: reference,
            event,
        };

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notify(format!("webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!("webhook returned {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Writes reminders to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(
        &self,
        rule: &ReminderRule,
        event: &NotificationEvent,
        reference: NaiveDate,
    ) -> Result<(), AppError> {
        info!(
            rule = %rule.title,
            user_id = event.user_id,
            course_id = event.course_id,
            quiz_id = event.quiz_id,
            %reference,
            "quiz deadline reminder"
        );
        Ok(())
    }
}
