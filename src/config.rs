use std::env;
use std::net::SocketAddr;

use crate::error::AppError;
use crate::notifier::NotifierConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Hour of day (UTC) the reminder pass runs at.
    pub run_hour: u32,
    pub notifier: Option<NotifierConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quiz_deadline.db?mode=rwc".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|e| AppError::BadRequest(format!("BIND_ADDR is invalid: {}", e)))?;

        let run_hour = match env::var("REMINDER_RUN_HOUR") {
            Ok(raw) => parse_run_hour(&raw)?,
            Err(_) => 0,
        };

        Ok(Self {
            database_url,
            bind_addr,
            run_hour,
            notifier: NotifierConfig::new_from_env(),
        })
    }
}

fn parse_run_hour(raw: &str) -> Result<u32, AppError> {
    match raw.trim().parse::<u32>() {
        Ok(hour) if hour < 24 => Ok(hour),
        _ => Err(AppError::BadRequest(format!(
            "REMINDER_RUN_HOUR must be 0-23, got {:?}",
            raw
        ))),
    }
}
