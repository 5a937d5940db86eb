use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::repository;
use crate::error::AppError;
use crate::notifier::NotificationSink;
use crate::services::reminder_service::{ReminderService, ReminderStats};

pub const DAILY_JOB: &str = "quiz_deadline_daily";

/// Time left until the next `run_hour:00` UTC strictly after `now`.
pub fn delay_until_next_run(now: DateTime<Utc>, run_hour: u32) -> Duration {
    let now = now.naive_utc();
    let today_run = now
        .date()
        .and_hms_opt(run_hour.min(23), 0, 0)
        .unwrap_or_else(|| now.date().and_time(NaiveTime::default()));

    let next_run = if now < today_run {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    };

    (next_run - now).to_std().unwrap_or_default()
}

/// Runs the reminder pass once per calendar day. Every pass, scheduled or
/// manual, goes through [`DailyScheduler::run_if_due`].
pub struct DailyScheduler {
    db: SqlitePool,
    sink: Arc<dyn NotificationSink>,
    run_hour: u32,
    run_lock: Mutex<()>,
}

impl DailyScheduler {
    pub fn new(db: SqlitePool, sink: Arc<dyn NotificationSink>, run_hour: u32) -> Self {
        Self {
            db,
            sink,
            run_hour: run_hour.min(23),
            run_lock: Mutex::new(()),
        }
    }

    pub async fn start(self: Arc<Self>) {
        info!("Starting daily reminder scheduler (run hour: {:02}:00 UTC)", self.run_hour);

        // pick up today's run if the process started after the run hour
        let now = Utc::now();
        if now.hour() >= self.run_hour {
            self.tick(now.date_naive()).await;
        }

        loop {
            let delay = delay_until_next_run(Utc::now(), self.run_hour);
            info!("Next reminder run in {:?}", delay);
            tokio::time::sleep(delay).await;

            self.tick(Utc::now().date_naive()).await;
        }
    }

    async fn tick(&self, today: NaiveDate) {
        match self.run_if_due(today).await {
            Ok(Some(stats)) => {
                info!(
                    "Daily reminders completed - {} events, {} delivered, {} failed",
                    stats.events, stats.delivered, stats.failed
                );
            }
            Ok(None) => info!("Reminders for {} already sent, skipping", today),
            Err(e) => warn!("Daily reminder run failed: {:?}", e),
        }
    }

    /// Runs for `day` unless a run for that day is on record. Passes never
    /// overlap.
    pub async fn run_if_due(&self, day: NaiveDate) -> Result<Option<ReminderStats>, AppError> {
        let _guard = self.run_lock.lock().await;

        if repository::has_run(&self.db, DAILY_JOB, day).await? {
            return Ok(None);
        }

        let service = ReminderService::new(self.db.clone(), self.sink.clone());
        let stats = service.run_for(day).await?;
        repository::record_run(&self.db, DAILY_JOB, day).await?;

        Ok(Some(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, h, m, s).unwrap()
    }

    #[test]
    fn delay_until_next_run_works() {
        assert_eq!(delay_until_next_run(at(0, 0, 0), 0), Duration::from_secs(24 * 3600));
        assert_eq!(delay_until_next_run(at(23, 0, 0), 0), Duration::from_secs(3600));
        assert_eq!(delay_until_next_run(at(5, 30, 0), 6), Duration::from_secs(30 * 60));
        assert_eq!(delay_until_next_run(at(6, 0, 1), 6), Duration::from_secs(24 * 3600 - 1));
        assert_eq!(delay_until_next_run(at(12, 0, 0), 99), Duration::from_secs(11 * 3600));
    }
}
