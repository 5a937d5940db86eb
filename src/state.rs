use std::sync::Arc;

use sqlx::SqlitePool;

use crate::notifier::NotificationSink;
use crate::services::DailyScheduler;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sink: Arc<dyn NotificationSink>,
    pub scheduler: Arc<DailyScheduler>,
}
