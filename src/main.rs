use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_deadline::api::router;
use quiz_deadline::config::AppConfig;
use quiz_deadline::notifier::{LogNotifier, NotificationSink, WebhookNotifier};
use quiz_deadline::services::DailyScheduler;
use quiz_deadline::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "quiz_deadline=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let sink: Arc<dyn NotificationSink> = match config.notifier.clone() {
        Some(notifier) => {
            info!("delivering reminders to {}", notifier.webhook_url);
            Arc::new(WebhookNotifier::new(notifier)?)
        }
        None => {
            info!("REMINDER_WEBHOOK_URL not set, reminders will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let scheduler = Arc::new(DailyScheduler::new(pool.clone(), sink.clone(), config.run_hour));
    tokio::spawn(scheduler.clone().start());

    let state = AppState {
        db: pool.clone(),
        sink,
        scheduler,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
