pub mod reminder_service;
pub mod scheduler;

pub use reminder_service::{ReminderPreview, ReminderService, ReminderStats};
pub use scheduler::{DailyScheduler, delay_until_next_run};
