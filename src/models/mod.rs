pub mod progress;
pub mod quiz;
pub mod rule;

pub use progress::{CompletionKind, CompletionRequest, GrantAccessRequest};
pub use quiz::{Quiz, SetDeadlineRequest, StepKind, UpsertQuizRequest, UpsertStepRequest};
pub use rule::{NotificationEvent, ReminderRule, ReminderRuleRequest, SentReminder};
