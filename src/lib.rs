pub mod api;
pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod models;
pub mod notifier;
pub mod services;
pub mod state;
pub mod triggers;
