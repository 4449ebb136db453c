pub mod config;
pub mod error;
pub mod mailbox;
pub mod pdf;
pub mod telemetry;
pub mod workflows;
