//! Alerting domain: raising, deduplicating and resolving operational alerts.

pub mod domain;
pub mod manager;

pub use domain::{Alert, AlertType, Severity};
pub use manager::AlertManager;
