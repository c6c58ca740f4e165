//! Domain types for operational alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::training::domain::ModelType;

/// Condition class an alert reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Drift,
    Degradation,
    TrainingFailed,
    AbTestCompleted,
}

/// Alert severity; orders active listings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Sort rank, higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

/// One operational alert.
///
/// At most one unresolved alert exists per (machine, model type, alert type);
/// repeats refresh the existing row rather than inserting a new one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub machine_id: String,
    pub model_type: ModelType,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Repository contract for alerts. The dedup-or-insert step must run under a
/// single lock so two concurrent raises cannot both insert.
pub trait AlertRepo: Send + Sync {
    /// Refresh the matching unresolved alert, or insert a new one.
    /// Returns the stored row either way.
    fn upsert_unresolved(&self, alert: Alert) -> CoreResult<Alert>;
    /// Mark resolved; idempotent, returns the effective `resolved_at`.
    fn resolve_alert(&self, id: Uuid) -> CoreResult<DateTime<Utc>>;
    /// Unresolved alerts matching the optional filters, unsorted.
    fn unresolved_alerts(&self, machine_id: Option<&str>, model_type: Option<ModelType>) -> Vec<Alert>;
}
