//! Domain types for model performance evaluations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::training::domain::ModelType;

/// Accuracy figures captured by one evaluation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MetricValues {
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// One evaluation of a model version over a time window.
///
/// Immutable once written; rows are produced on job completion and by the
/// periodic evaluation sweep, never updated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub id: Uuid,
    /// Originating training job, or the ad-hoc evaluation that produced it.
    pub model_id: Uuid,
    pub machine_id: String,
    pub model_type: ModelType,
    pub model_version: u32,
    pub evaluation_start: DateTime<Utc>,
    pub evaluation_end: DateTime<Utc>,
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
    pub drift_detected: bool,
    pub drift_score: f64,
}

/// Repository contract for performance metrics. Append-only.
pub trait MetricRepo: Send + Sync {
    fn insert_metric(&self, metric: PerformanceMetric) -> CoreResult<()>;
    /// Metrics for a pair with `evaluation_end` at or after `since`,
    /// ordered by `evaluation_end` ascending.
    fn metrics_since(&self, model_type: ModelType, machine_id: &str, since: DateTime<Utc>) -> Vec<PerformanceMetric>;
    /// Every (machine, model type) pair that has at least one metric.
    fn known_pairs(&self) -> Vec<(String, ModelType)>;
    /// Whether any metric exists for the given model version of a pair.
    fn has_version(&self, machine_id: &str, model_type: ModelType, model_version: u32) -> bool;
}
