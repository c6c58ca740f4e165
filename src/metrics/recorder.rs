//! Service recording and reading back performance evaluations.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::common::time;
use crate::store::Store;
use crate::training::domain::ModelType;

use super::domain::{MetricValues, PerformanceMetric};

/// Append-only recorder plus the trend read used for charting and
/// drift/degradation comparisons.
pub struct MetricsRecorder {
    store: Arc<dyn Store>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persist one evaluation for a model version.
    pub fn record(
        &self,
        model_id: Uuid,
        machine_id: &str,
        model_type: ModelType,
        model_version: u32,
        window: (DateTime<Utc>, DateTime<Utc>),
        values: MetricValues,
        drift_detected: bool,
        drift_score: f64,
    ) -> CoreResult<PerformanceMetric> {
        let metric = PerformanceMetric {
            id: Uuid::new_v4(),
            model_id,
            machine_id: machine_id.to_string(),
            model_type,
            model_version,
            evaluation_start: window.0,
            evaluation_end: window.1,
            r_squared: values.r_squared,
            rmse: values.rmse,
            mae: values.mae,
            drift_detected,
            drift_score,
        };
        self.store.insert_metric(metric.clone())?;
        Ok(metric)
    }

    /// Metrics for a pair over the trailing `days`, oldest first.
    pub fn trend(&self, model_type: ModelType, machine_id: &str, days: i64) -> Vec<PerformanceMetric> {
        self.store.metrics_since(model_type, machine_id, time::days_ago(days))
    }

    /// Metrics for a pair between two instants, oldest first.
    pub fn window(
        &self,
        model_type: ModelType,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<PerformanceMetric> {
        self.store
            .metrics_since(model_type, machine_id, start)
            .into_iter()
            .filter(|m| m.evaluation_end <= end)
            .collect()
    }

    /// Every pair with recorded history, used by the retrain sweep.
    pub fn known_pairs(&self) -> Vec<(String, ModelType)> {
        self.store.known_pairs()
    }

    /// Whether a model version has any recorded evaluation.
    pub fn version_exists(&self, machine_id: &str, model_type: ModelType, version: u32) -> bool {
        self.store.has_version(machine_id, model_type, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;

    #[test]
    fn trend_returns_rows_oldest_first() {
        let store = MemStore::shared();
        let recorder = MetricsRecorder::new(store);
        let values = MetricValues { r_squared: 0.9, rmse: 10.0, mae: 7.0 };

        // Recorded newest-first; the trend must still come back ordered.
        for days_back in [1, 5, 3] {
            let end = time::days_ago(days_back);
            recorder
                .record(
                    Uuid::new_v4(),
                    "press-1",
                    ModelType::Baseline,
                    1,
                    (end, end),
                    values,
                    false,
                    0.0,
                )
                .unwrap();
        }

        let rows = recorder.trend(ModelType::Baseline, "press-1", 30);
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].evaluation_end <= w[1].evaluation_end));

        // A tighter window excludes older rows.
        assert_eq!(recorder.trend(ModelType::Baseline, "press-1", 2).len(), 1);
        assert!(recorder.version_exists("press-1", ModelType::Baseline, 1));
        assert!(!recorder.version_exists("press-1", ModelType::Baseline, 2));
        assert_eq!(recorder.known_pairs(), vec![("press-1".to_string(), ModelType::Baseline)]);
    }
}
