//! Read-only drift checks over recorded metric history.

use std::sync::Arc;

use crate::metrics::recorder::MetricsRecorder;
use crate::training::domain::ModelType;

use super::domain::{DriftReport, DriftStrategy};

/// Compares recent operating data to training-time data and reports a score.
///
/// Pure read path: never mutates state and never triggers retraining itself —
/// acting on the report is the retrain trigger's job.
pub struct DriftDetector {
    metrics: Arc<MetricsRecorder>,
    strategy: Arc<dyn DriftStrategy>,
    /// Days of history the check looks at in total.
    window_days: i64,
    /// Trailing days treated as "recent"; the rest form the baseline.
    recent_days: i64,
}

impl DriftDetector {
    pub fn new(metrics: Arc<MetricsRecorder>, strategy: Arc<dyn DriftStrategy>) -> Self {
        Self {
            metrics,
            strategy,
            window_days: 30,
            recent_days: 7,
        }
    }

    pub fn with_windows(mut self, window_days: i64, recent_days: i64) -> Self {
        self.window_days = window_days;
        self.recent_days = recent_days;
        self
    }

    /// Run one drift check for a pair.
    pub fn check(&self, model_type: ModelType, machine_id: &str) -> DriftReport {
        let history = self.metrics.trend(model_type, machine_id, self.window_days);
        if history.is_empty() {
            return DriftReport::insufficient("no metric history");
        }

        let cutoff = crate::common::time::days_ago(self.recent_days);
        let (baseline, recent): (Vec<_>, Vec<_>) =
            history.into_iter().partition(|m| m.evaluation_end < cutoff);

        match self.strategy.score(&recent, &baseline) {
            None => DriftReport::insufficient("not enough samples in window"),
            Some(score) => DriftReport {
                drift_detected: score >= self.strategy.threshold(),
                drift_score: score,
                details: serde_json::json!({
                    "baseline_samples": baseline.len(),
                    "recent_samples": recent.len(),
                    "threshold": self.strategy.threshold(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::domain::PerformanceMetric;

    /// Strategy with a canned score, for exercising the detector shell.
    struct Fixed(f64);

    impl DriftStrategy for Fixed {
        fn score(&self, recent: &[PerformanceMetric], baseline: &[PerformanceMetric]) -> Option<f64> {
            if recent.is_empty() && baseline.is_empty() {
                None
            } else {
                Some(self.0)
            }
        }
        fn threshold(&self) -> f64 {
            1.0
        }
    }

    #[test]
    fn empty_history_reports_no_drift() {
        let store = crate::store::mem::MemStore::shared();
        let metrics = Arc::new(MetricsRecorder::new(store));
        let detector = DriftDetector::new(metrics, Arc::new(Fixed(9.0)));
        let report = detector.check(ModelType::Baseline, "press-1");
        assert!(!report.drift_detected);
        assert_eq!(report.drift_score, 0.0);
    }

    #[test]
    fn score_at_threshold_flags_drift() {
        let store = crate::store::mem::MemStore::shared();
        let metrics = Arc::new(MetricsRecorder::new(store.clone()));
        metrics
            .record(
                uuid::Uuid::new_v4(),
                "press-1",
                ModelType::Baseline,
                1,
                (crate::common::time::days_ago(1), crate::common::time::now()),
                crate::metrics::domain::MetricValues { r_squared: 0.9, rmse: 10.0, mae: 7.0 },
                false,
                0.0,
            )
            .unwrap();
        let detector = DriftDetector::new(metrics, Arc::new(Fixed(1.5)));
        let report = detector.check(ModelType::Baseline, "press-1");
        assert!(report.drift_detected);
        assert_eq!(report.drift_score, 1.5);
    }
}
