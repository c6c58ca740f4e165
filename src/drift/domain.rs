//! Drift report type and the pluggable scoring strategy.

use serde::{Deserialize, Serialize};

use crate::metrics::domain::PerformanceMetric;

/// Outcome of one drift check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub drift_score: f64,
    pub details: serde_json::Value,
}

impl DriftReport {
    /// Report used when there is not enough history to score.
    pub fn insufficient(reason: &str) -> Self {
        Self {
            drift_detected: false,
            drift_score: 0.0,
            details: serde_json::json!({ "reason": reason }),
        }
    }
}

/// Pluggable drift statistic.
///
/// The detector splits a pair's metric history into a baseline window and a
/// recent window and hands both here; the statistic itself is injectable and
/// deliberately not prescribed by this crate.
pub trait DriftStrategy: Send + Sync {
    /// Score recent against baseline; `None` when there is too little data.
    fn score(&self, recent: &[PerformanceMetric], baseline: &[PerformanceMetric]) -> Option<f64>;
    /// Score at or above which drift is reported.
    fn threshold(&self) -> f64;
}

/// Default strategy: ratio of recent mean RMSE to baseline mean RMSE.
///
/// A ratio of 1.0 means the model errs exactly as it did at training time;
/// the default threshold flags a 25% error inflation.
pub struct ErrorRatioStrategy {
    pub min_samples: usize,
    pub threshold: f64,
}

impl Default for ErrorRatioStrategy {
    fn default() -> Self {
        Self {
            min_samples: 3,
            threshold: 1.25,
        }
    }
}

fn mean_rmse(metrics: &[PerformanceMetric]) -> f64 {
    metrics.iter().map(|m| m.rmse).sum::<f64>() / metrics.len() as f64
}

impl DriftStrategy for ErrorRatioStrategy {
    fn score(&self, recent: &[PerformanceMetric], baseline: &[PerformanceMetric]) -> Option<f64> {
        if recent.len() < self.min_samples || baseline.len() < self.min_samples {
            return None;
        }
        let base = mean_rmse(baseline);
        if base <= f64::EPSILON {
            return None;
        }
        Some(mean_rmse(recent) / base)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time;
    use crate::training::domain::ModelType;
    use uuid::Uuid;

    fn metric(rmse: f64) -> PerformanceMetric {
        PerformanceMetric {
            id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            machine_id: "press-1".into(),
            model_type: ModelType::Baseline,
            model_version: 1,
            evaluation_start: time::now(),
            evaluation_end: time::now(),
            r_squared: 0.9,
            rmse,
            mae: rmse * 0.7,
            drift_detected: false,
            drift_score: 0.0,
        }
    }

    #[test]
    fn ratio_reflects_error_inflation() {
        let strategy = ErrorRatioStrategy::default();
        let baseline: Vec<_> = (0..4).map(|_| metric(10.0)).collect();
        let recent: Vec<_> = (0..4).map(|_| metric(15.0)).collect();
        let score = strategy.score(&recent, &baseline).unwrap();
        assert!((score - 1.5).abs() < 1e-9);
        assert!(score >= strategy.threshold());
    }

    #[test]
    fn too_little_history_scores_none() {
        let strategy = ErrorRatioStrategy::default();
        let baseline = vec![metric(10.0)];
        let recent: Vec<_> = (0..4).map(|_| metric(15.0)).collect();
        assert!(strategy.score(&recent, &baseline).is_none());
    }
}
