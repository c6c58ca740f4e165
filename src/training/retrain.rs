//! Automatic retraining decisions: drift and degradation signals.
//!
//! Decides *when* to call the lifecycle manager; the manager itself stays
//! the only component that claims jobs. A per-pair cooldown keeps repeated
//! signals from creating a trigger storm, and is checked before the trigger
//! call regardless of whether a job is currently active.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::drift::detector::DriftDetector;
use crate::metrics::recorder::MetricsRecorder;

use super::domain::{ModelType, TriggerType};
use super::service::JobLifecycleManager;

type Pair = (String, ModelType);

pub struct RetrainTrigger {
    lifecycle: Arc<JobLifecycleManager>,
    detector: Arc<DriftDetector>,
    metrics: Arc<MetricsRecorder>,
    cooldown_secs: i64,
    /// Latest metric must be this fraction worse than the rolling baseline.
    degradation_threshold: f64,
    /// Days of history the degradation baseline averages over.
    baseline_days: i64,
    last_fired: DashMap<Pair, DateTime<Utc>>,
}

impl RetrainTrigger {
    pub fn new(
        lifecycle: Arc<JobLifecycleManager>,
        detector: Arc<DriftDetector>,
        metrics: Arc<MetricsRecorder>,
        cooldown_secs: i64,
        degradation_threshold: f64,
        baseline_days: i64,
    ) -> Self {
        Self {
            lifecycle,
            detector,
            metrics,
            cooldown_secs,
            degradation_threshold,
            baseline_days,
            last_fired: DashMap::new(),
        }
    }

    /// Evaluate one pair and trigger retraining when a signal fires.
    /// Returns the trigger type used, if any.
    pub fn evaluate(&self, machine_id: &str, model_type: ModelType) -> Option<TriggerType> {
        let key = (machine_id.to_string(), model_type);
        if let Some(fired) = self.last_fired.get(&key) {
            if crate::common::time::now() - *fired < Duration::seconds(self.cooldown_secs) {
                debug!(machine_id, model_type = model_type.as_str(), "retrain signal inside cooldown");
                return None;
            }
        }

        let trigger_type = self.signal(machine_id, model_type)?;

        // Record the attempt before calling trigger so a refused duplicate
        // still consumes the cooldown window.
        self.last_fired.insert(key, crate::common::time::now());
        let reason = match trigger_type {
            TriggerType::Drift => "drift detected",
            _ => "performance degradation",
        };
        info!(machine_id, model_type = model_type.as_str(), reason, "automatic retrain");
        match self
            .lifecycle
            .trigger(model_type, machine_id, trigger_type, Some(reason.to_string()))
        {
            Ok(outcome) if outcome.triggered => Some(trigger_type),
            Ok(_) => {
                debug!(machine_id, "retrain suppressed, job already active");
                Some(trigger_type)
            }
            Err(err) => {
                tracing::error!(%err, machine_id, "automatic retrain trigger failed");
                None
            }
        }
    }

    fn signal(&self, machine_id: &str, model_type: ModelType) -> Option<TriggerType> {
        let report = self.detector.check(model_type, machine_id);
        if report.drift_detected {
            return Some(TriggerType::Drift);
        }

        let history = self.metrics.trend(model_type, machine_id, self.baseline_days);
        let (latest, baseline) = history.split_last().map(|(l, rest)| (l, rest))?;
        if baseline.is_empty() {
            return None;
        }
        let baseline_rmse = baseline.iter().map(|m| m.rmse).sum::<f64>() / baseline.len() as f64;
        if baseline_rmse > f64::EPSILON && latest.rmse > baseline_rmse * (1.0 + self.degradation_threshold) {
            return Some(TriggerType::Degradation);
        }
        None
    }

    /// Evaluate every pair with recorded history. Driven by a fixed-interval
    /// background task; manual and scheduled triggers go through the API.
    pub fn sweep(&self) -> usize {
        let mut fired = 0usize;
        for (machine_id, model_type) in self.metrics.known_pairs() {
            if self.evaluate(&machine_id, model_type).is_some() {
                fired += 1;
            }
        }
        fired
    }
}
