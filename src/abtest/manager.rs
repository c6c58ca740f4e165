//! A/B test orchestration: start, sticky routing, results, finalisation.
//!
//! This component only reports a winner. Promoting the winning version into
//! production serving is a separate, explicitly authorised operation that
//! does not exist in this crate.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::alerts::domain::{AlertType, Severity};
use crate::alerts::manager::AlertManager;
use crate::common::error::{CoreError, CoreResult};
use crate::common::ids::StickyHash;
use crate::common::time;
use crate::metrics::domain::PerformanceMetric;
use crate::metrics::recorder::MetricsRecorder;
use crate::store::Store;
use crate::training::domain::ModelType;

use super::domain::{ABTest, AbStatus, Variant, Winner};

/// Aggregated view returned by `results`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AbResults {
    pub status: AbStatus,
    pub winner: Option<Winner>,
    pub results: serde_json::Value,
}

/// Owns every A/B test for its running window.
pub struct ABTestManager {
    store: Arc<dyn Store>,
    metrics: Arc<MetricsRecorder>,
    alerts: Arc<AlertManager>,
    min_samples: usize,
    confidence_margin: f64,
}

impl ABTestManager {
    pub fn new(
        store: Arc<dyn Store>,
        metrics: Arc<MetricsRecorder>,
        alerts: Arc<AlertManager>,
        min_samples: usize,
        confidence_margin: f64,
    ) -> Self {
        Self {
            store,
            metrics,
            alerts,
            min_samples,
            confidence_margin,
        }
    }

    /// Start a timed comparison. Rejects bad split ratios, unknown versions
    /// and a second running test for the same pair.
    pub fn start(
        &self,
        model_a_version: u32,
        model_b_version: u32,
        machine_id: &str,
        model_type: ModelType,
        split_ratio: f64,
        duration_secs: i64,
    ) -> CoreResult<Uuid> {
        if !(split_ratio > 0.0 && split_ratio < 1.0) {
            return Err(CoreError::validation("split_ratio must be in (0, 1)"));
        }
        if duration_secs <= 0 {
            return Err(CoreError::validation("duration must be positive"));
        }
        if model_a_version == model_b_version {
            return Err(CoreError::validation("variants must be distinct versions"));
        }
        for version in [model_a_version, model_b_version] {
            if !self.version_exists(machine_id, model_type, version) {
                return Err(CoreError::validation(format!(
                    "model version {version} does not exist for {machine_id}/{}",
                    model_type.as_str()
                )));
            }
        }

        let now = time::now();
        let test = ABTest {
            id: Uuid::new_v4(),
            model_a_version,
            model_b_version,
            machine_id: machine_id.to_string(),
            model_type,
            split_ratio,
            start_time: now,
            end_time: now + Duration::seconds(duration_secs),
            status: AbStatus::Running,
            winner: None,
            results: None,
        };
        let test = self.store.claim_running(test)?;
        info!(test_id = %test.id, machine_id, model_type = model_type.as_str(), "ab test started");
        Ok(test.id)
    }

    /// Deterministic, sticky variant assignment for the pair's running test.
    /// The same machine routes to the same variant for the life of the test.
    pub fn route(&self, machine_id: &str, model_type: ModelType) -> CoreResult<Variant> {
        let test = self
            .store
            .running_for_pair(machine_id, model_type)
            .ok_or_else(|| CoreError::not_found("no running ab test for pair"))?;
        Ok(Self::assign(&test, machine_id, model_type))
    }

    fn assign(test: &ABTest, machine_id: &str, model_type: ModelType) -> Variant {
        let mut hash = StickyHash::new();
        hash.update(machine_id.as_bytes());
        hash.update(model_type.as_str().as_bytes());
        hash.update(test.id.as_bytes());
        if hash.unit_interval() < test.split_ratio {
            Variant::A
        } else {
            Variant::B
        }
    }

    /// Aggregate per-variant metrics and compare the primary metric.
    /// Completed tests return their stored outcome unchanged.
    pub fn results(&self, test_id: Uuid) -> CoreResult<AbResults> {
        let test = self.store.get_ab_test(test_id)?;
        if test.status == AbStatus::Completed {
            return Ok(AbResults {
                status: test.status,
                winner: test.winner,
                results: test.results.unwrap_or_default(),
            });
        }
        let (winner, results) = self.compute(&test);
        Ok(AbResults {
            status: AbStatus::Running,
            winner,
            results,
        })
    }

    /// Complete every running test whose duration has elapsed. Returns the
    /// number finalised. Invoked by the reconciliation sweep.
    pub fn finalize_due(&self) -> usize {
        let now = time::now();
        let mut finalised = 0usize;
        for test in self.store.running_tests() {
            if test.end_time > now {
                continue;
            }
            if let Err(err) = self.finalize(test) {
                tracing::error!(%err, "ab test finalisation failed");
            } else {
                finalised += 1;
            }
        }
        finalised
    }

    fn finalize(&self, mut test: ABTest) -> CoreResult<()> {
        let (winner, results) = self.compute(&test);
        let winner = winner.unwrap_or(Winner::Inconclusive);
        test.status = AbStatus::Completed;
        test.winner = Some(winner);
        test.results = Some(results.clone());
        self.store.update_ab_test(&test)?;
        info!(test_id = %test.id, ?winner, "ab test completed");
        self.alerts.raise(
            AlertType::AbTestCompleted,
            Severity::Warning,
            &test.machine_id,
            test.model_type,
            format!("A/B test completed, winner: {winner:?}"),
            serde_json::json!({ "test_id": test.id, "winner": winner, "results": results }),
        )?;
        Ok(())
    }

    fn compute(&self, test: &ABTest) -> (Option<Winner>, serde_json::Value) {
        let window_end = test.end_time.min(time::now());
        let metrics =
            self.metrics
                .window(test.model_type, &test.machine_id, test.start_time, window_end);
        let a: Vec<&PerformanceMetric> = metrics
            .iter()
            .filter(|m| m.model_version == test.model_a_version)
            .collect();
        let b: Vec<&PerformanceMetric> = metrics
            .iter()
            .filter(|m| m.model_version == test.model_b_version)
            .collect();

        let mean = |rows: &[&PerformanceMetric]| {
            if rows.is_empty() {
                None
            } else {
                Some(rows.iter().map(|m| m.r_squared).sum::<f64>() / rows.len() as f64)
            }
        };
        let (mean_a, mean_b) = (mean(&a), mean(&b));

        let winner = match (mean_a, mean_b) {
            (Some(ma), Some(mb)) if a.len() >= self.min_samples && b.len() >= self.min_samples => {
                if (ma - mb).abs() <= self.confidence_margin {
                    Some(Winner::Inconclusive)
                } else if ma > mb {
                    Some(Winner::A)
                } else {
                    Some(Winner::B)
                }
            }
            _ => None,
        };

        let results = serde_json::json!({
            "primary_metric": "r_squared",
            "confidence_margin": self.confidence_margin,
            "min_samples": self.min_samples,
            "model_a": {
                "version": test.model_a_version,
                "samples": a.len(),
                "mean_r_squared": mean_a,
            },
            "model_b": {
                "version": test.model_b_version,
                "samples": b.len(),
                "mean_r_squared": mean_b,
            },
        });
        (winner, results)
    }

    fn version_exists(&self, machine_id: &str, model_type: ModelType, version: u32) -> bool {
        version >= 1
            && (version <= self.store.latest_model_version(machine_id, model_type)
                || self.metrics.version_exists(machine_id, model_type, version))
    }
}
