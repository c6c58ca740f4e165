//! In-memory store. Single-instance only.
//!
//! The "one active job per pair" and "one running test per pair" invariants
//! are enforced here with occupancy of a keyed slot, taken atomically via the
//! map's entry API. Services never do a read-then-write check of their own.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::abtest::domain::{ABTest, AbStatus, AbTestRepo};
use crate::alerts::domain::{Alert, AlertRepo};
use crate::common::error::{CoreError, CoreResult};
use crate::common::time;
use crate::metrics::domain::{MetricRepo, PerformanceMetric};
use crate::training::domain::{JobRepo, ModelType, TrainingJob};

use super::Store;

type Pair = (String, ModelType);

#[derive(Default)]
pub struct MemStore {
    jobs: DashMap<Uuid, TrainingJob>,
    /// Occupied entry = the pair's active-job uniqueness constraint.
    active_jobs: DashMap<Pair, Uuid>,
    versions: DashMap<Pair, u32>,
    metrics: RwLock<Vec<PerformanceMetric>>,
    tests: DashMap<Uuid, ABTest>,
    running_tests: DashMap<Pair, Uuid>,
    alerts: RwLock<Vec<Alert>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn Store> {
        Arc::new(Self::new())
    }
}

impl JobRepo for MemStore {
    fn claim_job(&self, job: TrainingJob) -> CoreResult<TrainingJob> {
        let key = (job.machine_id.clone(), job.model_type);
        match self.active_jobs.entry(key) {
            Entry::Occupied(_) => Err(CoreError::conflict("Training already in progress")),
            Entry::Vacant(slot) => {
                slot.insert(job.id);
                self.jobs.insert(job.id, job.clone());
                Ok(job)
            }
        }
    }

    fn update_job(&self, job: &TrainingJob) -> CoreResult<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(mut slot) => {
                // Terminal rows are final. A reclaimed job's original worker
                // may still be running; its late writes land here and die.
                if !slot.get().status.is_active() {
                    return Err(CoreError::conflict("job already in a terminal state"));
                }
                slot.insert(job.clone());
            }
            Entry::Vacant(_) => return Err(CoreError::not_found(format!("training job {}", job.id))),
        }
        if !job.status.is_active() {
            let key = (job.machine_id.clone(), job.model_type);
            self.active_jobs.remove_if(&key, |_, held| *held == job.id);
        }
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> CoreResult<TrainingJob> {
        self.jobs
            .get(&id)
            .map(|j| j.clone())
            .ok_or_else(|| CoreError::not_found(format!("training job {id}")))
    }

    fn active_jobs(&self) -> Vec<TrainingJob> {
        self.active_jobs
            .iter()
            .filter_map(|e| self.jobs.get(e.value()).map(|j| j.clone()))
            .collect()
    }

    fn next_model_version(&self, machine_id: &str, model_type: ModelType) -> u32 {
        let mut slot = self
            .versions
            .entry((machine_id.to_string(), model_type))
            .or_insert(0);
        *slot += 1;
        *slot
    }

    fn latest_model_version(&self, machine_id: &str, model_type: ModelType) -> u32 {
        self.versions
            .get(&(machine_id.to_string(), model_type))
            .map(|v| *v)
            .unwrap_or(0)
    }
}

impl MetricRepo for MemStore {
    fn insert_metric(&self, metric: PerformanceMetric) -> CoreResult<()> {
        self.metrics.write().push(metric);
        Ok(())
    }

    fn metrics_since(&self, model_type: ModelType, machine_id: &str, since: DateTime<Utc>) -> Vec<PerformanceMetric> {
        let mut rows: Vec<PerformanceMetric> = self
            .metrics
            .read()
            .iter()
            .filter(|m| m.model_type == model_type && m.machine_id == machine_id && m.evaluation_end >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.evaluation_end.cmp(&b.evaluation_end));
        rows
    }

    fn known_pairs(&self) -> Vec<(String, ModelType)> {
        let mut pairs = BTreeSet::new();
        for m in self.metrics.read().iter() {
            pairs.insert((m.machine_id.clone(), m.model_type));
        }
        pairs.into_iter().collect()
    }

    fn has_version(&self, machine_id: &str, model_type: ModelType, model_version: u32) -> bool {
        self.metrics
            .read()
            .iter()
            .any(|m| m.machine_id == machine_id && m.model_type == model_type && m.model_version == model_version)
    }
}

impl AbTestRepo for MemStore {
    fn claim_running(&self, test: ABTest) -> CoreResult<ABTest> {
        let key = (test.machine_id.clone(), test.model_type);
        match self.running_tests.entry(key) {
            Entry::Occupied(_) => Err(CoreError::conflict("an A/B test is already running for this pair")),
            Entry::Vacant(slot) => {
                slot.insert(test.id);
                self.tests.insert(test.id, test.clone());
                Ok(test)
            }
        }
    }

    fn update_ab_test(&self, test: &ABTest) -> CoreResult<()> {
        self.tests.insert(test.id, test.clone());
        if test.status == AbStatus::Completed {
            let key = (test.machine_id.clone(), test.model_type);
            self.running_tests.remove_if(&key, |_, held| *held == test.id);
        }
        Ok(())
    }

    fn get_ab_test(&self, id: Uuid) -> CoreResult<ABTest> {
        self.tests
            .get(&id)
            .map(|t| t.clone())
            .ok_or_else(|| CoreError::not_found(format!("ab test {id}")))
    }

    fn running_for_pair(&self, machine_id: &str, model_type: ModelType) -> Option<ABTest> {
        self.running_tests
            .get(&(machine_id.to_string(), model_type))
            .and_then(|id| self.tests.get(&id).map(|t| t.clone()))
    }

    fn running_tests(&self) -> Vec<ABTest> {
        self.running_tests
            .iter()
            .filter_map(|e| self.tests.get(e.value()).map(|t| t.clone()))
            .collect()
    }
}

impl AlertRepo for MemStore {
    fn upsert_unresolved(&self, alert: Alert) -> CoreResult<Alert> {
        let mut alerts = self.alerts.write();
        if let Some(existing) = alerts.iter_mut().find(|a| {
            a.resolved_at.is_none()
                && a.machine_id == alert.machine_id
                && a.model_type == alert.model_type
                && a.alert_type == alert.alert_type
        }) {
            // Repeats refresh the row instead of duplicating it.
            existing.created_at = alert.created_at;
            existing.severity = alert.severity;
            existing.message = alert.message;
            existing.details = alert.details;
            return Ok(existing.clone());
        }
        alerts.push(alert.clone());
        Ok(alert)
    }

    fn resolve_alert(&self, id: Uuid) -> CoreResult<DateTime<Utc>> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CoreError::not_found(format!("alert {id}")))?;
        if let Some(resolved) = alert.resolved_at {
            return Ok(resolved);
        }
        let resolved = time::now().max(alert.created_at);
        alert.resolved_at = Some(resolved);
        Ok(resolved)
    }

    fn unresolved_alerts(&self, machine_id: Option<&str>, model_type: Option<ModelType>) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| a.resolved_at.is_none())
            .filter(|a| machine_id.map_or(true, |m| a.machine_id == m))
            .filter(|a| model_type.map_or(true, |t| a.model_type == t))
            .cloned()
            .collect()
    }
}
