//! Domain types for training jobs and the trainer capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::common::ids::StickyHash;
use crate::common::time;

/// Supported model families defined by the product roadmap.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Regression of expected consumption from operating conditions.
    Baseline,
    /// Detector flagging consumption outside the expected envelope.
    Anomaly,
    /// Short-term consumption forecaster.
    Forecast,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Baseline => "baseline",
            ModelType::Anomaly => "anomaly",
            ModelType::Forecast => "forecast",
        }
    }
}

/// What caused a training job to be created.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Drift,
    Degradation,
}

/// Lifecycle state of a training job.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Pending and running jobs hold the active slot for their pair.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// One (re)training run for a (machine, model type) pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: Uuid,
    pub model_type: ModelType,
    pub machine_id: String,
    pub trigger_type: TriggerType,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub model_version: Option<u32>,
    pub error_message: Option<String>,
}

impl TrainingJob {
    /// Create a pending job claiming the pair's active slot.
    pub fn pending(model_type: ModelType, machine_id: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_type,
            machine_id: machine_id.into(),
            trigger_type,
            status: JobStatus::Pending,
            start_time: time::now(),
            end_time: None,
            model_version: None,
            error_message: None,
        }
    }
}

/// Trained-model quality metrics reported by a trainer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// Progress callback handed to trainers; argument is percent complete.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Capability performing the actual statistical model fit.
///
/// The regression/anomaly/forecasting math is out of scope for this crate;
/// the lifecycle manager depends only on this seam.
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn run(&self, machine_id: &str, model_type: ModelType, progress: ProgressFn<'_>) -> CoreResult<TrainedModel>;
}

/// Deterministic trainer used by the default binary and the test suite.
pub struct StubTrainer;

#[async_trait]
impl Trainer for StubTrainer {
    async fn run(&self, machine_id: &str, model_type: ModelType, progress: ProgressFn<'_>) -> CoreResult<TrainedModel> {
        progress(50);
        let mut h = StickyHash::new();
        h.update(machine_id.as_bytes());
        h.update(model_type.as_str().as_bytes());
        let jitter = h.unit_interval() * 0.1;
        Ok(TrainedModel {
            r_squared: 0.85 + jitter,
            rmse: 12.0 - jitter * 10.0,
            mae: 8.0 - jitter * 5.0,
        })
    }
}

/// Repository contract for training jobs.
///
/// `claim_job` must be atomic with respect to concurrent callers: the
/// "one active job per pair" invariant lives at the data layer, not in a
/// read-then-write in the services above it.
pub trait JobRepo: Send + Sync {
    /// Insert a pending job iff no active job exists for its pair.
    fn claim_job(&self, job: TrainingJob) -> CoreResult<TrainingJob>;
    /// Persist a job update; terminal states release the pair's slot.
    /// Rejects with a conflict once the stored row is terminal, so a job
    /// reclaimed by reconciliation cannot be resurrected by a late worker.
    fn update_job(&self, job: &TrainingJob) -> CoreResult<()>;
    fn get_job(&self, id: Uuid) -> CoreResult<TrainingJob>;
    /// All jobs currently holding an active slot.
    fn active_jobs(&self) -> Vec<TrainingJob>;
    /// Allocate the next model version for a pair.
    fn next_model_version(&self, machine_id: &str, model_type: ModelType) -> u32;
    /// Highest version allocated so far for a pair, zero if none.
    fn latest_model_version(&self, machine_id: &str, model_type: ModelType) -> u32;
}
