//! Job lifecycle orchestration: trigger, background execution, reconcile.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::domain::{AlertType, Severity};
use crate::alerts::manager::AlertManager;
use crate::common::error::{CoreError, CoreResult};
use crate::common::time;
use crate::events::bus::EventBus;
use crate::events::domain::Channel;
use crate::metrics::domain::MetricValues;
use crate::metrics::recorder::MetricsRecorder;
use crate::store::Store;

use super::domain::{JobStatus, ModelType, TrainedModel, Trainer, TrainingJob, TriggerType};

/// Synchronous answer to a trigger request. A refused duplicate is a normal
/// response, never an error bubbling to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct TriggerOutcome {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Owns the training-job state machine. Cloning is cheap and shares all
/// underlying state, which is how execution detaches into the background.
#[derive(Clone)]
pub struct JobLifecycleManager {
    store: Arc<dyn Store>,
    trainer: Arc<dyn Trainer>,
    metrics: Arc<MetricsRecorder>,
    alerts: Arc<AlertManager>,
    bus: EventBus,
    job_timeout_secs: i64,
    estimated_training_secs: i64,
}

impl JobLifecycleManager {
    pub fn new(
        store: Arc<dyn Store>,
        trainer: Arc<dyn Trainer>,
        metrics: Arc<MetricsRecorder>,
        alerts: Arc<AlertManager>,
        bus: EventBus,
        job_timeout_secs: i64,
        estimated_training_secs: i64,
    ) -> Self {
        Self {
            store,
            trainer,
            metrics,
            alerts,
            bus,
            job_timeout_secs,
            estimated_training_secs,
        }
    }

    /// Atomically claim the pair's active slot and kick off background
    /// execution. Returns as soon as the job is claimed; training itself
    /// runs as a detached task.
    pub fn trigger(
        &self,
        model_type: ModelType,
        machine_id: &str,
        trigger_type: TriggerType,
        reason: Option<String>,
    ) -> CoreResult<TriggerOutcome> {
        if machine_id.trim().is_empty() {
            return Err(CoreError::validation("machine_id must not be empty"));
        }

        let job = match self
            .store
            .claim_job(TrainingJob::pending(model_type, machine_id, trigger_type))
        {
            Ok(job) => job,
            Err(CoreError::Conflict(_)) => {
                return Ok(TriggerOutcome {
                    triggered: false,
                    training_job_id: None,
                    estimated_completion: None,
                    reason: Some("Training already in progress".to_string()),
                });
            }
            Err(err) => return Err(err),
        };

        info!(
            job_id = %job.id,
            machine_id,
            model_type = model_type.as_str(),
            trigger_type = ?trigger_type,
            reason = reason.as_deref().unwrap_or("-"),
            "training job accepted"
        );

        let manager = self.clone();
        let job_id = job.id;
        tokio::spawn(async move { manager.execute(job_id).await });

        Ok(TriggerOutcome {
            triggered: true,
            training_job_id: Some(job.id),
            estimated_completion: Some(time::now() + Duration::seconds(self.estimated_training_secs)),
            reason: None,
        })
    }

    /// Run one accepted job to a terminal state. Invoked as a background
    /// task; internal failures are logged, never surfaced to the trigger
    /// caller, who already received an acknowledgement.
    pub async fn execute(&self, job_id: Uuid) {
        if let Err(err) = self.run_job(job_id).await {
            error!(%job_id, %err, "job execution aborted");
        }
    }

    async fn run_job(&self, job_id: Uuid) -> CoreResult<()> {
        let mut job = self.store.get_job(job_id)?;
        job.status = JobStatus::Running;
        self.store.update_job(&job)?;
        self.bus.publish(
            Channel::Training,
            "training_started",
            serde_json::json!({
                "job_id": job.id,
                "machine_id": job.machine_id,
                "model_type": job.model_type,
                "trigger_type": job.trigger_type,
            }),
        );

        let progress_bus = self.bus.clone();
        let progress = move |percent: u8| {
            progress_bus.publish(
                Channel::Training,
                "training_progress",
                serde_json::json!({ "job_id": job_id, "percent": percent }),
            );
        };

        match self.trainer.run(&job.machine_id, job.model_type, &progress).await {
            Ok(trained) => self.complete(job, trained),
            Err(err) => self.fail(job, err.to_string(), Severity::Critical),
        }
    }

    fn complete(&self, mut job: TrainingJob, trained: TrainedModel) -> CoreResult<()> {
        // Reconciliation may have force-failed this job while the trainer
        // was still running. Check before allocating a version; the store's
        // terminal guard on update is what actually enforces it.
        if !self.store.get_job(job.id)?.status.is_active() {
            return Err(CoreError::conflict("job reclaimed while training"));
        }
        let version = self.store.next_model_version(&job.machine_id, job.model_type);
        let finished = time::now();
        job.status = JobStatus::Completed;
        job.end_time = Some(finished);
        job.model_version = Some(version);
        self.store.update_job(&job)?;

        let metric = self.metrics.record(
            job.id,
            &job.machine_id,
            job.model_type,
            version,
            (job.start_time, finished),
            MetricValues {
                r_squared: trained.r_squared,
                rmse: trained.rmse,
                mae: trained.mae,
            },
            false,
            0.0,
        )?;

        info!(job_id = %job.id, machine_id = %job.machine_id, version, "training completed");
        let completed = serde_json::json!({
            "job_id": job.id,
            "status": "completed",
            "machine_id": job.machine_id,
            "model_type": job.model_type,
            "model_version": version,
        });
        self.bus.publish(Channel::Training, "training_completed", completed.clone());
        // Dashboards track completions too, alongside the model/metric updates.
        self.bus.publish(Channel::Dashboard, "training_completed", completed);
        self.bus.publish(
            Channel::Dashboard,
            "model_updated",
            serde_json::json!({
                "machine_id": job.machine_id,
                "model_type": job.model_type,
                "model_version": version,
            }),
        );
        self.bus.publish(
            Channel::Dashboard,
            "metric_updated",
            serde_json::to_value(&metric).unwrap_or_default(),
        );
        Ok(())
    }

    fn fail(&self, mut job: TrainingJob, message: String, severity: Severity) -> CoreResult<()> {
        job.status = JobStatus::Failed;
        job.end_time = Some(time::now());
        job.error_message = Some(message.clone());
        self.store.update_job(&job)?;

        warn!(job_id = %job.id, machine_id = %job.machine_id, %message, "training failed");
        let completed = serde_json::json!({
            "job_id": job.id,
            "status": "failed",
            "machine_id": job.machine_id,
            "model_type": job.model_type,
            "error": message,
        });
        self.bus.publish(Channel::Training, "training_completed", completed.clone());
        self.bus.publish(Channel::Dashboard, "training_completed", completed);
        self.alerts.raise(
            AlertType::TrainingFailed,
            severity,
            &job.machine_id,
            job.model_type,
            message,
            serde_json::json!({ "job_id": job.id }),
        )?;
        Ok(())
    }

    /// Force any job stuck in pending/running past the timeout to failed.
    /// The sole self-healing path for crashed workers; there is no mid-flight
    /// cancellation. Runs at process start and on a fixed interval.
    pub fn reconcile(&self) -> usize {
        let cutoff = time::now() - Duration::seconds(self.job_timeout_secs);
        let mut reclaimed = 0usize;
        for job in self.store.active_jobs() {
            if job.start_time >= cutoff {
                continue;
            }
            warn!(job_id = %job.id, machine_id = %job.machine_id, "stuck job reclaimed");
            if let Err(err) = self.fail(job, "stuck job reclaimed".to_string(), Severity::Warning) {
                error!(%err, "failed to reclaim stuck job");
            } else {
                reclaimed += 1;
            }
        }
        reclaimed
    }
}
