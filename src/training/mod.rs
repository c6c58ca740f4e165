//! Training domain responsible for the job lifecycle.
//!
//! Covers manual and automatic (re)training triggers, the background
//! execution of accepted jobs and timeout-based recovery of stuck ones.

pub mod domain;
pub mod retrain;
pub mod service;

pub use domain::{JobStatus, ModelType, TrainingJob, TriggerType};
pub use service::{JobLifecycleManager, TriggerOutcome};
