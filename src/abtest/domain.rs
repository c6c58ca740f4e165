//! Domain types for A/B tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::training::domain::ModelType;

/// Traffic variant of a running test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

/// Declared outcome of a completed test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Inconclusive,
}

/// Lifecycle state of a test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbStatus {
    Running,
    Completed,
}

/// One timed comparison between two model versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ABTest {
    pub id: Uuid,
    pub model_a_version: u32,
    pub model_b_version: u32,
    pub machine_id: String,
    pub model_type: ModelType,
    /// Fraction of traffic routed to variant A, exclusive (0, 1).
    pub split_ratio: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AbStatus,
    pub winner: Option<Winner>,
    pub results: Option<serde_json::Value>,
}

/// Repository contract for A/B tests. `claim_running` must be atomic so two
/// concurrent starts for the same pair cannot both succeed.
pub trait AbTestRepo: Send + Sync {
    /// Insert a running test iff no other test is running for its pair.
    fn claim_running(&self, test: ABTest) -> CoreResult<ABTest>;
    /// Persist an update; a completed status releases the pair's slot.
    fn update_ab_test(&self, test: &ABTest) -> CoreResult<()>;
    fn get_ab_test(&self, id: Uuid) -> CoreResult<ABTest>;
    fn running_for_pair(&self, machine_id: &str, model_type: ModelType) -> Option<ABTest>;
    fn running_tests(&self) -> Vec<ABTest>;
}
