//! Performance metrics for trained model versions.

pub mod domain;
pub mod recorder;

pub use domain::{MetricValues, PerformanceMetric};
pub use recorder::MetricsRecorder;
