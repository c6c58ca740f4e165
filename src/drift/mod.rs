//! Drift detection: comparing recent operating data against training-time data.

pub mod detector;
pub mod domain;

pub use detector::DriftDetector;
pub use domain::{DriftReport, DriftStrategy, ErrorRatioStrategy};
