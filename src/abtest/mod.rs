//! Timed A/B comparisons between two model versions of one machine.

pub mod domain;
pub mod manager;

pub use domain::{ABTest, AbStatus, Variant, Winner};
pub use manager::{ABTestManager, AbResults};
