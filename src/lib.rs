// lib.rs - central orchestrator
pub mod abtest;
pub mod alerts;
pub mod api;
pub mod common;
pub mod drift;
pub mod events;
pub mod metrics;
pub mod store;
pub mod training;

pub use common::{CoreError, CoreResult};
