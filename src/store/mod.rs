//! Durable storage seam for the four owned entities.
//!
//! Each domain defines its own repository contract next to its types; this
//! module only aggregates them into the `Store` capability the services are
//! wired with, and provides the in-memory implementation used by the default
//! binary and the test suite. Multi-instance deployments must implement the
//! same contracts over shared storage so the active-job and running-test
//! claims stay globally atomic.

pub mod mem;

use crate::abtest::domain::AbTestRepo;
use crate::alerts::domain::AlertRepo;
use crate::metrics::domain::MetricRepo;
use crate::training::domain::JobRepo;

/// Everything the services need from durable storage.
pub trait Store: JobRepo + MetricRepo + AbTestRepo + AlertRepo {}

impl<T: JobRepo + MetricRepo + AbTestRepo + AlertRepo> Store for T {}

pub use mem::MemStore;
