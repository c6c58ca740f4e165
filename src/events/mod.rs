//! Real-time event distribution: bus, gateway and client-side contract.

pub mod bus;
pub mod client;
pub mod domain;
pub mod gateway;

pub use bus::{EventBus, MemBroker};
pub use domain::{Channel, EventMessage};
pub use gateway::{ConnectionGateway, ConnectionRegistry};
