//! HTTP control plane and WebSocket event plane.

pub mod http;
pub mod ws;

pub use http::{router, AppState};
