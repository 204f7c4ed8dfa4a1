//! HTTP API server for external capture control
//!
//! This module provides a REST API for controlling capture sessions:
//! - POST /capture/start - Start a new capture session
//! - POST /capture/stop/:id - Stop a capture session
//! - GET /capture/:id/status - Query session statistics
//! - GET /capture/:id/transcript - Get accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, CaptureHandle};
