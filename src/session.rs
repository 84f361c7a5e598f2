//! Session-start request construction.
//!
//! Turns the immutable [`GateConfig`] into the body the broker expects:
//!
//! ```json
//! {"function_name":"resize-image","duration_seconds":45}
//! ```
//!
//! The field names and their order are part of the broker contract.

use bytes::Bytes;
use serde::Serialize;

use crate::config::GateConfig;
use crate::error::GateError;

/// Media type of the session-start body and of forwarded rejection bodies.
pub const SESSION_CONTENT_TYPE: &str = "application/json";

/// One session-start call, built per inbound request and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStartRequest {
    /// Function the session is for.
    pub function_name: String,
    /// Requested session length in whole seconds.
    pub duration_seconds: u64,
}

impl SessionStartRequest {
    /// Derive the request from gate configuration.
    ///
    /// Sub-second parts of the configured duration are truncated.
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            function_name: config.function_name.clone(),
            duration_seconds: config.session_duration.as_secs(),
        }
    }

    /// Encode as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns `GateError::RequestConstruction` if serialization fails.
    pub fn encode(&self) -> Result<Bytes, GateError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| GateError::RequestConstruction {
                reason: format!("failed to encode session request body: {}", e),
            })
    }
}
