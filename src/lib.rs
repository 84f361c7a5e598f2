//! Coupe Gate - session admission gateway for compute functions.
//!
//! Every inbound request must obtain (or confirm) a session from the session
//! broker before it reaches the function behind the gateway:
//!
//! - broker answers 200: the request continues to the function unchanged
//! - broker answers anything else: its status and body go back to the caller
//! - broker cannot be reached: the caller gets 503 with the cause
//!
//! The gate itself is a [`tower::Layer`] ([`gate::AdmissionLayer`]) and can
//! wrap any service; the binary wires it in front of a reverse proxy to the
//! configured function upstream.

pub mod admin;
pub mod broker;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging_layer;
pub mod metrics;
pub mod proxy_service;
pub mod server;
pub mod session;

pub use broker::{BrokerClient, BrokerOutcome, SessionBroker};
pub use error::GateError;
pub use gate::{AdmissionGate, AdmissionLayer, AdmissionService, Verdict};
pub use session::SessionStartRequest;
