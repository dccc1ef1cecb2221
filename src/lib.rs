//! BareRTC: a real-time group chat hub with WebRTC signaling relay.

pub mod admin;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod message;
pub mod metrics;
pub mod state;
pub mod telemetry;
pub mod transport;
