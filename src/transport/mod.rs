//! Client-facing transports. Both produce the same normalized envelope
//! stream consumed by [`crate::handlers::dispatch`]; the only difference is
//! how each front-end drains a subscriber's outbox.

pub mod poll;
pub mod socket;
