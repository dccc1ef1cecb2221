//! Structured tracing spans carrying chat-specific context (subscriber id,
//! username, transport kind), plus a timing guard that feeds the dispatch
//! latency histogram in [`crate::metrics`].

#![allow(dead_code)]

use std::time::Instant;
use tracing::{span, Level, Span};

/// Per-envelope trace context. Populated progressively as a connection moves
/// from accept through login to an authenticated identity.
#[derive(Debug, Clone, Default)]
pub struct DispatchTraceContext {
    pub action: Option<String>,
    pub subscriber_id: Option<u64>,
    pub username: Option<String>,
    pub transport: Option<String>,
}

impl DispatchTraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_subscriber_id(mut self, id: u64) -> Self {
        self.subscriber_id = Some(id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn into_span(self) -> Span {
        let action = self.action.as_deref().unwrap_or("unknown");
        span!(
            Level::DEBUG,
            "dispatch",
            action = action,
            subscriber_id = self.subscriber_id,
            username = self.username.as_deref(),
            transport = self.transport.as_deref(),
        )
    }
}

/// Times one `handlers::dispatch` call and records it to the dispatch
/// duration histogram when dropped, win or lose.
pub struct DispatchTimer {
    start: Instant,
}

impl DispatchTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        crate::metrics::record_dispatch(self.start.elapsed().as_secs_f64());
    }
}

/// Span for a connection's lifetime, from transport accept to teardown.
pub fn create_connection_span(transport: &str, subscriber_id: u64) -> Span {
    span!(
        Level::INFO,
        "connection",
        transport = transport,
        subscriber_id = subscriber_id,
    )
}

/// Span for one dispatched client action.
pub fn create_dispatch_span(action: &str, subscriber_id: u64, username: Option<&str>) -> Span {
    DispatchTraceContext::new()
        .with_action(action)
        .with_subscriber_id(subscriber_id)
        .with_username(username.unwrap_or("").to_string())
        .into_span()
}

/// Span for an admin moderation action (`/kick`, `/ban`, etc), recording who
/// did it and to whom.
pub fn create_moderation_span(command: &str, operator: &str, target: Option<&str>) -> Span {
    span!(
        Level::INFO,
        "moderation",
        command = command,
        operator = operator,
        target = target,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_context_builder_sets_fields() {
        let ctx = DispatchTraceContext::new()
            .with_action("message")
            .with_subscriber_id(7)
            .with_username("alice")
            .with_transport("socket");

        assert_eq!(ctx.action.as_deref(), Some("message"));
        assert_eq!(ctx.subscriber_id, Some(7));
        assert_eq!(ctx.username.as_deref(), Some("alice"));
        assert_eq!(ctx.transport.as_deref(), Some("socket"));
    }

    #[test]
    fn dispatch_timer_records_on_drop() {
        let before = crate::metrics::DISPATCH_DURATION.get_sample_count();
        {
            let _timer = DispatchTimer::start();
        }
        let after = crate::metrics::DISPATCH_DURATION.get_sample_count();
        assert!(after > before);
    }
}
