//! Shared harness for black-box integration tests: builds a real [`Hub`] and
//! [`Collaborators`] bundle and drives traffic through [`handlers::dispatch`]
//! exactly as a transport would, reading results back off each subscriber's
//! actual outbox receiver rather than just handler return values.

use barertc::collaborators::{Collaborators, HistoryStore, ImageProcessor, JwtValidator, WebhookClient};
use barertc::config::Config;
use barertc::message::Envelope;
use barertc::state::{Hub, Subscriber, TransportKind};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn test_collaborators() -> Collaborators {
    Collaborators {
        jwt: JwtValidator::new("test-secret"),
        webhook: WebhookClient::new(),
        image: ImageProcessor::default(),
        history: HistoryStore::connect(false, "unused.db").await.unwrap(),
    }
}

pub fn hub_with(config: Config) -> Hub {
    Hub::new(config)
}

/// Registers a fresh connection and immediately logs it in under `username`
/// via `handlers::dispatch`, exactly as a real client would. Returns the
/// subscriber and its outbox receiver.
pub async fn login(
    hub: &Hub,
    collaborators: &Collaborators,
    username: &str,
) -> (Arc<Subscriber>, mpsc::Receiver<String>) {
    let (sub, mut rx) = hub.add(TransportKind::Socket, Arc::new(|| {}));
    barertc::handlers::dispatch(
        hub,
        collaborators,
        &sub,
        Envelope {
            username: Some(username.to_string()),
            ..Envelope::new(barertc::message::Action::Login)
        },
    )
    .await
    .unwrap();
    drain(&mut rx);
    (sub, rx)
}

/// Drains every currently-queued outbox message without blocking, decoded
/// from their wire JSON.
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        out.push(serde_json::from_str(&payload).expect("outbox payload is valid JSON"));
    }
    out
}

/// Drains and returns only the `message` envelopes.
pub fn drain_messages(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
    drain(rx)
        .into_iter()
        .filter(|e| e.action() == barertc::message::Action::Message)
        .collect()
}
