//! Full-duplex WebSocket transport (text-frame JSON envelopes,
//! configurable read limit, normal close on kick, policy-violation close on
//! outbox overflow).

use crate::collaborators::Collaborators;
use crate::handlers;
use crate::message::{Action, Envelope};
use crate::state::subscriber::TransportKind;
use crate::state::{Hub, Subscriber};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct SocketState {
    pub hub: Arc<Hub>,
    pub collaborators: Arc<Collaborators>,
}

pub fn router(state: SocketState) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<SocketState>) -> Response {
    let read_limit = state.hub.config().websocket.read_limit_bytes;
    ws.max_message_size(read_limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// One connection's lifetime: a select loop between draining the
/// subscriber's outbox, reading client frames, and a `close_slow`
/// notification fired from off-task on outbox overflow.
async fn handle_socket(socket: WebSocket, state: SocketState) {
    let SocketState { hub, collaborators } = state;
    let overflow = Arc::new(Notify::new());
    let overflow_for_close = overflow.clone();
    let (sub, mut outbox_rx) = hub.add(TransportKind::Socket, Arc::new(move || overflow_for_close.notify_one()));

    let send_timeout = Duration::from_secs(hub.config().websocket.send_timeout_secs);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = overflow.notified() => {
                tracing::warn!(subscriber = sub.id, "closing websocket after outbox overflow");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outgoing = outbox_rx.recv() => {
                let Some(payload) = outgoing else { break };
                if tokio::time::timeout(send_timeout, sink.send(Message::Text(payload))).await.is_err() {
                    tracing::warn!(subscriber = sub.id, "websocket send timed out");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&hub, &collaborators, &sub, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, subscriber = sub.id, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    teardown(&hub, &sub);
}

/// Dispatches one inbound frame. Returns `true` if the error was fatal and
/// the caller must break its connection loop (the post-loop `teardown` call
/// then removes the subscriber) rather than leave the session registered
/// and trust the client to act on the `disconnect` envelope it was sent.
async fn handle_frame(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, text: &str) -> bool {
    let env: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            sub.send(&Envelope::chat_server_error(format!("could not parse that message: {e}")));
            return false;
        }
    };

    if let Err(err) = handlers::dispatch(hub, collaborators, sub, env).await {
        if let Some(envelope) = err.to_envelope() {
            sub.send(&envelope);
        }
        if err.is_fatal() {
            sub.send(&Envelope::disconnect());
            return true;
        }
    }
    false
}

/// Removes the subscriber from the hub and, if it had authenticated,
/// broadcasts the exit presence and a fresh WhoList. Shared with the poll
/// transport's idle-kicker, which tears down a session the same way.
pub(crate) fn teardown(hub: &Hub, sub: &Arc<Subscriber>) {
    let was_authenticated = sub.is_authenticated();
    let username = sub.username();
    hub.remove(sub);
    if was_authenticated {
        hub.broadcast(Envelope {
            username: Some(username),
            message: Some("has left the room!".to_string()),
            ..Envelope::new(Action::Presence)
        });
        hub.who_list_broadcast();
    }
}
