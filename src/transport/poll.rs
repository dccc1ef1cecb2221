//! Long-poll transport: a stateless `POST` request/response cycle
//! standing in for the socket transport's full-duplex connection.
//!
//! A poll subscriber's [`mpsc::Receiver`] cannot live on [`Subscriber`] itself
//! (it isn't `Clone`, and the subscriber is looked up fresh on every request),
//! so it is held in [`PollSessions`], a side table keyed by the session id
//! minted on that subscriber's first request.

use crate::collaborators::Collaborators;
use crate::handlers;
use crate::message::{Action, Envelope};
use crate::state::subscriber::TransportKind;
use crate::state::{Hub, Subscriber};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::{broadcast, mpsc};

/// How long a poll idler may go between requests before the idle-kicker
/// disconnects it.
pub const POLL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Idle-kicker sweep interval.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// How long a single poll request blocks waiting for at least one outbound
/// message before returning an empty batch.
const LONG_POLL_WAIT: Duration = Duration::from_secs(25);

type PollSessions = Arc<DashMap<String, Arc<AsyncMutex<mpsc::Receiver<String>>>>>;

#[derive(Clone)]
pub struct PollState {
    pub hub: Arc<Hub>,
    pub collaborators: Arc<Collaborators>,
    sessions: PollSessions,
}

impl PollState {
    pub fn new(hub: Arc<Hub>, collaborators: Arc<Collaborators>) -> Self {
        Self {
            hub,
            collaborators,
            sessions: Arc::new(DashMap::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PollRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Serialize)]
struct PollResponse {
    username: String,
    session_id: String,
    messages: Vec<Box<RawValue>>,
}

pub fn router(state: PollState) -> Router {
    Router::new().route("/poll", post(handle_poll)).with_state(state)
}

async fn handle_poll(State(state): State<PollState>, Json(req): Json<PollRequest>) -> Json<PollResponse> {
    let response = match req.session_id {
        None => first_request(&state, req).await,
        Some(session_id) => subsequent_request(&state, session_id, req).await,
    };
    Json(response)
}

/// A session with no matching subscriber gets a synthetic `error` +
/// `disconnect` pair rather than an HTTP error, so the client's normal
/// envelope-dispatch loop handles it uniformly.
fn session_mismatch() -> PollResponse {
    let error = to_raw(serde_json::to_string(&Envelope::chat_server_error("your session has expired or is unknown")).unwrap());
    let disconnect = to_raw(serde_json::to_string(&Envelope::disconnect()).unwrap());
    PollResponse {
        username: String::new(),
        session_id: String::new(),
        messages: vec![error, disconnect],
    }
}

async fn first_request(state: &PollState, req: PollRequest) -> PollResponse {
    // `close_slow` must be captured before the Subscriber it tears down
    // exists, so it closes over an empty cell and the subscriber itself
    // fills it in right after construction.
    let cell: Arc<AsyncMutex<Option<Arc<Subscriber>>>> = Arc::new(AsyncMutex::new(None));
    let close_slow = {
        let cell = cell.clone();
        Arc::new(move || {
            let cell = cell.clone();
            tokio::spawn(async move {
                // Poll subscribers have no live task to notify directly;
                // backdating last_poll_at makes the next idle sweep
                // (at most `IDLE_SWEEP_INTERVAL` away) tear it down.
                if let Some(sub) = cell.lock().await.as_ref() {
                    *sub.last_poll_at.lock() = Instant::now() - POLL_IDLE_TIMEOUT;
                }
            });
        }) as Arc<dyn Fn() + Send + Sync>
    };

    let (sub, rx) = state.hub.add(TransportKind::Poll, close_slow);
    *cell.lock().await = Some(sub.clone());
    let session_id = uuid::Uuid::new_v4().to_string();
    *sub.session_id.write() = Some(session_id.clone());
    state.sessions.insert(session_id.clone(), Arc::new(AsyncMutex::new(rx)));

    if let Ok(env) = serde_json::from_str::<Envelope>(&req.msg) {
        if env.action == Action::Login {
            if let Err(err) = handlers::dispatch(&state.hub, &state.collaborators, &sub, env).await {
                if let Some(envelope) = err.to_envelope() {
                    sub.send(&envelope);
                }
            }
        }
    }

    let messages = drain_available(&state.sessions, &session_id).await;
    let _ = req.username;
    PollResponse {
        username: sub.username(),
        session_id,
        messages,
    }
}

async fn subsequent_request(state: &PollState, session_id: String, req: PollRequest) -> PollResponse {
    let Some(sub) = state.hub.get_by_session(&session_id) else {
        return session_mismatch();
    };
    *sub.last_poll_at.lock() = Instant::now();

    let trimmed = req.msg.trim();
    let mut torn_down = false;
    if !trimmed.is_empty() {
        if let Ok(env) = serde_json::from_str::<Envelope>(trimmed) {
            if env.action != Action::Ping {
                if let Err(err) = handlers::dispatch(&state.hub, &state.collaborators, &sub, env).await {
                    if let Some(envelope) = err.to_envelope() {
                        sub.send(&envelope);
                    }
                    if err.is_fatal() {
                        sub.send(&Envelope::disconnect());
                        torn_down = true;
                    }
                }
            }
        }
    }

    // Drain whatever's queued (the disconnect envelope included) before
    // tearing the session down, rather than trusting the client to close on
    // its own after seeing `disconnect` — the session table entry and the
    // hub registration are both gone once this function returns.
    let messages = if torn_down {
        let messages = drain_available(&state.sessions, &session_id).await;
        state.sessions.remove(&session_id);
        crate::transport::socket::teardown(&state.hub, &sub);
        messages
    } else {
        wait_for_messages(&state.sessions, &session_id).await
    };
    PollResponse {
        username: sub.username(),
        session_id,
        messages,
    }
}

/// Blocks up to [`LONG_POLL_WAIT`] for at least one outbound message, then
/// drains whatever else has queued up without waiting further.
async fn wait_for_messages(sessions: &PollSessions, session_id: &str) -> Vec<Box<RawValue>> {
    let Some(entry) = sessions.get(session_id) else { return Vec::new() };
    let receiver = entry.clone();
    drop(entry);
    let mut rx = receiver.lock().await;

    let mut out = Vec::new();
    match tokio::time::timeout(LONG_POLL_WAIT, rx.recv()).await {
        Ok(Some(first)) => out.push(to_raw(first)),
        Ok(None) | Err(_) => return out,
    }
    while let Ok(next) = rx.try_recv() {
        out.push(to_raw(next));
    }
    out
}

/// Non-blocking drain, used for the first request's immediate `me`/`who`
/// push so the login response isn't delayed by the long-poll wait.
async fn drain_available(sessions: &PollSessions, session_id: &str) -> Vec<Box<RawValue>> {
    let Some(entry) = sessions.get(session_id) else { return Vec::new() };
    let receiver = entry.clone();
    drop(entry);
    let mut rx = receiver.lock().await;
    let mut out = Vec::new();
    while let Ok(next) = rx.try_recv() {
        out.push(to_raw(next));
    }
    out
}

fn to_raw(payload: String) -> Box<RawValue> {
    RawValue::from_string(payload).unwrap_or_else(|_| RawValue::from_string("null".to_string()).unwrap())
}

/// Periodic sweep disconnecting poll subscribers whose `last_poll_at` has
/// exceeded [`POLL_IDLE_TIMEOUT`], mirroring the socket transport's
/// connection-drop teardown.
pub async fn run_idle_kicker(state: PollState, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep_idle_sessions(&state);
            }
            _ = shutdown.recv() => {
                tracing::info!("poll idle-kicker shutting down");
                break;
            }
        }
    }
}

fn sweep_idle_sessions(state: &PollState) {
    for sub in state.hub.snapshot() {
        if sub.transport != TransportKind::Poll {
            continue;
        }
        let idle_for = sub.last_poll_at.lock().elapsed();
        if idle_for < POLL_IDLE_TIMEOUT {
            continue;
        }

        tracing::info!(subscriber = sub.id, username = %sub.username(), "poll subscriber timed out");
        if let Some(session_id) = sub.session_id.read().clone() {
            state.sessions.remove(&session_id);
        }
        crate::transport::socket::teardown(&state.hub, &sub);
    }
}
