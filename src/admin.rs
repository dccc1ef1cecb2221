//! Admin HTTP control plane: shared-secret JSON endpoints
//! for statistics, re-signing claims, pre-sync blocklisting, forcing blocks
//! or disconnects on currently-online users, shutdown, and the DM-history
//! delegate endpoints.
//!
//! Every endpoint requires a matching `api_key` field; CORS is only ever
//! applied to the statistics route, per an allow-list of hosts.

use crate::collaborators::Collaborators;
use crate::collaborators::jwt::Claims;
use crate::message::{video_flags, Action, Envelope};
use crate::state::Hub;
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Clone)]
pub struct AdminState {
    pub hub: Arc<Hub>,
    pub collaborators: Arc<Collaborators>,
}

pub fn router(state: AdminState) -> Router {
    let cors_hosts = state.hub.config().server.cors_hosts.clone();
    let allowed_origins: Vec<HeaderValue> = cors_hosts
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    let statistics_cors = CorsLayer::new()
        .allow_methods([Method::POST])
        .allow_origin(AllowOrigin::list(allowed_origins));

    let statistics_route = Router::new()
        .route("/admin/statistics", post(statistics))
        .layer(statistics_cors)
        .with_state(state.clone());

    Router::new()
        .route("/admin/authenticate", post(authenticate))
        .route("/admin/blocklist", post(blocklist))
        .route("/admin/block/now", post(block_now))
        .route("/admin/disconnect/now", post(disconnect_now))
        .route("/admin/shutdown", post(shutdown))
        .route("/admin/message/history", post(message_history))
        .route("/admin/message/clear", post(message_clear))
        .route("/admin/profile", post(profile))
        .with_state(state)
        .merge(statistics_route)
}

fn authorized(hub: &Hub, api_key: &str) -> bool {
    let configured = hub.config().admin.api_key.clone();
    !configured.is_empty() && api_key == configured
}

fn ok(fields: serde_json::Value) -> impl IntoResponse {
    let mut body = serde_json::json!({ "OK": true });
    if let serde_json::Value::Object(extra) = fields {
        body.as_object_mut().unwrap().extend(extra);
    }
    Json(body)
}

fn err(message: impl Into<String>) -> impl IntoResponse {
    Json(serde_json::json!({ "OK": false, "Error": message.into() }))
}

#[derive(Debug, Deserialize)]
struct StatisticsRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
}

async fn statistics(State(state): State<AdminState>, Json(req): Json<StatisticsRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }

    let subs = state.hub.authenticated_snapshot();
    let authenticated = subs.len();
    let unique_names: std::collections::HashSet<String> = subs.iter().map(|s| s.username()).collect();
    let active_cameras = subs.iter().filter(|s| s.has_video_flag(video_flags::ACTIVE)).count();
    let nsfw_cameras = subs
        .iter()
        .filter(|s| s.has_video_flag(video_flags::ACTIVE) && s.has_video_flag(video_flags::NSFW))
        .count();

    ok(serde_json::json!({
        "AuthenticatedUsers": authenticated,
        "UniqueUsernames": unique_names.len(),
        "ActiveCameras": active_cameras,
        "NSFWCameras": nsfw_cameras,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct AuthenticateRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    claims: Claims,
}

async fn authenticate(State(state): State<AdminState>, Json(req): Json<AuthenticateRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }
    match state.collaborators.jwt.resign(&req.claims) {
        Ok(token) => ok(serde_json::json!({ "JWT": token })).into_response(),
        Err(e) => err(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BlocklistRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    username: String,
    #[serde(default)]
    blocked: Vec<String>,
}

async fn blocklist(State(state): State<AdminState>, Json(req): Json<BlocklistRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }
    state.hub.blocklist_cache.set(&req.username, req.blocked);
    ok(serde_json::json!({})).into_response()
}

#[derive(Debug, Deserialize)]
struct BlockNowRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    usernames: Vec<String>,
}

/// Mutually blocks every pair among currently-online `usernames`, matching
/// the bidirectional semantics of a user-initiated `block`.
async fn block_now(State(state): State<AdminState>, Json(req): Json<BlockNowRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }

    let online: Vec<_> = req.usernames.iter().filter_map(|u| state.hub.get(u)).collect();
    for a in &online {
        for b in &online {
            if a.id == b.id {
                continue;
            }
            a.block(&b.username());
        }
    }
    state.hub.who_list_broadcast();
    ok(serde_json::json!({})).into_response()
}

#[derive(Debug, Deserialize)]
struct DisconnectNowRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    username: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    kicked: bool,
}

async fn disconnect_now(State(state): State<AdminState>, Json(req): Json<DisconnectNowRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }

    let Some(sub) = state.hub.get(&req.username) else {
        return err(format!("{} is not online", req.username)).into_response();
    };

    if let Some(message) = &req.message {
        sub.chat_server(message.clone());
    }
    sub.send(&Envelope::disconnect());
    state.hub.remove(&sub);
    state.hub.broadcast(Envelope {
        username: Some(req.username.clone()),
        message: Some(if req.kicked { "has been kicked!".to_string() } else { "has left the room!".to_string() }),
        ..Envelope::new(Action::Presence)
    });
    state.hub.who_list_broadcast();
    ok(serde_json::json!({})).into_response()
}

#[derive(Debug, Deserialize)]
struct ShutdownRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
}

async fn shutdown(State(state): State<AdminState>, Json(req): Json<ShutdownRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }

    state.hub.broadcast(Envelope::chat_server_error("The chat server is shutting down."));
    for sub in state.hub.authenticated_snapshot() {
        sub.send(&Envelope::disconnect());
    }
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        std::process::exit(0);
    });
    ok(serde_json::json!({})).into_response()
}

#[derive(Debug, Deserialize)]
struct MessageHistoryRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    a: String,
    b: String,
    #[serde(default)]
    before_id: Option<i64>,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct HistoryMessageRow {
    #[serde(rename = "ID")]
    id: i64,
    from: String,
    to: String,
    message: String,
}

async fn message_history(State(state): State<AdminState>, Json(req): Json<MessageHistoryRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }

    match state
        .collaborators
        .history
        .paginate(&req.a, &req.b, req.before_id, req.page_size)
        .await
    {
        Ok((page, has_more)) => {
            let rows: Vec<HistoryMessageRow> = page
                .into_iter()
                .map(|m| HistoryMessageRow {
                    id: m.id,
                    from: m.from_username,
                    to: m.to_username,
                    message: m.message,
                })
                .collect();
            ok(serde_json::json!({ "Messages": rows, "HasMore": has_more })).into_response()
        }
        Err(e) => err(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct MessageClearRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    username: String,
}

async fn message_clear(State(state): State<AdminState>, Json(req): Json<MessageClearRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }
    match state.collaborators.history.clear(&req.username).await {
        Ok(removed) => ok(serde_json::json!({ "Removed": removed })).into_response(),
        Err(e) => err(e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    #[serde(rename = "APIKey")]
    api_key: String,
    username: String,
}

async fn profile(State(state): State<AdminState>, Json(req): Json<ProfileRequest>) -> impl IntoResponse {
    if !authorized(&state.hub, &req.api_key) {
        return err("invalid API key").into_response();
    }
    let Some(sub) = state.hub.get(&req.username) else {
        return err(format!("{} is not online", req.username)).into_response();
    };
    let p = sub.profile.read();
    ok(serde_json::json!({
        "Nickname": p.nickname,
        "Avatar": p.avatar,
        "ProfileURL": p.profile_url,
        "Emoji": p.emoji,
        "Gender": p.gender,
        "IsAdmin": p.is_admin,
        "IsVIP": p.is_vip,
    }))
    .into_response()
}
