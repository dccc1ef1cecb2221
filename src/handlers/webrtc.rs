//! WebRTC signaling: permissioned `open`/`ring`, and verbatim relay of
//! `candidate`/`sdp`/`watch`/`unwatch`/`typing` envelopes to a named peer.

use crate::error::{HandlerError, HandlerResult};
use crate::message::{video_flags, Envelope};
use crate::state::hub::blocks_each_other;
use crate::state::moderation::merge_rules;
use crate::state::{Hub, Subscriber};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// The ordered view-permission predicate: checks run in sequence and the
/// first failing reason is surfaced.
fn check_view_permission(hub: &Hub, caller: &Subscriber, target: &Subscriber) -> Result<(), &'static str> {
    let config = hub.config();
    let caller_rules = merge_rules(&config, &caller.username(), &caller.profile.read().jwt_rules.clone());
    if caller_rules.no_video {
        return Err("A chat server moderation rule is currently in place which restricts your ability to watch webcams. Please contact a chat operator for more information.");
    }

    let target_video = target.video_flags();

    if !video_flags::has(target_video, video_flags::ACTIVE) {
        return Err("That user is not currently broadcasting video.");
    }

    if video_flags::has(target_video, video_flags::MUTUAL_REQUIRED) && !video_flags::has(caller.video_flags(), video_flags::ACTIVE) {
        return Err("You must share your own camera to view that user's.");
    }

    if video_flags::has(target_video, video_flags::ONLY_VIP) && !caller.is_vip() && !caller.is_admin() {
        return Err("Permission denied.");
    }

    if !caller.is_admin() {
        if target.boots(&caller.username()) || target.mutes(&caller.username()) || blocks_each_other(&config, caller, target) {
            return Err("Permission denied.");
        }
    }

    Ok(())
}

pub fn handle_open(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target_username = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("open requires a username".to_string()))?;
    let target = hub
        .get(&target_username)
        .ok_or_else(|| HandlerError::policy_inform("That user is not online."))?;

    check_view_permission(hub, sub, &target).map_err(HandlerError::policy_inform)?;

    let secret = random_secret();

    target.send(&Envelope {
        username: Some(sub.username()),
        open_secret: Some(secret.clone()),
        ..Envelope::new(crate::message::Action::Ring)
    });

    sub.send(&Envelope {
        username: Some(target_username),
        open_secret: Some(secret),
        ..Envelope::new(crate::message::Action::Open)
    });

    Ok(())
}

pub fn handle_ring(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    handle_relay(hub, sub, env)
}

/// Forwards `candidate`/`sdp`/`watch`/`unwatch`/`typing`/`ring` envelopes
/// verbatim to the peer named in `username`, stamping the sender's own name
/// over it so the recipient knows who it came from.
pub fn handle_relay(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target_username = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("this action requires a target username".to_string()))?;

    let mut forwarded = env;
    forwarded.username = Some(sub.username());

    hub.send_to(&target_username, forwarded)
        .map_err(|e| HandlerError::policy_inform(e.to_string()))
}
