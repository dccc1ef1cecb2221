//! Login and initial presence/roster push.

use crate::collaborators::Collaborators;
use crate::error::{HandlerError, HandlerResult};
use crate::message::{Action, Envelope};
use crate::state::{Hub, Subscriber};
use std::sync::Arc;
use std::time::Duration;

/// Handles a `login` envelope. Username resolution:
///
/// 1. A taken name with a valid JWT for that same name displaces the
///    existing holder.
/// 2. Otherwise the new session is renamed via [`Hub::unique_username`].
/// 3. A banned resulting name is rejected outright.
pub async fn handle(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    if sub.is_authenticated() {
        return Err(HandlerError::UserInput("already logged in".to_string()));
    }

    let requested = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("login requires a username".to_string()))?;

    let config = hub.config();
    let claims = match env.jwt.as_deref() {
        Some(token) if !token.is_empty() => Some(
            collaborators.jwt.parse(token).map_err(|e| {
                crate::metrics::LOGIN_REJECTIONS.inc();
                HandlerError::Auth(format!("invalid login token: {e}"))
            })?,
        ),
        _ => {
            if config.jwt.strict {
                crate::metrics::LOGIN_REJECTIONS.inc();
                return Err(HandlerError::Auth("this server requires a signed login token".to_string()));
            }
            None
        }
    };

    let token_claims_name = claims.as_ref().map(|c| c.sub.clone());
    let username = match (&token_claims_name, hub.get(&requested)) {
        (Some(claimed_name), Some(existing)) if claimed_name == &requested && existing.username() == requested => {
            existing.send(&Envelope::chat_server_error(format!(
                "You have been signed out because you logged in from elsewhere, {requested}."
            )));
            existing.send(&Envelope::disconnect());
            hub.remove(&existing);
            requested
        }
        _ => {
            let (resolved, _renamed) = hub.unique_username(&requested);
            resolved
        }
    };

    if hub.bans.is_banned(&username) {
        crate::metrics::LOGIN_REJECTIONS.inc();
        // Self-presenting here would race the transport's own fatal-error
        // handling (it sends `to_envelope()` + `disconnect` for every `Auth`
        // error); leave presentation to the caller.
        return Err(HandlerError::Auth("You are banned from this chat room.".to_string()));
    }

    sub.set_username(&username);
    {
        let mut profile = sub.profile.write();
        if let Some(claims) = &claims {
            profile.nickname = claims.nick.clone();
            profile.avatar = claims.avatar.clone();
            profile.profile_url = claims.profile_url.clone();
            profile.emoji = claims.emoji.clone();
            profile.gender = claims.gender.clone();
            profile.is_admin = claims.op;
            profile.is_vip = claims.vip;
            profile.jwt_rules = claims.jwt_rules();
        }
    }
    sub.mark_authenticated();

    if let Some(blocked) = hub.blocklist_cache.take(&username) {
        for blocked_user in blocked {
            sub.block(&blocked_user);
        }
    }

    hub.broadcast(Envelope {
        username: Some(username.clone()),
        message: Some("has joined the room!".to_string()),
        ..Envelope::new(Action::Presence)
    });

    sub.send(&Envelope {
        username: Some(username.clone()),
        video: Some(sub.video_flags()),
        status: Some(sub.chat_status()),
        dnd: Some(sub.dnd()),
        ..Envelope::new(Action::Me)
    });

    hub.who_list_broadcast();

    let exclude = {
        let mut set = sub.blocked_usernames();
        set.extend(sub.muted_usernames());
        set
    };
    let echoes = hub.echoes.collect_excluding(&exclude);
    if !echoes.is_empty() {
        sub.send(&Envelope {
            messages: Some(echoes),
            ..Envelope::new(Action::Echo)
        });
    }

    for channel in &config.public_channels {
        for welcome in &channel.welcome_messages {
            let rendered = crate::collaborators::render_and_sanitize(welcome);
            sub.send(&Envelope::chat_server_notice(format!("@{}", channel.id), rendered));
        }
    }

    tracing::info!(username = %username, "subscriber logged in");
    Ok(())
}
