//! Action dispatch: maps an incoming [`Envelope`]'s action to a handler and
//! enforces the authentication gate: an unauthenticated subscriber may only
//! `login`.

pub mod login;
pub mod me;
pub mod messaging;
pub mod moderation;
pub mod webrtc;

use crate::collaborators::Collaborators;
use crate::error::{HandlerError, HandlerResult};
use crate::message::{Action, Envelope};
use crate::state::{Hub, Subscriber};
use std::sync::Arc;

/// Routes one envelope from `sub` to its handler. Returning `Err` does not
/// tear down the connection by itself — the caller (transport loop) decides
/// based on [`HandlerError::is_fatal`].
pub async fn dispatch(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let _timer = crate::telemetry::DispatchTimer::start();
    let _span = crate::telemetry::create_dispatch_span(
        &format!("{:?}", env.action),
        sub.id,
        sub.is_authenticated().then(|| sub.username()).as_deref(),
    )
    .entered();

    if !sub.is_authenticated() && env.action != Action::Login {
        return Err(HandlerError::UserInput(format!(
            "you must log in before sending {:?}",
            env.action
        )));
    }

    match env.action {
        Action::Login => login::handle(hub, collaborators, sub, env).await,
        Action::Message => messaging::handle_message(hub, collaborators, sub, env).await,
        Action::File => messaging::handle_file(hub, collaborators, sub, env).await,
        Action::Takeback => messaging::handle_takeback(hub, collaborators, sub, env).await,
        Action::React => messaging::handle_react(hub, sub, env),
        Action::Report => messaging::handle_report(hub, collaborators, sub, env).await,
        Action::Me => me::handle(hub, sub, env),
        Action::Boot => moderation::handle_boot(hub, sub, env),
        Action::Unboot => moderation::handle_unboot(hub, sub, env),
        Action::Mute => moderation::handle_mute(hub, sub, env),
        Action::Unmute => moderation::handle_unmute(hub, sub, env),
        Action::Block => moderation::handle_block(hub, sub, env),
        Action::Blocklist => moderation::handle_blocklist(hub, sub, env),
        Action::Open => webrtc::handle_open(hub, sub, env),
        Action::Ring => webrtc::handle_ring(hub, sub, env),
        Action::Candidate | Action::Sdp | Action::Watch | Action::Unwatch | Action::Typing => {
            webrtc::handle_relay(hub, sub, env)
        }
        Action::Ping => Ok(()),
        other => Err(HandlerError::UserInput(format!("unsupported client action: {other:?}"))),
    }
}
