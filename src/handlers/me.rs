//! Handles the `me` envelope: video/status/DND updates plus moderation rule
//! enforcement, grounded on the merged rule set from
//! [`crate::state::moderation::merge_rules`].

use crate::error::HandlerResult;
use crate::message::{video_flags, Action, ChatStatus, Envelope};
use crate::state::moderation::merge_rules;
use crate::state::{Hub, Subscriber};
use std::sync::Arc;

pub fn handle(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    if let Some(mut video) = env.video {
        let config = hub.config();
        let jwt_rules = sub.profile.read().jwt_rules.clone();
        let effective = merge_rules(&config, &sub.username(), &jwt_rules);

        if effective.disable_camera || effective.no_broadcast {
            video &= !video_flags::ACTIVE;
            sub.send(&Envelope::cut());
            sub.chat_server("Your camera access has been disabled by a server-side moderation rule.");
        }

        if effective.camera_always_nsfw && video_flags::has(video, video_flags::ACTIVE) {
            video |= video_flags::NSFW;
            sub.chat_server("Your camera has been flagged as always-NSFW by a server-side moderation rule.");
        }

        sub.set_video_flags(video);
        sub.send(&Envelope {
            username: Some(sub.username()),
            video: Some(sub.video_flags()),
            status: Some(sub.chat_status()),
            dnd: Some(sub.dnd()),
            ..Envelope::new(Action::Me)
        });
    }

    if let Some(status) = env.status {
        let resolved = if status == ChatStatus::Hidden && !sub.is_admin() {
            ChatStatus::Away
        } else {
            status
        };

        if resolved == ChatStatus::Hidden && sub.chat_status() != ChatStatus::Hidden {
            hub.broadcast(Envelope {
                username: Some(sub.username()),
                message: Some("has left the room!".to_string()),
                ..Envelope::new(Action::Presence)
            });
        } else if resolved != ChatStatus::Hidden && sub.chat_status() == ChatStatus::Hidden {
            hub.broadcast(Envelope {
                username: Some(sub.username()),
                message: Some("has joined the room!".to_string()),
                ..Envelope::new(Action::Presence)
            });
        }

        sub.set_chat_status(resolved);
    }

    if let Some(dnd) = env.dnd {
        sub.set_dnd(dnd);
    }

    hub.who_list_broadcast();
    Ok(())
}
