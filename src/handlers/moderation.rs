//! Privacy-set mutation (`boot`/`mute`/`block`/blocklist) and the `/`-prefixed
//! admin slash-commands, grounded on the original `ProcessCommand`/
//! `KickCommand`/`BanCommand` trio.

use crate::error::{HandlerError, HandlerResult};
use crate::message::{video_flags, Action, Envelope};
use crate::state::{Hub, Subscriber};
use std::sync::Arc;
use std::time::Duration;

pub fn handle_boot(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("boot requires a username".to_string()))?;
    sub.boot(&target);
    hub.who_list_broadcast();
    Ok(())
}

pub fn handle_unboot(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("unboot requires a username".to_string()))?;
    sub.unboot(&target);
    hub.who_list_broadcast();
    Ok(())
}

pub fn handle_mute(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("mute requires a username".to_string()))?;
    sub.mute(&target);
    hub.who_list_broadcast();
    Ok(())
}

pub fn handle_unmute(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("unmute requires a username".to_string()))?;
    sub.unmute(&target);
    hub.who_list_broadcast();
    Ok(())
}

pub fn handle_block(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let target = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("block requires a username".to_string()))?;
    sub.block(&target);
    hub.who_list_broadcast();
    Ok(())
}

/// Reports the caller's current blocklist back to them, for client-side
/// persistence (the server only ever caches a login-time snapshot; see
/// [`crate::state::blocklist::BlocklistCache`]).
pub fn handle_blocklist(_hub: &Hub, sub: &Arc<Subscriber>, _env: Envelope) -> HandlerResult {
    sub.send(&Envelope {
        usernames: Some(sub.blocked_usernames().into_iter().collect()),
        ..Envelope::new(Action::Blocklist)
    });
    Ok(())
}

/// Parses a posted message for a `/command`. Returns `true` if it was
/// recognized and handled (the caller must not broadcast it as a normal
/// chat message), `false` otherwise. Only called for admin senders.
pub fn process_command(hub: &Hub, sub: &Arc<Subscriber>, raw_message: &str) -> bool {
    let words: Vec<&str> = raw_message.split_whitespace().collect();
    let Some(&command) = words.first() else { return false };
    if !command.starts_with('/') {
        return false;
    }

    match command {
        "/kick" => kick_command(hub, sub, &words),
        "/ban" => ban_command(hub, sub, &words),
        "/unban" => unban_command(hub, sub, &words),
        "/bans" => bans_command(hub, sub),
        "/nsfw" => nsfw_command(hub, sub, &words),
        "/op" => op_command(hub, sub, &words, true),
        "/deop" => op_command(hub, sub, &words, false),
        "/shutdown" => shutdown_command(hub, sub),
        "/kickall" => kickall_command(hub, sub),
        "/reconfigure" => reconfigure_command(hub, sub),
        "/unmute-all" => unmute_all_command(hub, sub),
        "/help" => {
            sub.chat_server(
                "Moderator commands:\n\n\
                 * `/kick <username>`\n\
                 * `/ban <username> [hours]`\n\
                 * `/unban <username>`\n\
                 * `/bans`\n\
                 * `/nsfw <username>`\n\
                 * `/op <username>`, `/deop <username>`\n\
                 * `/unmute-all`\n\
                 * `/kickall`\n\
                 * `/reconfigure`\n\
                 * `/shutdown`",
            );
            true
        }
        _ => false,
    }
}

fn kick_command(hub: &Hub, sub: &Arc<Subscriber>, words: &[&str]) -> bool {
    let Some(&username) = words.get(1) else {
        sub.chat_server("Usage: `/kick username` to remove the user from the chat room.");
        return true;
    };
    match hub.get(username) {
        Some(other) => {
            other.chat_server(format!("You have been kicked from the chat room by {}.", sub.username()));
            other.send(&Envelope::disconnect());
            hub.remove(&other);
            hub.broadcast(Envelope {
                username: Some(other.username()),
                message: Some("has left the room!".to_string()),
                ..Envelope::new(Action::Presence)
            });
            sub.chat_server(format!("{username} has been kicked from the room."));
        }
        None => sub.chat_server(format!("/kick: username not found: {username}")),
    }
    true
}

fn ban_command(hub: &Hub, sub: &Arc<Subscriber>, words: &[&str]) -> bool {
    let Some(&username) = words.get(1) else {
        sub.chat_server(
            "Usage: `/ban username` bans for 24 hours (default).\n\n\
             Set another duration in hours like `/ban username 0.5` for a 30-minute ban.",
        );
        return true;
    };

    let hours: f64 = words.get(2).and_then(|s| s.parse().ok()).unwrap_or(24.0);
    let duration = Duration::from_secs_f64(hours.max(0.0) * 3600.0);
    hub.bans.ban(username, duration);

    match hub.get(username) {
        Some(other) => {
            other.chat_server(format!("You have been banned from the chat room by {}.", sub.username()));
            other.send(&Envelope::disconnect());
            hub.remove(&other);
            hub.broadcast(Envelope {
                username: Some(other.username()),
                message: Some("has left the room!".to_string()),
                ..Envelope::new(Action::Presence)
            });
        }
        None => {}
    }
    sub.chat_server(format!("{username} has been banned for {hours} hour(s)."));
    true
}

fn unban_command(hub: &Hub, sub: &Arc<Subscriber>, words: &[&str]) -> bool {
    let Some(&username) = words.get(1) else {
        sub.chat_server("Usage: `/unban username`.");
        return true;
    };
    if hub.bans.unban(username) {
        sub.chat_server(format!("{username} has been unbanned."));
    } else {
        sub.chat_server(format!("{username} was not banned."));
    }
    true
}

fn bans_command(hub: &Hub, sub: &Arc<Subscriber>) -> bool {
    let bans = hub.bans.list();
    if bans.is_empty() {
        sub.chat_server("There are no active bans.");
    } else {
        let lines: Vec<String> = bans.iter().map(|b| format!("* {}", b.username)).collect();
        sub.chat_server(format!("Active bans:\n\n{}", lines.join("\n")));
    }
    true
}

fn nsfw_command(hub: &Hub, sub: &Arc<Subscriber>, words: &[&str]) -> bool {
    let Some(&username) = words.get(1) else {
        sub.chat_server("Usage: `/nsfw username` to add the NSFW flag to their camera.");
        return true;
    };
    match hub.get(username) {
        Some(other) => {
            other.chat_server(format!("Your camera has been marked NSFW by {}.", sub.username()));
            other.set_video_flags(other.video_flags() | video_flags::NSFW);
            hub.who_list_broadcast();
            sub.chat_server(format!("{username} has their camera marked as NSFW."));
        }
        None => sub.chat_server(format!("/nsfw: username not found: {username}")),
    }
    true
}

fn op_command(hub: &Hub, sub: &Arc<Subscriber>, words: &[&str], grant: bool) -> bool {
    let Some(&username) = words.get(1) else {
        sub.chat_server("Usage: `/op username` or `/deop username`.");
        return true;
    };
    match hub.get(username) {
        Some(other) => {
            other.profile.write().is_admin = grant;
            hub.who_list_broadcast();
            sub.chat_server(format!("{username} is now {}an operator.", if grant { "" } else { "no longer " }));
        }
        None => sub.chat_server(format!("username not found: {username}")),
    }
    true
}

fn kickall_command(hub: &Hub, sub: &Arc<Subscriber>) -> bool {
    for other in hub.authenticated_snapshot() {
        if other.id == sub.id {
            continue;
        }
        other.chat_server(format!("The room is being cleared by {}.", sub.username()));
        other.send(&Envelope::disconnect());
        hub.remove(&other);
    }
    hub.who_list_broadcast();
    true
}

/// Makes the caller's session unblockable for the remainder of its lifetime
/// (the runtime counterpart of the JWT/config-driven `unblockable` flag):
/// no other subscriber's `block` can hide this admin from their WhoList or
/// suppress delivery to them.
fn unmute_all_command(hub: &Hub, sub: &Arc<Subscriber>) -> bool {
    sub.set_unblockable(true);
    hub.who_list_broadcast();
    sub.chat_server("You are now unblockable: no user's block list can hide you from them.");
    true
}

fn reconfigure_command(hub: &Hub, sub: &Arc<Subscriber>) -> bool {
    match crate::config::Config::load("config.toml") {
        Ok(config) => {
            hub.replace_config(config);
            sub.chat_server("Configuration reloaded.");
        }
        Err(e) => sub.chat_server(format!("Failed to reload configuration: {e}")),
    }
    true
}

fn shutdown_command(hub: &Hub, sub: &Arc<Subscriber>) -> bool {
    sub.chat_server("Shutting down the server in 2 seconds...");
    hub.broadcast(Envelope::chat_server_error("The chat server is shutting down."));
    for other in hub.authenticated_snapshot() {
        other.send(&Envelope::disconnect());
    }
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        std::process::exit(0);
    });
    true
}
