//! Public broadcast and direct-message routing, server-side filtering,
//! takeback, reactions, file uploads, and `/report`.

use crate::collaborators::{render_and_sanitize, webhook::ReportPayload, Collaborators};
use crate::config::{Config, FilterScope};
use crate::error::{HandlerError, HandlerResult};
use crate::message::{Action, Envelope};
use crate::state::hub::blocks_each_other;
use crate::state::moderation::merge_rules;
use crate::state::{Hub, Subscriber};
use std::sync::Arc;

fn is_direct(channel: &str) -> bool {
    channel.starts_with('@')
}

fn dm_peer(channel: &str) -> &str {
    channel.trim_start_matches('@')
}

enum FilterOutcome {
    Continue(String),
    Stop,
}

/// Runs the server-side filter pass: pushes the message onto the relevant
/// recent-context ring (skipped for admin-involved DMs, which are also
/// exempt from filtering entirely), then checks each enabled filter against
/// the rendered body in declaration order. The first match wins.
async fn apply_filters(
    hub: &Hub,
    collaborators: &Collaborators,
    config: &Config,
    sub: &Subscriber,
    channel: &str,
    raw_message: &str,
    rendered: String,
) -> FilterOutcome {
    let is_dm = is_direct(channel);

    let waived = if is_dm {
        let peer = dm_peer(channel);
        hub.contexts.push_dm(&sub.username(), peer, &sub.username(), raw_message);
        sub.is_admin() || hub.get(peer).map(|p| p.is_admin()).unwrap_or(false)
    } else {
        hub.contexts.push(channel, &sub.username(), raw_message);
        false
    };

    if waived {
        return FilterOutcome::Continue(rendered);
    }

    let scope_matches = |scope: FilterScope| match scope {
        FilterScope::Both => true,
        FilterScope::Public => !is_dm,
        FilterScope::Private => is_dm,
    };

    let mut body = rendered;
    for filter in &config.message_filters {
        if !filter.enabled || !scope_matches(filter.scope) {
            continue;
        }

        let hit = filter
            .phrases
            .iter()
            .filter_map(|p| regex::Regex::new(p).ok())
            .find_map(|re| re.find(&body).map(|m| m.len()).map(|len| (re, len)));

        let Some((re, match_len)) = hit else { continue };

        if filter.censor_message {
            let stars = "*".repeat(match_len);
            body = re.replacen(&body, 1, stars.as_str()).into_owned();
        }

        if !filter.chat_server_response.is_empty() {
            sub.send(&Envelope::chat_server_error(filter.chat_server_response.clone()));
        }

        if filter.report_message {
            let context = if is_dm {
                hub.contexts.get_dm(&sub.username(), dm_peer(channel))
            } else {
                hub.contexts.get(channel)
            };
            let payload = ReportPayload {
                action: "report",
                api_key: &config.admin.api_key,
                reporter: &sub.username(),
                reported: &sub.username(),
                reason: "Server Side Message Filter",
                comment: "Automated report via server-side chat filters.",
                context: &context,
            };
            if let Err(e) = collaborators.webhook.post(config, "report", &payload).await {
                tracing::warn!(error = %e, "failed to deliver filter report webhook");
            }
        }

        if !filter.forward_message {
            sub.send(&Envelope {
                channel: Some(channel.to_string()),
                username: Some(sub.username()),
                message: Some(body),
                ..Envelope::new(Action::Message)
            });
            return FilterOutcome::Stop;
        }

        return FilterOutcome::Continue(body);
    }

    FilterOutcome::Continue(body)
}

pub async fn handle_message(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let channel = env
        .channel
        .clone()
        .ok_or_else(|| HandlerError::UserInput("message requires a channel".to_string()))?;
    let raw_message = env
        .message
        .clone()
        .ok_or_else(|| HandlerError::UserInput("message requires a body".to_string()))?;

    if sub.is_admin() && raw_message.starts_with('/') && super::moderation::process_command(hub, sub, &raw_message) {
        return Ok(());
    }

    let rendered = render_and_sanitize(&raw_message);
    if rendered.trim().is_empty() {
        return Ok(());
    }

    let config = hub.config();
    let body = match apply_filters(hub, collaborators, &config, sub, &channel, &raw_message, rendered).await {
        FilterOutcome::Continue(body) => body,
        FilterOutcome::Stop => return Ok(()),
    };

    let message_id = hub.message_ids.next();
    sub.own_message(message_id);

    if is_direct(&channel) {
        deliver_direct_message(hub, sub, dm_peer(&channel), &body, message_id)?;
        if let Err(e) = collaborators
            .history
            .log_message(message_id, &sub.username(), dm_peer(&channel), &body)
            .await
        {
            tracing::debug!(error = %e, "direct message history not recorded");
        }
    } else {
        let capacity = config.get_channel(&channel).map(|c| c.echo_messages_on_join).unwrap_or(30);
        let env = Envelope {
            channel: Some(channel.clone()),
            username: Some(sub.username()),
            message: Some(body),
            message_id: Some(message_id),
            ..Envelope::new(Action::Message)
        };
        hub.echoes.push(&channel, env.clone(), capacity);
        hub.broadcast(env);
    }

    Ok(())
}

fn deliver_direct_message(hub: &Hub, sub: &Arc<Subscriber>, peer_username: &str, body: &str, message_id: i64) -> HandlerResult {
    let peer = hub.get(peer_username);

    sub.send(&Envelope {
        channel: Some(format!("@{peer_username}")),
        username: Some(sub.username()),
        message: Some(body.to_string()),
        message_id: Some(message_id),
        ..Envelope::new(Action::Message)
    });

    let Some(peer) = peer else {
        return Err(HandlerError::policy_inform("Could not deliver message: user is not online."));
    };

    if peer.dnd() {
        return Err(HandlerError::policy_inform(
            "Could not deliver message: that user has Do Not Disturb enabled.",
        ));
    }

    if peer.mutes(&sub.username()) && !sub.is_admin() {
        return Err(HandlerError::policy_silent("recipient has muted the sender"));
    }

    if sub.mutes(peer_username) {
        return Err(HandlerError::policy_inform("Could not deliver message: you have muted that user."));
    }

    if blocks_each_other(&hub.config(), sub, &peer) {
        return Err(HandlerError::policy_silent("blocking between sender and recipient"));
    }

    peer.send(&Envelope {
        channel: Some(format!("@{}", sub.username())),
        username: Some(sub.username()),
        message: Some(body.to_string()),
        message_id: Some(message_id),
        ..Envelope::new(Action::Message)
    });

    Ok(())
}

pub async fn handle_file(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let channel = env
        .channel
        .clone()
        .ok_or_else(|| HandlerError::UserInput("file requires a channel".to_string()))?;
    let declared_type = env
        .description
        .clone()
        .ok_or_else(|| HandlerError::UserInput("file requires a declared image type".to_string()))?;
    let encoded = env
        .bytes
        .clone()
        .ok_or_else(|| HandlerError::UserInput("file requires image bytes".to_string()))?;

    let config = hub.config();
    if let Some(channel_config) = config.get_channel(&channel) {
        if !channel_config.permit_photos {
            return Err(HandlerError::policy_inform("Photos are not permitted in this channel."));
        }
    }

    let sender_rules = merge_rules(&config, &sub.username(), &sub.profile.read().jwt_rules.clone());
    if sender_rules.no_image {
        return Err(HandlerError::policy_inform(
            "A chat server moderation rule is currently in place which restricts your ability to share images. Please contact a chat operator for more information.",
        ));
    }

    let data = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &encoded)
        .map_err(|e| HandlerError::UserInput(format!("invalid base64 image payload: {e}")))?;

    let processed = collaborators
        .image
        .process(&declared_type, &data)
        .map_err(|e| HandlerError::Collaborator(format!("image processing failed: {e}")))?;

    let embed = format!(
        "<img src=\"data:{declared_type};base64,{}\" width=\"{}\" height=\"{}\">",
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &processed.bytes),
        processed.width,
        processed.height
    );

    handle_message(
        hub,
        collaborators,
        sub,
        Envelope {
            channel: Some(channel),
            message: Some(embed),
            ..Envelope::new(Action::Message)
        },
    )
    .await
}

pub async fn handle_takeback(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let message_id = env
        .message_id
        .ok_or_else(|| HandlerError::UserInput("takeback requires a messageID".to_string()))?;

    let owns_locally = sub.owns_message(message_id);
    let owns_in_history = if !owns_locally {
        collaborators
            .history
            .takeback_message(&sub.username(), message_id, sub.is_admin())
            .await
            .unwrap_or(false)
    } else {
        false
    };

    if !sub.is_admin() && !owns_locally && !owns_in_history {
        return Err(HandlerError::policy_inform("That is not your message to take back."));
    }

    sub.forget_message(message_id);
    hub.echoes.takeback(message_id);
    hub.broadcast(Envelope {
        message_id: Some(message_id),
        ..Envelope::new(Action::Takeback)
    });
    Ok(())
}

pub fn handle_react(hub: &Hub, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let message_id = env
        .message_id
        .ok_or_else(|| HandlerError::UserInput("react requires a messageID".to_string()))?;
    let reaction = env
        .message
        .clone()
        .ok_or_else(|| HandlerError::UserInput("react requires an emoji".to_string()))?;

    hub.broadcast(Envelope {
        username: Some(sub.username()),
        message: Some(reaction),
        message_id: Some(message_id),
        ..Envelope::new(Action::React)
    });
    Ok(())
}

pub async fn handle_report(hub: &Hub, collaborators: &Collaborators, sub: &Arc<Subscriber>, env: Envelope) -> HandlerResult {
    let reported = env
        .username
        .clone()
        .ok_or_else(|| HandlerError::UserInput("report requires a username".to_string()))?;
    let channel = env.channel.clone().unwrap_or_default();
    let config = hub.config();

    let context = if is_direct(&channel) {
        hub.contexts.get_dm(&sub.username(), dm_peer(&channel))
    } else {
        hub.contexts.get(&channel)
    };

    let payload = ReportPayload {
        action: "report",
        api_key: &config.admin.api_key,
        reporter: &sub.username(),
        reported: &reported,
        reason: env.reason.as_deref().unwrap_or(""),
        comment: env.comment.as_deref().unwrap_or(""),
        context: &context,
    };

    collaborators
        .webhook
        .post(&config, "report", &payload)
        .await
        .map_err(|e| HandlerError::Collaborator(format!("report webhook failed: {e}")))?;

    sub.chat_server("Your report has been submitted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HistoryStore, ImageProcessor, JwtValidator, WebhookClient};
    use crate::config::{Config, MessageFilterConfig, ModerationRuleConfig};
    use crate::state::TransportKind;

    async fn test_collaborators() -> Collaborators {
        Collaborators {
            jwt: JwtValidator::new(""),
            webhook: WebhookClient::new(),
            image: ImageProcessor::default(),
            history: HistoryStore::connect(false, "unused.db").await.unwrap(),
        }
    }

    fn login(hub: &Hub, username: &str) -> Arc<Subscriber> {
        let (sub, _rx) = hub.add(TransportKind::Socket, Arc::new(|| {}));
        sub.set_username(username);
        sub.mark_authenticated();
        sub
    }

    #[tokio::test]
    async fn public_message_gets_a_monotonic_id() {
        let hub = Hub::new(Config::default());
        let collaborators = test_collaborators().await;
        let alice = login(&hub, "alice");

        handle_message(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("lobby".to_string()),
                message: Some("hello".to_string()),
                ..Envelope::new(Action::Message)
            },
        )
        .await
        .unwrap();

        handle_message(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("lobby".to_string()),
                message: Some("world".to_string()),
                ..Envelope::new(Action::Message)
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dm_to_dnd_user_errors() {
        let hub = Hub::new(Config::default());
        let collaborators = test_collaborators().await;
        let alice = login(&hub, "alice");
        let bob = login(&hub, "bob");
        bob.set_dnd(true);

        let result = handle_message(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("@bob".to_string()),
                message: Some("yo".to_string()),
                ..Envelope::new(Action::Message)
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn takeback_of_unowned_message_is_rejected() {
        let hub = Hub::new(Config::default());
        let collaborators = test_collaborators().await;
        let _alice = login(&hub, "alice");
        let bob = login(&hub, "bob");

        let err = handle_takeback(
            &hub,
            &collaborators,
            &bob,
            Envelope {
                message_id: Some(42),
                ..Envelope::new(Action::Takeback)
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_envelope().is_some());
    }

    #[tokio::test]
    async fn censoring_filter_replaces_matched_span_and_stops_forwarding() {
        let mut config = Config::default();
        config.message_filters.push(MessageFilterConfig {
            enabled: true,
            phrases: vec![r"\bbad\b".to_string()],
            scope: FilterScope::Both,
            censor_message: true,
            forward_message: false,
            report_message: false,
            chat_server_response: "watch it".to_string(),
        });
        let hub = Hub::new(config);
        let collaborators = test_collaborators().await;
        let alice = login(&hub, "alice");

        handle_message(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("lobby".to_string()),
                message: Some("that is bad".to_string()),
                ..Envelope::new(Action::Message)
            },
        )
        .await
        .unwrap();

        // A dropped filter match means no message id was ever minted for it.
        assert!(hub.echoes.collect_excluding(&Default::default()).is_empty());
    }

    #[tokio::test]
    async fn no_image_rule_rejects_a_file_upload() {
        let mut config = Config::default();
        config.moderation_rules.push(ModerationRuleConfig {
            username: "alice".to_string(),
            camera_always_nsfw: false,
            disable_camera: false,
            no_broadcast: false,
            no_video: false,
            no_image: true,
            no_dark_video: false,
        });
        let hub = Hub::new(config);
        let collaborators = test_collaborators().await;
        let alice = login(&hub, "alice");

        let err = handle_file(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("lobby".to_string()),
                description: Some("image/png".to_string()),
                bytes: Some("AAAA".to_string()),
                ..Envelope::new(Action::File)
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_envelope().is_some());
    }
}
