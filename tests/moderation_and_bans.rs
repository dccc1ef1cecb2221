//! Operator slash-commands and ban enforcement, exercised as an admin sender
//! would trigger them through ordinary `message` envelopes.

mod common;

use barertc::config::Config;
use barertc::message::{Action, Envelope};
use common::{drain, hub_with, login, test_collaborators};

async fn send_as_command(
    hub: &barertc::state::Hub,
    collaborators: &barertc::collaborators::Collaborators,
    sub: &std::sync::Arc<barertc::state::Subscriber>,
    command: &str,
) {
    barertc::handlers::dispatch(
        hub,
        collaborators,
        sub,
        Envelope {
            channel: Some("lobby".to_string()),
            message: Some(command.to_string()),
            ..Envelope::new(Action::Message)
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn kick_command_from_a_non_admin_is_broadcast_as_an_ordinary_chat_message() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    send_as_command(&hub, &collaborators, &alice, "/kick bob").await;

    // Alice isn't an operator: the slash-command path is never consulted, so
    // bob is still registered and the text went out as a normal message.
    assert!(hub.get("bob").is_some());
    let bob_envelopes = drain(&mut bob_rx);
    assert!(bob_envelopes.iter().any(|e| e.action() == Action::Message));
}

#[tokio::test]
async fn admin_kick_removes_the_target_and_the_room_sees_a_departure() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (admin, mut admin_rx) = login(&hub, &collaborators, "root").await;
    admin.profile.write().is_admin = true;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut admin_rx);
    drain(&mut bob_rx);

    send_as_command(&hub, &collaborators, &admin, "/kick bob").await;

    assert!(hub.get("bob").is_none());
    let admin_envelopes = drain(&mut admin_rx);
    assert!(admin_envelopes.iter().any(|e| e.action() == Action::Error));
}

#[tokio::test]
async fn banned_username_cannot_log_back_in_until_the_ban_is_lifted() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (admin, mut admin_rx) = login(&hub, &collaborators, "root").await;
    admin.profile.write().is_admin = true;
    let (bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut admin_rx);
    drain(&mut bob_rx);

    send_as_command(&hub, &collaborators, &admin, "/ban bob 1").await;
    assert!(hub.bans.is_banned("bob"));
    drop(bob);

    let (reconnect, _rx) = hub.add(barertc::state::TransportKind::Socket, std::sync::Arc::new(|| {}));
    let result = barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &reconnect,
        Envelope {
            username: Some("bob".to_string()),
            ..Envelope::new(Action::Login)
        },
    )
    .await;
    assert!(result.is_err());
    assert!(!reconnect.is_authenticated());

    send_as_command(&hub, &collaborators, &admin, "/unban bob").await;
    assert!(!hub.bans.is_banned("bob"));
}

#[tokio::test]
async fn kickall_during_the_startup_quiet_period_disconnects_everyone_silently() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (admin, mut admin_rx) = login(&hub, &collaborators, "root").await;
    admin.profile.write().is_admin = true;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut admin_rx);
    drain(&mut bob_rx);

    send_as_command(&hub, &collaborators, &admin, "/kickall").await;

    let bob_envelopes = drain(&mut bob_rx);
    assert!(bob_envelopes.iter().any(|e| e.action() == Action::Disconnect));
    // The quiet period swallows presence spam even for a mass kick.
    assert!(bob_envelopes.iter().all(|e| e.action() != Action::Presence));
    assert_eq!(hub.authenticated_snapshot().len(), 1);
}
