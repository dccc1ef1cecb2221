//! Public broadcast, mute suppression, DM delivery/DND, and server-side
//! filters, exercised through dispatch end to end.

mod common;

use barertc::config::{Config, FilterScope, MessageFilterConfig};
use barertc::message::{Action, Envelope};
use common::{drain, drain_messages, hub_with, login, test_collaborators};

#[tokio::test]
async fn public_broadcast_is_suppressed_for_a_muting_recipient() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    alice.mute("bob");

    barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &bob,
        Envelope {
            channel: Some("lobby".to_string()),
            message: Some("hello".to_string()),
            ..Envelope::new(Action::Message)
        },
    )
    .await
    .unwrap();

    // Alice muted bob: she gets nothing. Bob still sees his own message echoed
    // back by the broadcast fan-out.
    assert!(drain_messages(&mut alice_rx).is_empty());
    assert!(!drain_messages(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn direct_message_is_delivered_to_both_sender_and_recipient() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &alice,
        Envelope {
            channel: Some("@bob".to_string()),
            message: Some("hi bob".to_string()),
            ..Envelope::new(Action::Message)
        },
    )
    .await
    .unwrap();

    let alice_seen = drain_messages(&mut alice_rx);
    let bob_seen = drain_messages(&mut bob_rx);
    assert_eq!(alice_seen.len(), 1);
    assert_eq!(bob_seen.len(), 1);
    assert_eq!(alice_seen[0].message.as_deref(), Some("hi bob"));
    assert_eq!(bob_seen[0].message.as_deref(), Some("hi bob"));
    assert_eq!(alice_seen[0].message_id, bob_seen[0].message_id);
}

#[tokio::test]
async fn direct_message_to_a_dnd_user_is_rejected_and_not_delivered() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    bob.set_dnd(true);
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let result = barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &alice,
        Envelope {
            channel: Some("@bob".to_string()),
            message: Some("you there?".to_string()),
            ..Envelope::new(Action::Message)
        },
    )
    .await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_envelope().is_some());
    assert!(drain_messages(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn message_ids_climb_monotonically_across_unrelated_sends() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    drain(&mut alice_rx);

    let mut ids = Vec::new();
    for body in ["one", "two", "three"] {
        barertc::handlers::dispatch(
            &hub,
            &collaborators,
            &alice,
            Envelope {
                channel: Some("lobby".to_string()),
                message: Some(body.to_string()),
                ..Envelope::new(Action::Message)
            },
        )
        .await
        .unwrap();
    }
    for env in drain_messages(&mut alice_rx) {
        ids.push(env.message_id.unwrap());
    }
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|pair| pair[1] > pair[0]), "ids must be strictly increasing: {ids:?}");
}

#[tokio::test]
async fn censoring_filter_replaces_the_match_and_is_echoed_only_to_the_author() {
    let mut config = Config::default();
    config.message_filters.push(MessageFilterConfig {
        enabled: true,
        phrases: vec![r"\bbad\b".to_string()],
        scope: FilterScope::Both,
        censor_message: true,
        forward_message: false,
        report_message: false,
        chat_server_response: "watch your language".to_string(),
    });
    let hub = hub_with(config);
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    barertc::handlers::dispatch(
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

    let alice_envelopes = drain(&mut alice_rx);
    let alice_seen: Vec<_> = alice_envelopes.iter().filter(|e| e.action() == Action::Message).collect();
    assert_eq!(alice_seen.len(), 1);
    assert_eq!(alice_seen[0].message.as_deref(), Some("that is ***"));
    assert!(alice_envelopes.iter().any(|e| e.action() == Action::Error));

    // Bob never gets it at all: a non-forwarding filter stops the message
    // from reaching the public broadcast entirely.
    assert!(drain_messages(&mut bob_rx).is_empty());
}
