//! Takeback ownership rules: an author may retract their own message; nobody
//! else may, except an admin.

mod common;

use barertc::config::Config;
use barertc::message::{Action, Envelope};
use common::{drain, hub_with, login, test_collaborators};

/// Sends a public message and recovers the id the hub minted for it by
/// reading the author's own outbox, which always receives its own broadcast.
async fn send_public_and_get_id(
    hub: &barertc::state::Hub,
    collaborators: &barertc::collaborators::Collaborators,
    sub: &std::sync::Arc<barertc::state::Subscriber>,
    rx: &mut tokio::sync::mpsc::Receiver<String>,
    body: &str,
) -> i64 {
    barertc::handlers::dispatch(
        hub,
        collaborators,
        sub,
        Envelope {
            channel: Some("lobby".to_string()),
            message: Some(body.to_string()),
            ..Envelope::new(Action::Message)
        },
    )
    .await
    .unwrap();
    let envelopes = drain(rx);
    envelopes
        .into_iter()
        .find(|e| e.action() == Action::Message)
        .and_then(|e| e.message_id)
        .expect("public message broadcasts with a messageID")
}

#[tokio::test]
async fn author_can_take_back_their_own_message_and_it_is_broadcast_to_everyone() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (_bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let message_id = send_public_and_get_id(&hub, &collaborators, &alice, &mut alice_rx, "oops").await;
    drain(&mut bob_rx);

    barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &alice,
        Envelope {
            message_id: Some(message_id),
            ..Envelope::new(Action::Takeback)
        },
    )
    .await
    .unwrap();

    let bob_envelopes = drain(&mut bob_rx);
    let takeback = bob_envelopes.iter().find(|e| e.action() == Action::Takeback).unwrap();
    assert_eq!(takeback.message_id, Some(message_id));
    assert!(!alice.owns_message(message_id));
}

#[tokio::test]
async fn a_non_author_non_admin_cannot_take_back_someone_elses_message() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut alice_rx) = login(&hub, &collaborators, "alice").await;
    let (bob, mut bob_rx) = login(&hub, &collaborators, "bob").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let message_id = send_public_and_get_id(&hub, &collaborators, &alice, &mut alice_rx, "mine").await;
    drain(&mut bob_rx);

    let result = barertc::handlers::dispatch(
        &hub,
        &collaborators,
        &bob,
        Envelope {
            message_id: Some(message_id),
            ..Envelope::new(Action::Takeback)
        },
    )
    .await;

    assert!(result.is_err());
    assert!(alice.owns_message(message_id));
}
