//! Login, presence, roster, and identity-resolution end-to-end flows.

mod common;

use barertc::collaborators::jwt::Claims;
use barertc::config::Config;
use barertc::message::{Action, Envelope};
use barertc::state::TransportKind;
use common::{drain, hub_with, login, test_collaborators};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[tokio::test]
async fn first_login_gets_a_welcome_me_and_roster() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (alice, mut rx) = login(&hub, &collaborators, "alice").await;

    assert_eq!(alice.username(), "alice");
    assert!(alice.is_authenticated());

    // login() already drained the initial burst; a fresh who_list broadcast
    // fires for every connected subscriber whenever the roster changes, so
    // logging in a second person refreshes alice's view too.
    let (_bob, _rx2) = login(&hub, &collaborators, "bob").await;
    let envelopes = drain(&mut rx);
    assert!(envelopes.iter().any(|e| e.action() == Action::Who));
}

#[tokio::test]
async fn colliding_username_is_renamed_with_a_numeric_suffix() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let (_alice, _rx1) = login(&hub, &collaborators, "alice").await;
    let (second, _rx2) = login(&hub, &collaborators, "alice").await;

    assert_eq!(second.username(), "alice 2");
    // The original holder keeps its name; resolution never collides two
    // authenticated sessions onto the same username.
    assert_eq!(hub.authenticated_snapshot().len(), 2);
}

#[tokio::test]
async fn matching_jwt_subject_displaces_the_existing_session() {
    let mut config = Config::default();
    config.jwt.secret = "shared-secret".to_string();
    let hub = hub_with(config);
    let collaborators_with_secret = barertc::collaborators::Collaborators {
        jwt: barertc::collaborators::JwtValidator::new("shared-secret"),
        webhook: barertc::collaborators::WebhookClient::new(),
        image: barertc::collaborators::ImageProcessor::default(),
        history: barertc::collaborators::HistoryStore::connect(false, "unused.db").await.unwrap(),
    };

    let (first, mut first_rx) = hub.add(TransportKind::Socket, Arc::new(|| {}));
    barertc::handlers::dispatch(
        &hub,
        &collaborators_with_secret,
        &first,
        Envelope {
            username: Some("alice".to_string()),
            ..Envelope::new(Action::Login)
        },
    )
    .await
    .unwrap();
    drain(&mut first_rx);

    let exp = (SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600) as usize;
    let claims = Claims {
        sub: "alice".to_string(),
        op: false,
        vip: false,
        nick: String::new(),
        avatar: String::new(),
        profile_url: String::new(),
        emoji: String::new(),
        gender: String::new(),
        rules: vec![],
        exp,
    };
    let token = collaborators_with_secret.jwt.resign(&claims).unwrap();

    let (second, mut second_rx) = hub.add(TransportKind::Socket, Arc::new(|| {}));
    barertc::handlers::dispatch(
        &hub,
        &collaborators_with_secret,
        &second,
        Envelope {
            username: Some("alice".to_string()),
            jwt: Some(token),
            ..Envelope::new(Action::Login)
        },
    )
    .await
    .unwrap();

    assert_eq!(second.username(), "alice");
    // The displaced session was told it was signed out and pushed a
    // disconnect, and the hub no longer counts it among authenticated users.
    let first_envelopes = drain(&mut first_rx);
    assert!(first_envelopes.iter().any(|e| e.action() == Action::Disconnect));
    assert_eq!(hub.authenticated_snapshot().len(), 1);
    drain(&mut second_rx);
}

#[tokio::test]
async fn unique_username_resolution_never_produces_a_duplicate_across_many_collisions() {
    let hub = hub_with(Config::default());
    let collaborators = test_collaborators().await;
    let mut names = Vec::new();
    for _ in 0..10 {
        let (sub, _rx) = login(&hub, &collaborators, "crowd").await;
        names.push(sub.username());
    }
    let unique: std::collections::HashSet<_> = names.iter().cloned().collect();
    assert_eq!(unique.len(), names.len(), "every resolved username must be distinct: {names:?}");
}
