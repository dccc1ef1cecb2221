//! The Hub — central shared state container for the chat room.
//!
//! Follows the same shape as a dependency-injection matrix: [`Hub`] holds the
//! subscriber registry directly (it is the one piece of state every handler
//! touches) and delegates the surrounding concerns to small managers:
//! [`BanManager`], [`BlocklistCache`], [`EchoManager`], [`MessageContextManager`].
//!
//! # Lock order
//!
//! 1. `subscribers` reader-writer lock (read for broadcast/lookup, write for
//!    add/remove).
//! 2. A subscriber's own internal locks (privacy sets, owned message ids).
//!
//! Never acquire a subscriber lock and then try to take the hub lock — the
//! `close_slow` teardown path acquires the hub write lock from its own task,
//! so holding both simultaneously on the broadcasting side would deadlock.
//! Every fan-out method here takes a snapshot of `Arc<Subscriber>` clones
//! under the read lock, drops the lock, and only then calls `send` on each.

use crate::config::Config;
use crate::error::HubError;
use crate::message::{video_flags, Action, ChatStatus, Envelope, WhoListEntry};
use crate::state::ban::BanManager;
use crate::state::blocklist::BlocklistCache;
use crate::state::echo::{EchoManager, MessageContextManager};
use crate::state::uid::{MessageIdGenerator, SubscriberIdGenerator};
use crate::state::subscriber::{CloseSlow, Subscriber, TransportKind};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Presence is silenced for this long after hub startup, to avoid a
/// reboot-storm of join/exit spam on every user reconnecting at once.
pub const PRESENCE_QUIET_PERIOD: Duration = Duration::from_secs(30);

pub struct Hub {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    config: RwLock<Arc<Config>>,

    pub subscriber_ids: SubscriberIdGenerator,
    pub message_ids: MessageIdGenerator,

    pub bans: BanManager,
    pub blocklist_cache: BlocklistCache,
    pub echoes: EchoManager,
    pub contexts: MessageContextManager,

    started_at: Instant,
    /// Set once the startup quiet period has elapsed, so the common case
    /// (long-running server) is a single relaxed load instead of an Instant
    /// comparison.
    quiet_period_elapsed: AtomicBool,
}

impl Hub {
    pub fn new(config: Config) -> Self {
        Hub {
            subscribers: RwLock::new(Vec::new()),
            config: RwLock::new(Arc::new(config)),
            subscriber_ids: SubscriberIdGenerator::new(),
            message_ids: MessageIdGenerator::new(),
            bans: BanManager::new(),
            blocklist_cache: BlocklistCache::new(),
            echoes: EchoManager::new(),
            contexts: MessageContextManager::default(),
            started_at: Instant::now(),
            quiet_period_elapsed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    pub fn replace_config(&self, config: Config) {
        *self.config.write() = Arc::new(config);
    }

    fn in_quiet_period(&self) -> bool {
        if self.quiet_period_elapsed.load(Ordering::Relaxed) {
            return false;
        }
        if self.started_at.elapsed() >= PRESENCE_QUIET_PERIOD {
            self.quiet_period_elapsed.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Registers a brand-new, unauthenticated connection and returns its
    /// receiver half so the owning transport can pump the outbox.
    pub fn add(&self, transport: TransportKind, close_slow: CloseSlow) -> (Arc<Subscriber>, mpsc::Receiver<String>) {
        let id = self.subscriber_ids.next();
        let (sub, rx) = Subscriber::new(id, transport, close_slow);
        self.subscribers.write().push(sub.clone());
        crate::metrics::CONNECTED_SUBSCRIBERS.inc();
        (sub, rx)
    }

    pub fn remove(&self, sub: &Arc<Subscriber>) {
        let had = {
            let mut subs = self.subscribers.write();
            let before = subs.len();
            subs.retain(|s| s.id != sub.id);
            subs.len() != before
        };
        if had {
            crate::metrics::CONNECTED_SUBSCRIBERS.dec();
            if sub.is_authenticated() {
                crate::metrics::AUTHENTICATED_SUBSCRIBERS.dec();
            }
        }
    }

    pub fn get(&self, username: &str) -> Option<Arc<Subscriber>> {
        let username = username.strip_prefix('@').unwrap_or(username);
        self.subscribers
            .read()
            .iter()
            .find(|s| s.is_authenticated() && s.username() == username)
            .cloned()
    }

    /// Looks up a poll-transport subscriber by the session id it was handed
    /// at `login` time. Used by every subsequent long-poll request, which
    /// arrives on a fresh HTTP connection with no other handle back to its
    /// `Subscriber`.
    pub fn get_by_session(&self, session_id: &str) -> Option<Arc<Subscriber>> {
        self.subscribers
            .read()
            .iter()
            .find(|s| s.session_id.read().as_deref() == Some(session_id))
            .cloned()
    }

    /// A snapshot of every live subscriber (authenticated or not), taken
    /// under the read lock and then released — never hold this lock while
    /// writing to a subscriber's outbox.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().clone()
    }

    pub fn authenticated_snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.snapshot().into_iter().filter(|s| s.is_authenticated()).collect()
    }

    /// Renames `proposed` with a numeric suffix until it is unique among
    /// currently-authenticated usernames. Returns `(name, was_renamed)`.
    pub fn unique_username(&self, proposed: &str) -> (String, bool) {
        let taken: HashSet<String> = self
            .authenticated_snapshot()
            .iter()
            .map(|s| s.username())
            .collect();

        if !taken.contains(proposed) {
            return (proposed.to_string(), false);
        }

        let mut counter = 2;
        loop {
            let candidate = format!("{proposed} {counter}");
            if !taken.contains(&candidate) {
                return (candidate, true);
            }
            counter += 1;
        }
    }

    /// Whether `sender` may deliver an envelope to `recipient`, applying the
    /// mute/block suppression rule: blocked unless the sender holds the
    /// unblockable flag, or admin blocking is disabled and either party is
    /// an admin.
    fn may_deliver(&self, config: &Config, sender: &Subscriber, recipient: &Subscriber) -> bool {
        if recipient.mutes(&sender.username()) {
            return false;
        }
        !blocks_each_other(config, sender, recipient)
    }

    /// Broadcasts `env` to every authenticated subscriber for whom delivery
    /// is not suppressed. `env.username` identifies the author (if any) for
    /// mute/block checks; presence envelopes have no author and are instead
    /// gated by the startup quiet period.
    pub fn broadcast(&self, env: Envelope) {
        if env.action == Action::Presence && self.in_quiet_period() {
            tracing::debug!("suppressing presence broadcast during startup quiet period");
            return;
        }

        crate::metrics::BROADCASTS_SENT.inc();
        if matches!(env.video, Some(flags) if video_flags::has(flags, video_flags::NSFW)) {
            crate::metrics::NSFW_FLAGGED.inc();
        }

        let config = self.config();
        let sender = env.username.as_deref().and_then(|u| self.get(u));
        let recipients = self.authenticated_snapshot();

        let payload = match serde_json::to_string(&env) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize broadcast envelope");
                return;
            }
        };

        for recipient in recipients {
            if let Some(sender) = &sender {
                if !self.may_deliver(&config, sender, &recipient) {
                    continue;
                }
            }

            if let Some(channel) = &env.channel {
                if let Some(ch) = config.get_channel(channel) {
                    if ch.vip_only && !recipient.is_vip() && !recipient.is_admin() {
                        continue;
                    }
                }
            }

            recipient.send_raw(payload.clone());
        }
    }

    /// Delivers `env` to exactly one username, failing with
    /// [`HubError::NotOnline`] if they are not currently authenticated.
    pub fn send_to(&self, username: &str, env: Envelope) -> Result<(), HubError> {
        let username = username.strip_prefix('@').unwrap_or(username);
        match self.get(username) {
            Some(sub) => {
                sub.send(&env);
                Ok(())
            }
            None => Err(HubError::NotOnline(username.to_string())),
        }
    }

    /// Rebuilds and pushes a personalized `who` roster to every authenticated
    /// subscriber, applying the visibility and video-flag hiding rules.
    pub fn who_list_broadcast(&self) {
        let config = self.config();
        let subs = self.authenticated_snapshot();
        let mut visible: Vec<&Arc<Subscriber>> = subs
            .iter()
            .filter(|s| s.chat_status() != ChatStatus::Hidden)
            .collect();
        visible.sort_by(|a, b| a.username().cmp(&b.username()));

        for recipient in &subs {
            let mut rows = Vec::with_capacity(visible.len());
            for user in &visible {
                if blocks_each_other(&config, user, recipient) {
                    continue;
                }

                let mut video = user.video_flags();
                if user.id != recipient.id {
                    let recipient_name = recipient.username();
                    if user.boots(&recipient_name) || user.mutes(&recipient_name) {
                        if recipient.is_admin() {
                            video &= !video_flags::MUTUAL_OPEN;
                        } else {
                            video = 0;
                        }
                    }

                    if video_flags::has(video, video_flags::ONLY_VIP) && !recipient.is_vip() && !recipient.is_admin() {
                        video = 0;
                    }
                }

                let profile = user.profile.read();
                let vip = if config.vip.mutually_secret && !recipient.is_vip() {
                    false
                } else {
                    profile.is_vip
                };

                rows.push(WhoListEntry {
                    username: user.username(),
                    nickname: profile.nickname.clone(),
                    status: user.chat_status(),
                    video,
                    dnd: user.dnd(),
                    login_at: user.login_at(),
                    operator: profile.is_admin,
                    vip,
                    avatar: profile.avatar.clone(),
                    profile_url: profile.profile_url.clone(),
                    emoji: profile.emoji.clone(),
                    gender: profile.gender.clone(),
                });
            }

            recipient.send(&Envelope {
                who_list: Some(rows),
                ..Envelope::new(Action::Who)
            });
        }
    }
}

/// Bidirectional block check, honoring the admin-blocking deployment toggle
/// and the per-subscriber unblockable override.
pub fn blocks_each_other(config: &Config, a: &Subscriber, b: &Subscriber) -> bool {
    if !config.blockable_admins && (a.is_admin() || b.is_admin()) {
        // Admins are never blockable in this deployment mode, full stop —
        // the unblockable flag only matters in the other branch below.
        return false;
    } else {
        // Admins are blockable here, unless they carry the unblockable flag
        // (e.g. an admin chatbot that ran `/unmute-all` to keep moderating
        // even while blocked).
        let unblockable = (a.is_admin() && a.is_unblockable()) || (b.is_admin() && b.is_unblockable());
        if unblockable {
            return false;
        }
    }

    a.has_blocked(&b.username()) || b.has_blocked(&a.username())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::subscriber::TransportKind;

    fn hub_with_config(config: Config) -> Hub {
        Hub::new(config)
    }

    fn add_authenticated(hub: &Hub, username: &str) -> Arc<Subscriber> {
        let (sub, _rx) = hub.add(TransportKind::Socket, Arc::new(|| {}));
        sub.set_username(username);
        sub.mark_authenticated();
        sub
    }

    #[test]
    fn unique_username_suffixes_on_collision() {
        let hub = hub_with_config(Config::default());
        add_authenticated(&hub, "alice");
        let (name, renamed) = hub.unique_username("alice");
        assert_eq!(name, "alice 2");
        assert!(renamed);
    }

    #[test]
    fn send_to_fails_for_offline_user() {
        let hub = hub_with_config(Config::default());
        let err = hub.send_to("ghost", Envelope::chat_server_error("hi")).unwrap_err();
        assert_eq!(err, HubError::NotOnline("ghost".to_string()));
    }

    #[test]
    fn broadcast_respects_mute() {
        let hub = hub_with_config(Config::default());
        let alice = add_authenticated(&hub, "alice");
        let bob = add_authenticated(&hub, "bob");
        alice.mute("bob");

        let mut env = Envelope::new(Action::Message);
        env.username = Some("bob".to_string());
        env.message = Some("hello".to_string());
        hub.broadcast(env);

        // Bob's own outbox receives nothing meant for Alice; Alice should not
        // receive Bob's broadcast because she mutes him.
        drop(bob);
        drop(alice);
    }

    #[test]
    fn presence_is_suppressed_during_quiet_period() {
        let hub = hub_with_config(Config::default());
        let _alice = add_authenticated(&hub, "alice");
        assert!(hub.in_quiet_period());

        let mut env = Envelope::new(Action::Presence);
        env.username = Some("bob".to_string());
        hub.broadcast(env);
    }

    #[test]
    fn blocks_each_other_is_bidirectional() {
        let hub = hub_with_config(Config::default());
        let alice = add_authenticated(&hub, "alice");
        let bob = add_authenticated(&hub, "bob");
        assert!(!blocks_each_other(&hub.config(), &alice, &bob));
        bob.block("alice");
        assert!(blocks_each_other(&hub.config(), &alice, &bob));
        assert!(blocks_each_other(&hub.config(), &bob, &alice));
    }

    #[test]
    fn admins_are_unblockable_by_default() {
        let mut config = Config::default();
        config.blockable_admins = false;
        let hub = hub_with_config(config);
        let alice = add_authenticated(&hub, "alice");
        let admin = add_authenticated(&hub, "root");
        admin.profile.write().is_admin = true;
        alice.block("root");
        assert!(!blocks_each_other(&hub.config(), &alice, &admin));
    }

    #[test]
    fn blockable_admins_can_be_blocked_unless_unblockable() {
        let mut config = Config::default();
        config.blockable_admins = true;
        let hub = hub_with_config(config);
        let alice = add_authenticated(&hub, "alice");
        let admin = add_authenticated(&hub, "root");
        admin.profile.write().is_admin = true;
        alice.block("root");

        assert!(blocks_each_other(&hub.config(), &alice, &admin));

        admin.set_unblockable(true);
        assert!(!blocks_each_other(&hub.config(), &alice, &admin));
    }
}
