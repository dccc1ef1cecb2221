//! Per-connection subscriber state.
//!
//! One [`Subscriber`] exists per live connection, authenticated or not. It
//! owns no pointer back to the [`crate::state::Hub`] — removal is a hub-level
//! operation invoked through a `close_slow` callback captured at construction
//! time, which keeps teardown a one-directional call instead of a cycle.

use crate::message::{video_flags, ChatStatus, Envelope};
use crate::state::moderation::JwtRule;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Outbox capacity; the single backpressure tunable.
pub const OUTBOX_CAPACITY: usize = 32;

/// Which transport front-end owns this subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Socket,
    Poll,
}

/// Callback invoked (off the hub lock) when a subscriber's outbox overflows.
/// Captured once at subscriber construction; see module docs.
pub type CloseSlow = Arc<dyn Fn() + Send + Sync>;

/// The three privacy sets, sharing one reader-writer lock.
#[derive(Debug, Default)]
pub struct PrivacySets {
    pub muted: HashSet<String>,
    pub blocked: HashSet<String>,
    pub booted: HashSet<String>,
}

/// Display fields populated from validated JWT claims (or left empty for an
/// unauthenticated / tokenless session).
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub nickname: String,
    pub avatar: String,
    pub profile_url: String,
    pub emoji: String,
    pub gender: String,
    pub is_admin: bool,
    pub is_vip: bool,
    /// Rule tokens carried on the validated login JWT, re-applied every time
    /// a fresh `me` is evaluated; empty for tokenless sessions.
    pub jwt_rules: Vec<JwtRule>,
}

pub struct Subscriber {
    pub id: u64,

    /// Set once on successful login; empty before authentication.
    username: RwLock<String>,

    pub profile: RwLock<Profile>,

    authenticated: AtomicBool,
    video_flags: AtomicU8,
    chat_status: RwLock<ChatStatus>,
    dnd: AtomicBool,
    login_at: RwLock<i64>,

    privacy: RwLock<PrivacySets>,

    owned_message_ids: Mutex<HashSet<i64>>,

    outbox_tx: mpsc::Sender<String>,
    close_slow: CloseSlow,

    pub transport: TransportKind,

    /// Poll transport only.
    pub session_id: RwLock<Option<String>>,
    pub last_poll_at: Mutex<Instant>,

    /// Admin opt-out of being blocked.
    unblockable: AtomicBool,
}

impl Subscriber {
    pub fn new(
        id: u64,
        transport: TransportKind,
        close_slow: CloseSlow,
    ) -> (Arc<Subscriber>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let sub = Subscriber {
            id,
            username: RwLock::new(String::new()),
            profile: RwLock::new(Profile::default()),
            authenticated: AtomicBool::new(false),
            video_flags: AtomicU8::new(0),
            chat_status: RwLock::new(ChatStatus::Online),
            dnd: AtomicBool::new(false),
            login_at: RwLock::new(0),
            privacy: RwLock::new(PrivacySets::default()),
            owned_message_ids: Mutex::new(HashSet::new()),
            outbox_tx: tx,
            close_slow,
            transport,
            session_id: RwLock::new(None),
            last_poll_at: Mutex::new(Instant::now()),
            unblockable: AtomicBool::new(false),
        };
        (Arc::new(sub), rx)
    }

    pub fn username(&self) -> String {
        self.username.read().clone()
    }

    pub fn set_username(&self, name: impl Into<String>) {
        *self.username.write() = name.into();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn mark_authenticated(&self) {
        let was_authenticated = self.authenticated.swap(true, Ordering::AcqRel);
        if !was_authenticated {
            crate::metrics::AUTHENTICATED_SUBSCRIBERS.inc();
        }
        *self.login_at.write() = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
    }

    /// Marks the subscriber unauthenticated without removing it from the
    /// hub; used by the poll idle-kicker which must still broadcast the exit
    /// presence before the hub entry is dropped.
    pub fn mark_unauthenticated(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    pub fn login_at(&self) -> i64 {
        *self.login_at.read()
    }

    pub fn video_flags(&self) -> u8 {
        self.video_flags.load(Ordering::Acquire)
    }

    pub fn set_video_flags(&self, flags: u8) {
        self.video_flags.store(flags, Ordering::Release);
    }

    pub fn has_video_flag(&self, bit: u8) -> bool {
        video_flags::has(self.video_flags(), bit)
    }

    pub fn chat_status(&self) -> ChatStatus {
        *self.chat_status.read()
    }

    pub fn set_chat_status(&self, status: ChatStatus) {
        *self.chat_status.write() = status;
    }

    pub fn dnd(&self) -> bool {
        self.dnd.load(Ordering::Acquire)
    }

    pub fn set_dnd(&self, dnd: bool) {
        self.dnd.store(dnd, Ordering::Release);
    }

    pub fn is_admin(&self) -> bool {
        self.profile.read().is_admin
    }

    pub fn is_vip(&self) -> bool {
        self.profile.read().is_vip
    }

    pub fn is_unblockable(&self) -> bool {
        self.unblockable.load(Ordering::Acquire)
    }

    pub fn set_unblockable(&self, value: bool) {
        self.unblockable.store(value, Ordering::Release);
    }

    pub fn is_visible(&self) -> bool {
        self.is_authenticated() && self.chat_status() != ChatStatus::Hidden
    }

    // -- Privacy sets (strictly additive within a session; cleared only on reconnect) --

    pub fn mute(&self, username: &str) {
        self.privacy.write().muted.insert(username.to_string());
    }

    pub fn unmute(&self, username: &str) {
        self.privacy.write().muted.remove(username);
    }

    pub fn mutes(&self, username: &str) -> bool {
        self.privacy.read().muted.contains(username)
    }

    pub fn boot(&self, username: &str) {
        self.privacy.write().booted.insert(username.to_string());
    }

    pub fn unboot(&self, username: &str) {
        self.privacy.write().booted.remove(username);
    }

    pub fn boots(&self, username: &str) -> bool {
        self.privacy.read().booted.contains(username)
    }

    pub fn block(&self, username: &str) {
        self.privacy.write().blocked.insert(username.to_string());
    }

    pub fn blocked_usernames(&self) -> HashSet<String> {
        self.privacy.read().blocked.clone()
    }

    pub fn muted_usernames(&self) -> HashSet<String> {
        self.privacy.read().muted.clone()
    }

    pub fn has_blocked(&self, username: &str) -> bool {
        self.privacy.read().blocked.contains(username)
    }

    /// Clears all privacy sets; used only in tests and never on a live
    /// session.
    #[cfg(test)]
    pub fn clear_privacy_sets(&self) {
        let mut p = self.privacy.write();
        p.muted.clear();
        p.blocked.clear();
        p.booted.clear();
    }

    // -- Owned message ids --

    pub fn own_message(&self, id: i64) {
        self.owned_message_ids.lock().insert(id);
    }

    pub fn owns_message(&self, id: i64) -> bool {
        self.owned_message_ids.lock().contains(&id)
    }

    pub fn forget_message(&self, id: i64) {
        self.owned_message_ids.lock().remove(&id);
    }

    // -- Outbound queue --

    /// Serializes `env` once and performs a non-blocking enqueue. On
    /// overflow, asynchronously invokes `close_slow`; the caller must not be
    /// holding the hub lock when this is called.
    pub fn send(&self, env: &Envelope) {
        let payload = match serde_json::to_string(env) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, subscriber = self.id, "failed to serialize outgoing envelope");
                return;
            }
        };
        self.send_raw(payload);
    }

    /// Enqueues an already-serialized payload (used by the poll/echo paths
    /// that batch several envelopes under one lock acquisition).
    pub fn send_raw(&self, payload: String) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.outbox_tx.try_send(payload) {
            tracing::warn!(subscriber = self.id, username = %self.username(), "outbox overflow, tearing down subscriber");
            crate::metrics::OUTBOX_OVERFLOWS.inc();
            let close_slow = self.close_slow.clone();
            tokio::spawn(async move {
                close_slow();
            });
        }
    }

    pub fn chat_server(&self, message: impl Into<String>) {
        self.send(&Envelope::chat_server_error(message));
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("username", &self.username())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subscriber() -> (Arc<Subscriber>, mpsc::Receiver<String>) {
        Subscriber::new(1, TransportKind::Socket, Arc::new(|| {}))
    }

    #[test]
    fn fresh_subscriber_is_unauthenticated_and_invisible() {
        let (sub, _rx) = test_subscriber();
        assert!(!sub.is_authenticated());
        assert!(!sub.is_visible());
    }

    #[test]
    fn authenticating_makes_it_visible_unless_hidden() {
        let (sub, _rx) = test_subscriber();
        sub.mark_authenticated();
        assert!(sub.is_visible());
        sub.set_chat_status(ChatStatus::Hidden);
        assert!(!sub.is_visible());
    }

    #[test]
    fn privacy_sets_are_additive() {
        let (sub, _rx) = test_subscriber();
        sub.mute("bob");
        sub.mute("carol");
        assert!(sub.mutes("bob"));
        assert!(sub.mutes("carol"));
        sub.unmute("bob");
        assert!(!sub.mutes("bob"));
        assert!(sub.mutes("carol"));
    }

    #[tokio::test]
    async fn outbox_overflow_triggers_close_slow() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let (sub, mut rx) = Subscriber::new(
            1,
            TransportKind::Socket,
            Arc::new(move || {
                called2.store(true, Ordering::SeqCst);
            }),
        );

        for _ in 0..OUTBOX_CAPACITY {
            sub.send(&Envelope::chat_server_error("hi"));
        }
        // Outbox is now full; one more send should trip close_slow.
        sub.send(&Envelope::chat_server_error("overflow"));

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(called.load(Ordering::SeqCst));

        // Drain so the channel isn't dropped with pending sends under test.
        while rx.try_recv().is_ok() {}
    }
}
