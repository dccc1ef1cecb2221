//! Recent-message replay for newly joined/reconnected subscribers, and the
//! short conversational context cache used by `/report`.

use crate::message::Envelope;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Manages the per-channel echo buffer (messages replayed to new joiners).
#[derive(Debug, Default)]
pub struct EchoManager {
    /// channel id -> recent public messages, newest last.
    buffers: RwLock<HashMap<String, Vec<Envelope>>>,
}

impl EchoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `env` to `channel`'s buffer, trimming to `capacity` entries.
    pub fn push(&self, channel: &str, env: Envelope, capacity: usize) {
        if capacity == 0 {
            return;
        }
        let mut buffers = self.buffers.write();
        let buf = buffers.entry(channel.to_string()).or_default();
        buf.push(env);
        let len = buf.len();
        if len > capacity {
            buf.drain(0..(len - capacity));
        }
    }

    /// Removes every cached copy of `message_id` across all channels, used
    /// when a message is taken back.
    pub fn takeback(&self, message_id: i64) {
        let mut buffers = self.buffers.write();
        for buf in buffers.values_mut() {
            buf.retain(|m| m.message_id != Some(message_id));
        }
    }

    /// Collects all buffered messages not authored by anyone in `exclude`,
    /// across every channel, for replay in one `Echo` envelope.
    pub fn collect_excluding(&self, exclude: &HashSet<String>) -> Vec<Envelope> {
        let buffers = self.buffers.read();
        buffers
            .values()
            .flatten()
            .filter(|m| {
                m.username
                    .as_deref()
                    .map(|u| !exclude.contains(u))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}

/// Short textual conversation log per channel/DM pair, used to attach
/// context to moderation `/report` submissions.
#[derive(Debug)]
pub struct MessageContextManager {
    contexts: RwLock<HashMap<String, Vec<String>>>,
    window: usize,
}

impl MessageContextManager {
    pub fn new(window: usize) -> Self {
        MessageContextManager {
            contexts: RwLock::new(HashMap::new()),
            window,
        }
    }

    /// Appends one formatted `"username: message"` line to `channel`'s
    /// rolling window.
    pub fn push(&self, channel: &str, username: &str, message: &str) {
        let mut contexts = self.contexts.write();
        let buf = contexts.entry(channel.to_string()).or_default();
        buf.push(format!("{username}: {message}"));
        let len = buf.len();
        if len > self.window {
            buf.drain(0..(len - self.window));
        }
    }

    /// Derives a stable channel key for a DM pair, independent of who sent
    /// which message.
    pub fn dm_key(username_a: &str, username_b: &str) -> String {
        let mut pair = [username_a, username_b];
        pair.sort();
        format!("@dm:{}:{}", pair[0], pair[1])
    }

    pub fn push_dm(&self, username_a: &str, username_b: &str, sender: &str, message: &str) {
        self.push(&Self::dm_key(username_a, username_b), sender, message);
    }

    pub fn get(&self, channel: &str) -> String {
        self.contexts
            .read()
            .get(channel)
            .map(|lines| lines.join("\n\n"))
            .unwrap_or_default()
    }

    pub fn get_dm(&self, username_a: &str, username_b: &str) -> String {
        self.get(&Self::dm_key(username_a, username_b))
    }
}

impl Default for MessageContextManager {
    fn default() -> Self {
        Self::new(30)
    }
}
