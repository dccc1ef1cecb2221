//! Cached pre-sync blocklist.
//!
//! The admin control plane can push a username's block list ahead of time
//! (e.g. synchronizing from an external account system); it takes effect the
//! next time that username connects and authenticates.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct BlocklistCache {
    entries: DashMap<String, Vec<String>>,
}

impl BlocklistCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, username: &str, blocked: Vec<String>) {
        self.entries.insert(username.to_string(), blocked);
    }

    /// Returns and removes the cached list for `username`, applied exactly
    /// once at login.
    pub fn take(&self, username: &str) -> Option<Vec<String>> {
        self.entries.remove(username).map(|(_, v)| v)
    }
}
