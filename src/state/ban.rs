//! In-memory, TTL'd username ban list.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct Ban {
    pub username: String,
    pub expires_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct BanManager {
    bans: RwLock<HashMap<String, Ban>>,
}

impl BanManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&self, username: &str, duration: Duration) {
        self.bans.write().insert(
            username.to_string(),
            Ban {
                username: username.to_string(),
                expires_at: SystemTime::now() + duration,
            },
        );
    }

    /// Lifts a ban early. Returns whether one was present.
    pub fn unban(&self, username: &str) -> bool {
        self.bans.write().remove(username).is_some()
    }

    /// Checks whether `username` is currently banned, lazily evicting the
    /// entry if its TTL has elapsed.
    pub fn is_banned(&self, username: &str) -> bool {
        let mut bans = self.bans.write();
        if let Some(ban) = bans.get(username) {
            if SystemTime::now() > ban.expires_at {
                bans.remove(username);
                return false;
            }
            return true;
        }
        false
    }

    pub fn list(&self) -> Vec<Ban> {
        self.bans.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_and_unban_round_trip() {
        let mgr = BanManager::new();
        assert!(!mgr.is_banned("alice"));
        mgr.ban("alice", Duration::from_secs(60));
        assert!(mgr.is_banned("alice"));
        assert!(mgr.unban("alice"));
        assert!(!mgr.is_banned("alice"));
    }

    #[test]
    fn expired_ban_is_lazily_evicted() {
        let mgr = BanManager::new();
        mgr.ban("bob", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!mgr.is_banned("bob"));
        assert!(mgr.list().is_empty());
    }
}
