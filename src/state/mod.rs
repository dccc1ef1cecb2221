//! Shared, concurrency-safe chat state.

pub mod ban;
pub mod blocklist;
pub mod echo;
pub mod hub;
pub mod moderation;
pub mod subscriber;
pub mod uid;

pub use ban::BanManager;
pub use blocklist::BlocklistCache;
pub use echo::{EchoManager, MessageContextManager};
pub use hub::Hub;
pub use subscriber::{Profile, Subscriber, TransportKind};
