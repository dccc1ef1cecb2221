//! The chat protocol envelope.
//!
//! Every client<->server exchange is a single JSON [`Envelope`], discriminated
//! by [`Action`]. Fields are sparsely populated depending on the action, so
//! nearly everything here is `Option` or defaults to empty via `serde(default)`.

use serde::{Deserialize, Serialize};

/// The action a message envelope carries. Mirrors the `action` string field
/// on the wire but gives handlers and tests an exhaustive, typed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Login,
    Message,
    File,
    Me,
    Takeback,
    React,
    Boot,
    Unboot,
    Mute,
    Unmute,
    Block,
    Blocklist,
    Report,
    Open,
    Ring,
    Candidate,
    Sdp,
    Watch,
    Unwatch,
    Typing,
    Ping,
    Presence,
    Who,
    Error,
    Disconnect,
    Cut,
    Echo,
}

/// The wire envelope. Every field besides `action` is optional and
/// `skip_serializing_if` keeps outgoing JSON minimal, matching the source
/// protocol's `omitempty` tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub action: Action,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,

    #[serde(rename = "messageID", skip_serializing_if = "Option::is_none", default)]
    pub message_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jwt: Option<String>,

    #[serde(rename = "whoList", skip_serializing_if = "Option::is_none", default)]
    pub who_list: Option<Vec<WhoListEntry>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub video: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<ChatStatus>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dnd: Option<bool>,

    #[serde(rename = "openSecret", skip_serializing_if = "Option::is_none", default)]
    pub open_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bytes: Option<String>, // base64, mirrors the original's []byte wire encoding

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usernames: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub candidate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub messages: Option<Vec<Envelope>>,
}

// `serde`'s `Default` derive on `Envelope` needs `Action` to implement
// `Default`; the chosen variant carries no meaning, it's never observed
// unconstructed because every constructor sets `action` explicitly.
impl Default for Action {
    fn default() -> Self {
        Action::Ping
    }
}

impl Envelope {
    pub fn new(action: Action) -> Self {
        Envelope {
            action,
            ..Default::default()
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Builds a `ChatServer`-attributed error envelope, the universal
    /// user-visible-feedback channel.
    pub fn chat_server_error(message: impl Into<String>) -> Self {
        Envelope {
            username: Some("ChatServer".to_string()),
            message: Some(message.into()),
            ..Envelope::new(Action::Error)
        }
    }

    /// A `ChatServer` message (e.g. a channel welcome) scoped to a channel.
    pub fn chat_server_notice(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope {
            username: Some("ChatServer".to_string()),
            channel: Some(channel.into()),
            message: Some(message.into()),
            ..Envelope::new(Action::Error)
        }
    }

    pub fn disconnect() -> Self {
        Envelope::new(Action::Disconnect)
    }

    pub fn cut() -> Self {
        Envelope::new(Action::Cut)
    }
}

/// `status` field on `me`/WhoList rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Online,
    Away,
    Hidden,
}

impl Default for ChatStatus {
    fn default() -> Self {
        ChatStatus::Online
    }
}

/// One row in a personalized WhoList roster push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhoListEntry {
    pub username: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub nickname: String,

    pub status: ChatStatus,

    pub video: u8,

    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub dnd: bool,

    #[serde(rename = "loginAt")]
    pub login_at: i64,

    #[serde(rename = "op", default)]
    pub operator: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub vip: bool,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub avatar: String,

    #[serde(rename = "profileURL", skip_serializing_if = "String::is_empty", default)]
    pub profile_url: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub emoji: String,

    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub gender: String,
}

/// The video-flag bitfield. Bits are orthogonal and every combination is
/// valid.
pub mod video_flags {
    pub const ACTIVE: u8 = 1 << 0;
    pub const NSFW: u8 = 1 << 1;
    pub const MUTED: u8 = 1 << 2;
    pub const NON_EXPLICIT: u8 = 1 << 3;
    pub const MUTUAL_REQUIRED: u8 = 1 << 4;
    pub const MUTUAL_OPEN: u8 = 1 << 5;
    pub const ONLY_VIP: u8 = 1 << 6;

    pub const ALL: u8 = ACTIVE | NSFW | MUTED | NON_EXPLICIT | MUTUAL_REQUIRED | MUTUAL_OPEN | ONLY_VIP;

    #[inline]
    pub fn has(flags: u8, bit: u8) -> bool {
        flags & bit == bit
    }
}
