//! Unified error handling for the chat hub.
//!
//! Each variant knows whether it warrants a client-visible `error` envelope,
//! a `disconnect`, both, or neither (silent policy failures, async teardown).

use crate::message::Envelope;
use thiserror::Error;

/// Errors raised by action handlers while processing one envelope from an
/// authenticated or unauthenticated subscriber.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed JSON, unknown action, action attempted before login. The
    /// connection remains open.
    #[error("bad input: {0}")]
    UserInput(String),

    /// Strict JWT required and missing/invalid, banned, conflicting
    /// session. Terminates the session.
    #[error("auth error: {0}")]
    Auth(String),

    /// Mute/block/DND/view-denied. Silent when the policy is "hide",
    /// surfaced as a ChatServer error when the policy is "inform".
    #[error("policy error: {message}")]
    Policy { message: String, inform: bool },

    /// Webhook non-2xx, DM-history error, image processor failure. Logged;
    /// user gets a best-effort notice only when it affects an observable
    /// action.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl HandlerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            HandlerError::UserInput(_) => "user_input",
            HandlerError::Auth(_) => "auth",
            HandlerError::Policy { .. } => "policy",
            HandlerError::Collaborator(_) => "collaborator",
        }
    }

    /// Convert to a user-facing `error` envelope, or `None` when the error
    /// must stay silent (a non-"inform" policy failure).
    pub fn to_envelope(&self) -> Option<Envelope> {
        match self {
            HandlerError::UserInput(msg) => Some(Envelope::chat_server_error(msg.clone())),
            HandlerError::Auth(msg) => Some(Envelope::chat_server_error(msg.clone())),
            HandlerError::Policy { message, inform } => {
                if *inform {
                    Some(Envelope::chat_server_error(message.clone()))
                } else {
                    None
                }
            }
            HandlerError::Collaborator(msg) => Some(Envelope::chat_server_error(msg.clone())),
        }
    }

    /// Whether this error implies the session must be torn down
    /// (`disconnect` + removal from the hub).
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Auth(_))
    }

    pub fn policy_silent(message: impl Into<String>) -> Self {
        HandlerError::Policy {
            message: message.into(),
            inform: false,
        }
    }

    pub fn policy_inform(message: impl Into<String>) -> Self {
        HandlerError::Policy {
            message: message.into(),
            inform: true,
        }
    }
}

/// Result type for action handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised by hub-level registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("{0} is not online")]
    NotOnline(String),

    #[error("subscriber is already authenticated")]
    AlreadyAuthenticated,

    #[error("subscriber is not authenticated")]
    NotAuthenticated,
}

impl HubError {
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::NotOnline(_) => "not_online",
            HubError::AlreadyAuthenticated => "already_authenticated",
            HubError::NotAuthenticated => "not_authenticated",
        }
    }
}
