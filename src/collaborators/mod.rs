//! Interfaces to systems that sit outside the chat hub's core: JWT
//! validation, Markdown rendering, image transforms, webhook callouts, and
//! DM history persistence. Each is a small concrete struct, constructed for
//! real in both production and tests, matching what the external site is
//! expected to provide.

pub mod history;
pub mod jwt;
pub mod markdown;
pub mod media;
pub mod webhook;

pub use history::HistoryStore;
pub use jwt::JwtValidator;
pub use markdown::render_and_sanitize;
pub use media::ImageProcessor;
pub use webhook::WebhookClient;

/// Bundles every external-system collaborator so handlers take one
/// argument instead of four.
pub struct Collaborators {
    pub jwt: JwtValidator,
    pub webhook: WebhookClient,
    pub image: ImageProcessor,
    pub history: HistoryStore,
}
