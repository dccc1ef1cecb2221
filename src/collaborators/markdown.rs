//! Markdown rendering and HTML sanitization for posted messages and channel
//! welcome lines.
//!
//! The corpus this project was learned from has no dedicated HTML sanitizer
//! crate (no `ammonia` anywhere in the retrieved examples), so rather than
//! fabricate a dependency, a small denylist-based stripper runs after
//! `pulldown-cmark` render. It is deliberately conservative: raw HTML input
//! is escaped by the renderer already (`pulldown-cmark` does not pass HTML
//! blocks/inline through unless explicitly enabled, and we don't enable
//! it), so the sanitizer's job is limited to stripping `javascript:`-style
//! attribute values pulldown-cmark otherwise preserves verbatim in link
//! targets.

use pulldown_cmark::{html, Options, Parser};

const DISALLOWED_URL_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// Renders `input` as Markdown to sanitized HTML. Tables and strikethrough
/// are enabled (common in chat); raw HTML passthrough is left disabled.
pub fn render_and_sanitize(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(input, options);
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);

    strip_disallowed_url_schemes(&rendered)
}

fn strip_disallowed_url_schemes(html: &str) -> String {
    let mut out = html.to_string();
    for scheme in DISALLOWED_URL_SCHEMES {
        for quote in ['"', '\''] {
            let needle = format!("{quote}{scheme}");
            while let Some(pos) = out.find(&needle) {
                out.replace_range(pos + 1..pos + 1 + scheme.len(), "#");
            }
        }
    }
    out
}
