//! Text pipeline: user-authored markup to safe HTML.
//!
//! Four ordered passes over post, comment, and kairanban bodies:
//! `@username` mention resolution with honorific-suffix stripping,
//! markdown conversion with preserved line breaks, bare-URL
//! auto-linking outside protected regions, and allow-list HTML
//! sanitization. The structured course-review template parser lives
//! here too.

pub mod autolink;
pub mod markdown;
pub mod mentions;
pub mod pipeline;
pub mod review;
pub mod sanitize;

pub use autolink::autolink_html;
pub use markdown::render_markdown;
pub use mentions::{resolve_mentions, MentionLookup, MentionResolution};
pub use pipeline::{render_safe_html, RenderedContent};
pub use review::{parse_review_body, review_template_body, CourseReview, ReviewBlock};
pub use sanitize::sanitize_html;
