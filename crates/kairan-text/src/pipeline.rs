//! Raw text to safe HTML, with the mentions found along the way.

use crate::autolink::autolink_html;
use crate::markdown::render_markdown;
use crate::mentions::{resolve_mentions, MentionLookup};
use crate::sanitize::sanitize_html;
use kairan_core::ProfileLinks;

/// Safe HTML plus the usernames the mention pass resolved, so the
/// caller can hand them to the notification engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub html: String,
    pub mentions: Vec<String>,
}

/// Full rendering pipeline, strictly ordered: mention substitution,
/// markdown conversion, auto-linking, sanitization. Best-effort by
/// contract; it never fails, and empty input yields empty output.
pub fn render_safe_html(
    raw: &str,
    lookup: &dyn MentionLookup,
    links: &dyn ProfileLinks,
) -> RenderedContent {
    if raw.is_empty() {
        return RenderedContent {
            html: String::new(),
            mentions: Vec::new(),
        };
    }

    let resolved = resolve_mentions(raw, lookup, links);
    let html = render_markdown(&resolved.markdown);
    let html = autolink_html(&html);
    let html = sanitize_html(&html);

    RenderedContent {
        html,
        mentions: resolved.mentioned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairan_core::BaseUrlLinks;
    use std::collections::BTreeSet;

    struct FixedUsers(BTreeSet<&'static str>);

    impl MentionLookup for FixedUsers {
        fn username_exists(&self, candidate: &str) -> bool {
            self.0.contains(candidate)
        }
    }

    fn links() -> BaseUrlLinks {
        BaseUrlLinks::new("https://kairan.test")
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let out = render_safe_html("", &FixedUsers([].into()), &links());
        assert_eq!(out.html, "");
        assert!(out.mentions.is_empty());
    }

    #[test]
    fn mention_and_url_scenario() {
        let users = FixedUsers(["田中"].into());
        let out = render_safe_html("@田中さん見て https://example.com", &users, &links());

        // Mention resolves to the truncated name with the honorific as
        // plain text.
        assert!(out.html.contains(">@田中</a>さん見て"));
        assert_eq!(out.mentions, vec!["田中"]);

        // The bare URL becomes a new-tab anchor.
        assert!(out
            .html
            .contains("href=\"https://example.com\" target=\"_blank\""));

        // Every anchor in the output opens in a new tab, the mention
        // link included.
        let anchors = out.html.matches("<a ").count();
        let blank = out.html.matches("target=\"_blank\"").count();
        assert_eq!(anchors, 2);
        assert_eq!(blank, 2);
    }

    #[test]
    fn hostile_markup_is_neutralized() {
        let users = FixedUsers([].into());
        let out = render_safe_html(
            "<script>alert(1)</script><p onclick=\"x()\">本文</p>",
            &users,
            &links(),
        );
        assert!(!out.html.contains("script"));
        assert!(!out.html.contains("onclick"));
        assert!(out.html.contains("本文"));
    }

    #[test]
    fn code_block_url_is_not_linkified() {
        let users = FixedUsers([].into());
        let out = render_safe_html("`https://example.com`", &users, &links());
        assert!(out.html.contains("<code>"));
        assert!(!out.html.contains("<a "));
    }

    #[test]
    fn line_breaks_survive_the_pipeline() {
        let users = FixedUsers([].into());
        let out = render_safe_html("一行目\n二行目", &users, &links());
        assert!(out.html.contains("<br"));
    }
}
