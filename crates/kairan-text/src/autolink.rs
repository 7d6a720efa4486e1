//! Bare-URL auto-linking over already-rendered HTML.
//!
//! Runs after markdown conversion, so the input is a flat HTML
//! fragment. Text inside existing anchors and inside code or pre
//! blocks must not be re-linkified.

use linkify::{LinkFinder, LinkKind};
use once_cell::sync::Lazy;

static FINDER: Lazy<LinkFinder> = Lazy::new(|| {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder.url_must_have_scheme(false);
    finder
});

/// Elements whose text content is left alone.
const PROTECTED: [&str; 3] = ["a", "code", "pre"];

/// Wrap bare URLs and domain-like text in new-tab anchors.
///
/// Walks the fragment tag by tag, tracking how deep we are inside
/// protected elements; only text at depth zero is scanned.
pub fn autolink_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 64);
    let mut rest = html;
    let mut protected_depth: usize = 0;

    while let Some(lt) = rest.find('<') {
        let (text, tail) = rest.split_at(lt);
        if protected_depth == 0 {
            linkify_text(text, &mut out);
        } else {
            out.push_str(text);
        }

        let Some(gt) = tail.find('>') else {
            // Unterminated tag; the sanitizer deals with it downstream.
            out.push_str(tail);
            return out;
        };
        let tag = &tail[..=gt];
        match tag_name(tag) {
            Some((name, true)) if PROTECTED.contains(&name) => {
                protected_depth = protected_depth.saturating_sub(1);
            }
            Some((name, false)) if PROTECTED.contains(&name) => {
                protected_depth += 1;
            }
            _ => {}
        }
        out.push_str(tag);
        rest = &tail[gt + 1..];
    }

    if protected_depth == 0 {
        linkify_text(rest, &mut out);
    } else {
        out.push_str(rest);
    }
    out
}

/// Lowercased element name and whether the tag is a closing tag.
fn tag_name(tag: &str) -> Option<(&str, bool)> {
    let inner = tag.strip_prefix('<')?.strip_suffix('>')?;
    let (inner, closing) = match inner.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let end = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    if end == 0 {
        return None;
    }
    Some((&inner[..end], closing))
}

fn linkify_text(text: &str, out: &mut String) {
    let mut last = 0;
    for link in FINDER.links(text) {
        out.push_str(&text[last..link.start()]);
        let raw = link.as_str();
        let href = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        out.push_str("<a href=\"");
        out.push_str(&href);
        out.push_str("\" target=\"_blank\">");
        out.push_str(raw);
        out.push_str("</a>");
        last = link.end();
    }
    out.push_str(&text[last..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url_gets_wrapped() {
        let out = autolink_html("<p>見て https://example.com だよ</p>");
        assert!(out.contains(
            "<a href=\"https://example.com\" target=\"_blank\">https://example.com</a>"
        ));
    }

    #[test]
    fn schemeless_domain_gets_http_href() {
        let out = autolink_html("<p>example.com</p>");
        assert!(out.contains("<a href=\"http://example.com\" target=\"_blank\">example.com</a>"));
    }

    #[test]
    fn existing_anchor_text_is_untouched() {
        let html = "<p><a href=\"https://a.test\">https://a.test</a></p>";
        assert_eq!(autolink_html(html), html);
    }

    #[test]
    fn code_regions_are_untouched() {
        let html = "<p><code>curl https://example.com</code></p>";
        assert_eq!(autolink_html(html), html);
        let pre = "<pre><code>https://example.com</code></pre>";
        assert_eq!(autolink_html(pre), pre);
    }

    #[test]
    fn text_after_protected_region_is_scanned() {
        let out = autolink_html("<p><code>x</code> see example.com</p>");
        assert!(out.contains("<code>x</code>"));
        assert!(out.contains("target=\"_blank\">example.com</a>"));
    }

    #[test]
    fn plain_text_without_urls_passes_through() {
        assert_eq!(autolink_html("<p>こんにちは</p>"), "<p>こんにちは</p>");
    }
}
