//! Allow-list HTML sanitization.
//!
//! Last step of the rendering pipeline. Everything not on the allow
//! list is stripped with its inner text preserved, and every surviving
//! anchor is forced to open in a new tab.

use ammonia::Builder;
use once_cell::sync::Lazy;
use std::collections::HashSet;

static CLEANER: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut builder = Builder::default();
    builder
        // The defaults allow title/lang on every element; the attribute
        // allow list here is exhaustive, so clear them.
        .generic_attributes(HashSet::new())
        .tags(
            [
                "p", "br", "b", "strong", "i", "em", "ol", "ul", "li", "a", "span", "hr", "h1",
                "h2", "h3", "h4", "h5", "h6", "pre", "code", "blockquote",
            ]
            .into_iter()
            .collect(),
        )
        .tag_attributes(
            [
                ("a", ["href", "target"].into_iter().collect()),
                ("span", ["class"].into_iter().collect()),
            ]
            .into_iter()
            .collect(),
        )
        // Anchors that arrive without target still open in a new tab.
        .set_tag_attribute_value("a", "target", "_blank")
        // No rel injection; the attribute allow list above is exhaustive.
        .link_rel(None);
    builder
});

pub fn sanitize_html(html: &str) -> String {
    CLEANER.clean(html).to_string()
}
