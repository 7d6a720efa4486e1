//! Markdown to HTML with line breaks preserved.

use pulldown_cmark::{html, Event, Options, Parser};

/// Render markdown, treating every newline as a hard break so short
/// chat-style posts keep their line structure.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_newlines_become_breaks() {
        let out = render_markdown("一行目\n二行目");
        assert!(out.contains("<br"), "got {out}");
        assert!(out.contains("一行目"));
        assert!(out.contains("二行目"));
    }

    #[test]
    fn bold_and_lists_render() {
        let out = render_markdown("**強調**\n\n- a\n- b");
        assert!(out.contains("<strong>強調</strong>"));
        assert!(out.contains("<ul>"));
        assert!(out.contains("<li>a</li>"));
    }

    #[test]
    fn link_markup_becomes_anchor() {
        // Non-ASCII path segments come out percent-encoded.
        let out = render_markdown("[@田中](https://kairan.test/user/田中)さん");
        assert!(out.contains("<a href=\"https://kairan.test/user/"));
        assert!(out.contains(">@田中</a>さん"));
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(render_markdown(""), "");
    }
}
