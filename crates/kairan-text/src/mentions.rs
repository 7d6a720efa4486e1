//! `@username` mention resolution.
//!
//! Japanese text attaches honorifics directly to the name (`@田中さん`),
//! so a token that does not match a username as written is retried with
//! trailing characters stripped one at a time. The longest remaining
//! candidate wins and the stripped suffix stays behind as plain text.

use kairan_core::{CommunityStore, ProfileLinks};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

// \w is unicode-aware, so one run covers ASCII and CJK names alike.
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

/// Username existence check behind the mention pass.
///
/// Resolution is best-effort by contract, so the check is infallible;
/// implementations log and absorb backend errors.
pub trait MentionLookup {
    fn username_exists(&self, candidate: &str) -> bool;
}

impl<S: CommunityStore + ?Sized> MentionLookup for S {
    fn username_exists(&self, candidate: &str) -> bool {
        match self.user_by_username(candidate) {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(%err, candidate, "mention lookup failed; treating as no match");
                false
            }
        }
    }
}

/// Outcome of the mention pass over one body of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionResolution {
    /// Input text with each resolved mention rewritten as a markdown
    /// link followed by any stripped suffix as plain text.
    pub markdown: String,
    /// Resolved usernames in first-occurrence order, deduplicated.
    pub mentioned: Vec<String>,
}

/// Rewrite `@name` tokens into profile links.
///
/// An exact username match wins outright; otherwise trailing characters
/// are stripped one at a time down to a single-character candidate. A
/// token that never matches is left untouched.
pub fn resolve_mentions(
    text: &str,
    lookup: &dyn MentionLookup,
    links: &dyn ProfileLinks,
) -> MentionResolution {
    let mut markdown = String::with_capacity(text.len());
    let mut mentioned: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in MENTION_RE.captures_iter(text) {
        let token = caps.get(0).map(|m| (m.start(), m.end()));
        let candidate = caps.get(1).map(|m| m.as_str());
        let (Some((start, end)), Some(candidate)) = (token, candidate) else {
            continue;
        };

        markdown.push_str(&text[last..start]);
        match resolve_candidate(candidate, lookup) {
            Some((name, suffix)) => {
                markdown.push_str(&format!("[@{name}]({})", links.profile_url(name)));
                markdown.push_str(suffix);
                if !mentioned.iter().any(|m| m == name) {
                    mentioned.push(name.to_string());
                }
            }
            None => markdown.push_str(&text[start..end]),
        }
        last = end;
    }
    markdown.push_str(&text[last..]);

    MentionResolution { markdown, mentioned }
}

/// Longest prefix of `candidate` naming a real user, with the stripped
/// suffix. The loop stops before the candidate erodes to nothing.
fn resolve_candidate<'a>(
    candidate: &'a str,
    lookup: &dyn MentionLookup,
) -> Option<(&'a str, &'a str)> {
    if lookup.username_exists(candidate) {
        return Some((candidate, ""));
    }
    let boundaries: Vec<usize> = candidate.char_indices().map(|(i, _)| i).collect();
    for &cut in boundaries.iter().skip(1).rev() {
        let (name, suffix) = candidate.split_at(cut);
        if lookup.username_exists(name) {
            return Some((name, suffix));
        }
    }
    None
}
