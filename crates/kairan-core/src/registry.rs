//! Tag registry: create-or-reuse tagging with recency bookkeeping.

use crate::error::StoreResult;
use crate::traits::CommunityStore;
use crate::types::{normalize_tag_names, Tag};
use chrono::Utc;
use tracing::debug;

/// Resolve a comma-separated tag-name string into persisted tags.
///
/// Each trimmed, non-empty name is looked up by exact match and created
/// on first use; existing tags get their `last_used` refreshed. Input
/// duplicates collapse to one entity and the result keeps first-occurrence
/// order. Empty input yields an empty vec.
pub fn resolve_tags(store: &dyn CommunityStore, comma_separated: &str) -> StoreResult<Vec<Tag>> {
    let names = normalize_tag_names(comma_separated);
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let mut tags = Vec::with_capacity(names.len());
    for name in &names {
        tags.push(store.fetch_or_create_tag(name, now)?);
    }
    debug!(count = tags.len(), "resolved tag names");
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    #[test]
    fn creates_then_reuses() {
        let store = MemoryStore::new();
        let first = resolve_tags(&store, "ロボ部, 3年").unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "ロボ部");
        assert_eq!(first[1].name, "3年");

        let second = resolve_tags(&store, "3年").unwrap();
        assert_eq!(second[0].id, first[1].id, "same name resolves to same row");
        assert!(second[0].last_used >= first[1].last_used);
    }

    #[test]
    fn duplicates_collapse_preserving_first_position() {
        let store = MemoryStore::new();
        let tags = resolve_tags(&store, "a, b, a, c, b").unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let store = MemoryStore::new();
        assert!(resolve_tags(&store, "").unwrap().is_empty());
        assert!(resolve_tags(&store, " ,  , ").unwrap().is_empty());
    }
}
