//! Audience resolution over status attributes and custom tags.
//!
//! The resolver answers two shapes of the same question: "which users does
//! this tag set reach" (kairanban fan-out) and, inverted, "does this tag
//! set reach this user" (per-user unread checks). Matching is exact string
//! equality against tag names; self-exclusion is the fan-out engine's
//! concern, never the resolver's.

use crate::error::StoreResult;
use crate::traits::CommunityStore;
use crate::types::{User, UserId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// Stateless resolver borrowing the store it queries.
pub struct AudienceResolver<'a> {
    store: &'a dyn CommunityStore,
}

impl<'a> AudienceResolver<'a> {
    pub fn new(store: &'a dyn CommunityStore) -> Self {
        Self { store }
    }

    /// Users reached by any of `tag_names`: the union of custom-tag
    /// holders and status-attribute matches, deduplicated.
    ///
    /// An empty tag set reaches nobody: no tags means no audience, not
    /// "everyone".
    pub fn resolve_audience(&self, tag_names: &[String]) -> StoreResult<Vec<UserId>> {
        if tag_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = BTreeSet::new();
        let mut audience = Vec::new();
        for id in self
            .store
            .users_with_custom_tag_in(tag_names)?
            .into_iter()
            .chain(self.store.users_with_status_in(tag_names)?)
        {
            if seen.insert(id) {
                audience.push(id);
            }
        }

        debug!(tags = tag_names.len(), recipients = audience.len(), "resolved audience");
        Ok(audience)
    }

    /// All tag names attached to the user: the five status attributes
    /// plus their custom tags.
    pub fn user_tag_names(&self, user: &User) -> StoreResult<BTreeSet<String>> {
        let mut names: BTreeSet<String> =
            user.status_tag_names().map(str::to_string).collect();
        names.extend(self.store.custom_tag_names_for_user(user.id)?);
        Ok(names)
    }

    /// Inverted membership test: does content tagged `content_tags` reach
    /// this user? True iff the intersection is non-empty.
    pub fn is_in_audience(&self, user: &User, content_tags: &[String]) -> StoreResult<bool> {
        if content_tags.is_empty() {
            return Ok(false);
        }
        let names = self.user_tag_names(user)?;
        Ok(content_tags.iter().any(|tag| names.contains(tag)))
    }

    /// Number of active kairanban addressed to the user that they have
    /// not yet acknowledged. The presentation layer calls this explicitly
    /// when rendering; it is not an implicit per-request side channel.
    pub fn unread_kairanban_count(&self, user: &User, now: DateTime<Utc>) -> StoreResult<usize> {
        let user_tags = self.user_tag_names(user)?;
        let mut unread = 0;
        for board in self.store.active_kairanban(now)? {
            if board.author == user.id || self.store.has_checked(user.id, board.id)? {
                continue;
            }
            let board_tags = self.store.tag_names_for_kairanban(board.id)?;
            if board_tags.iter().any(|tag| user_tags.contains(tag)) {
                unread += 1;
            }
        }
        Ok(unread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use crate::types::ProfileUpdate;
    use chrono::Duration;

    fn store_with_users() -> (MemoryStore, UserId, UserId, UserId) {
        let store = MemoryStore::new();
        // a: grade matches by status attribute
        let a = store.add_user("sato");
        store
            .update_profile(
                a,
                ProfileUpdate {
                    grade: Some("3年".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        // b: matches through a custom tag
        let b = store.add_user("suzuki");
        store.add_custom_tag(b, "ロボ部");
        // c: unrelated
        let c = store.add_user("takahashi");
        (store, a, b, c)
    }

    #[test]
    fn empty_tag_set_reaches_nobody() {
        let (store, _, _, _) = store_with_users();
        let resolver = AudienceResolver::new(&store);
        assert!(resolver.resolve_audience(&[]).unwrap().is_empty());
    }

    #[test]
    fn union_of_status_and_custom_matches() {
        let (store, a, b, c) = store_with_users();
        let resolver = AudienceResolver::new(&store);

        let audience = resolver
            .resolve_audience(&["3年".into(), "ロボ部".into()])
            .unwrap();
        assert!(audience.contains(&a));
        assert!(audience.contains(&b));
        assert!(!audience.contains(&c), "unrelated users are never included");
        assert_eq!(audience.len(), 2);
    }

    #[test]
    fn audience_is_monotonic_in_the_tag_set() {
        let (store, _, _, _) = store_with_users();
        let resolver = AudienceResolver::new(&store);

        let narrow = resolver.resolve_audience(&["3年".into()]).unwrap();
        let wide = resolver
            .resolve_audience(&["3年".into(), "ロボ部".into()])
            .unwrap();
        for id in &narrow {
            assert!(wide.contains(id));
        }
    }

    #[test]
    fn user_in_audience_of_matching_content() {
        let (store, a, _, c) = store_with_users();
        let resolver = AudienceResolver::new(&store);

        let a = store.user(a).unwrap().unwrap();
        let c = store.user(c).unwrap().unwrap();
        let tags = vec!["3年".to_string()];
        assert!(resolver.is_in_audience(&a, &tags).unwrap());
        assert!(!resolver.is_in_audience(&c, &tags).unwrap());
        assert!(!resolver.is_in_audience(&a, &[]).unwrap());
    }

    #[test]
    fn unread_count_skips_checked_and_own_boards() {
        let (store, a, _, _) = store_with_users();
        let resolver = AudienceResolver::new(&store);
        let now = Utc::now();

        let author = store.add_user("author");
        let board = store
            .create_kairanban(author, "掃除当番", "", now + Duration::days(1))
            .unwrap();
        let tag = store.fetch_or_create_tag("3年", now).unwrap();
        store.set_kairanban_tags(board.id, &[tag.id]).unwrap();

        let a_user = store.user(a).unwrap().unwrap();
        assert_eq!(resolver.unread_kairanban_count(&a_user, now).unwrap(), 1);

        store.toggle_check(a, board.id).unwrap();
        assert_eq!(resolver.unread_kairanban_count(&a_user, now).unwrap(), 0);
    }
}
