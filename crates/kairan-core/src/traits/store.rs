//! Storage surface consumed by the registry, resolver, and fan-out engine.

use crate::error::StoreResult;
use crate::types::{
    Comment, Kairanban, KairanbanId, NewNotification, NewUser, Notification, NotificationId,
    NotificationPrefs, Post, PostId, ProfileUpdate, PushSubscription, Tag, TagId, ToggleState,
    User, UserId,
};
use chrono::{DateTime, Utc};

/// Relational store behind the platform core.
///
/// Implementations are synchronous; the relational store's row-level
/// uniqueness constraints are the only concurrency control. Toggle
/// operations must absorb a duplicate-insert race and report it as
/// "already in that state" rather than an error.
pub trait CommunityStore: Send + Sync {
    // --- users ---

    fn create_user(&self, new: NewUser) -> StoreResult<User>;
    fn user(&self, id: UserId) -> StoreResult<Option<User>>;
    fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Only the owning user mutates their profile; ownership is checked
    /// by the caller, the store applies the update.
    fn update_profile(&self, id: UserId, update: ProfileUpdate) -> StoreResult<()>;
    fn set_notification_prefs(&self, id: UserId, prefs: NotificationPrefs) -> StoreResult<()>;

    // --- tags ---

    /// Look up the tag by exact name, creating it if absent; either way
    /// `last_used` becomes `now`.
    fn fetch_or_create_tag(&self, name: &str, now: DateTime<Utc>) -> StoreResult<Tag>;
    fn tag_by_name(&self, name: &str) -> StoreResult<Option<Tag>>;
    /// Tags ordered by `last_used` descending.
    fn recent_tags(&self, limit: usize) -> StoreResult<Vec<Tag>>;
    /// Prefix match for the autocomplete endpoint, recency-ordered.
    fn search_tags(&self, prefix: &str, limit: usize) -> StoreResult<Vec<Tag>>;
    fn set_user_tags(&self, user: UserId, tags: &[TagId]) -> StoreResult<()>;
    fn set_post_tags(&self, post: PostId, tags: &[TagId]) -> StoreResult<()>;
    fn set_kairanban_tags(&self, kairanban: KairanbanId, tags: &[TagId]) -> StoreResult<()>;
    fn custom_tag_names_for_user(&self, user: UserId) -> StoreResult<Vec<String>>;
    fn tag_names_for_post(&self, post: PostId) -> StoreResult<Vec<String>>;
    fn tag_names_for_kairanban(&self, kairanban: KairanbanId) -> StoreResult<Vec<String>>;

    // --- posts & comments ---

    fn create_post(&self, author: UserId, title: &str, content: &str) -> StoreResult<Post>;
    fn post(&self, id: PostId) -> StoreResult<Option<Post>>;
    /// Fails with `Forbidden` when the editor is not the author, and
    /// stamps `updated_at`.
    fn update_post(
        &self,
        editor: UserId,
        id: PostId,
        title: &str,
        content: &str,
    ) -> StoreResult<Post>;
    fn recent_posts(&self, limit: usize, offset: usize) -> StoreResult<Vec<Post>>;
    /// Title OR content substring match, newest first.
    fn search_posts(&self, query: &str, limit: usize, offset: usize) -> StoreResult<Vec<Post>>;
    fn add_comment(&self, post: PostId, author: UserId, content: &str) -> StoreResult<Comment>;
    fn comments_for_post(&self, post: PostId) -> StoreResult<Vec<Comment>>;
    /// Distinct authors of existing comments on the post, oldest first.
    fn prior_commenters(&self, post: PostId) -> StoreResult<Vec<UserId>>;

    // --- likes & bookmarks ---

    fn toggle_like(&self, user: UserId, post: PostId) -> StoreResult<ToggleState>;
    fn toggle_bookmark(&self, user: UserId, post: PostId) -> StoreResult<ToggleState>;
    fn has_liked(&self, user: UserId, post: PostId) -> StoreResult<bool>;
    fn has_bookmarked(&self, user: UserId, post: PostId) -> StoreResult<bool>;
    fn bookmarkers_of(&self, post: PostId) -> StoreResult<Vec<UserId>>;

    // --- kairanban ---

    fn create_kairanban(
        &self,
        author: UserId,
        title: &str,
        content: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Kairanban>;
    fn kairanban(&self, id: KairanbanId) -> StoreResult<Option<Kairanban>>;
    /// Boards whose expiry lies after `now`, newest first.
    fn active_kairanban(&self, now: DateTime<Utc>) -> StoreResult<Vec<Kairanban>>;
    fn toggle_check(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<ToggleState>;
    fn has_checked(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<bool>;

    // --- notifications ---

    fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationId>;
    /// Latest notifications for the user; returned rows are flipped to
    /// read as a side effect, matching the notification page.
    fn recent_notifications(&self, user: UserId, limit: usize) -> StoreResult<Vec<Notification>>;
    fn has_unread_notifications(&self, user: UserId) -> StoreResult<bool>;

    // --- audience queries ---

    /// Users holding any custom tag whose name is in `names`.
    fn users_with_custom_tag_in(&self, names: &[String]) -> StoreResult<Vec<UserId>>;
    /// Users any of whose five status attributes equals any of `names`.
    fn users_with_status_in(&self, names: &[String]) -> StoreResult<Vec<UserId>>;

    // --- push subscriptions ---

    fn upsert_push_subscription(&self, sub: PushSubscription) -> StoreResult<()>;
    fn remove_push_subscription(&self, user: UserId, endpoint: &str) -> StoreResult<()>;
    fn push_subscriptions(&self, user: UserId) -> StoreResult<Vec<PushSubscription>>;
}
