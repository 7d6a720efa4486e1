//! In-memory doubles for engine and resolver tests.
//!
//! `MemoryStore` implements the full [`CommunityStore`] surface over plain
//! collections; `RecordingGateway` captures push traffic instead of
//! sending it. Both are also used by downstream crates' test suites.

use crate::error::{PushError, StoreError, StoreResult};
use crate::traits::{CommunityStore, PushGateway};
use crate::types::{
    Comment, CommentId, Kairanban, KairanbanId, NewNotification, NewUser, Notification,
    NotificationId, NotificationPrefs, Post, PostId, ProfileUpdate, PushMessage,
    PushSubscription, Tag, TagId, ToggleState, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tags: Vec<Tag>,
    user_tags: BTreeSet<(UserId, TagId)>,
    post_tags: BTreeSet<(PostId, TagId)>,
    kairanban_tags: BTreeSet<(KairanbanId, TagId)>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    likes: BTreeSet<(UserId, PostId)>,
    bookmarks: Vec<(UserId, PostId)>,
    boards: Vec<Kairanban>,
    checks: BTreeSet<(UserId, KairanbanId)>,
    notifications: Vec<Notification>,
    subscriptions: Vec<PushSubscription>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Collection-backed store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with default preferences (notifications on, push
    /// off), bypassing the `NewUser` ceremony.
    pub fn add_user(&self, username: &str) -> UserId {
        self.create_user(NewUser {
            username: username.to_string(),
            password_hash: "x".to_string(),
            ..Default::default()
        })
        .expect("memory store user insert")
        .id
    }

    /// Attach a custom tag to a user, creating the tag as needed.
    pub fn add_custom_tag(&self, user: UserId, name: &str) {
        let tag = self
            .fetch_or_create_tag(name, Utc::now())
            .expect("memory store tag insert");
        self.inner.lock().user_tags.insert((user, tag.id));
    }

    /// All notification rows for a recipient, newest last, without the
    /// mark-read side effect of `recent_notifications`.
    pub fn notifications_for(&self, user: UserId) -> Vec<Notification> {
        self.inner
            .lock()
            .notifications
            .iter()
            .filter(|n| n.recipient == user)
            .cloned()
            .collect()
    }
}

impl CommunityStore for MemoryStore {
    fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        if inner.users.iter().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict(format!(
                "username {} taken",
                new.username
            )));
        }
        let user = User {
            id: UserId(inner.next_id()),
            username: new.username,
            is_admin: false,
            bio: new.bio,
            icon_url: new.icon_url,
            grade: None,
            category: None,
            class: None,
            program: None,
            major: None,
            push_enabled: false,
            notify_comment_like: true,
            notify_reply: true,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().users.iter().find(|u| u.id == id).cloned())
    }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    fn update_profile(&self, id: UserId, update: ProfileUpdate) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.bio = update.bio;
        user.icon_url = update.icon_url;
        user.grade = update.grade;
        user.category = update.category;
        user.class = update.class;
        user.program = update.program;
        user.major = update.major;
        Ok(())
    }

    fn set_notification_prefs(&self, id: UserId, prefs: NotificationPrefs) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let user = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.push_enabled = prefs.push_enabled;
        user.notify_comment_like = prefs.notify_comment_like;
        user.notify_reply = prefs.notify_reply;
        Ok(())
    }

    fn fetch_or_create_tag(&self, name: &str, now: DateTime<Utc>) -> StoreResult<Tag> {
        let mut inner = self.inner.lock();
        if let Some(tag) = inner.tags.iter_mut().find(|t| t.name == name) {
            tag.last_used = now;
            return Ok(tag.clone());
        }
        let tag = Tag {
            id: TagId(inner.next_id()),
            name: name.to_string(),
            last_used: now,
        };
        inner.tags.push(tag.clone());
        Ok(tag)
    }

    fn tag_by_name(&self, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self
            .inner
            .lock()
            .tags
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    fn recent_tags(&self, limit: usize) -> StoreResult<Vec<Tag>> {
        let mut tags = self.inner.lock().tags.clone();
        tags.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        tags.truncate(limit);
        Ok(tags)
    }

    fn search_tags(&self, prefix: &str, limit: usize) -> StoreResult<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .inner
            .lock()
            .tags
            .iter()
            .filter(|t| t.name.starts_with(prefix))
            .cloned()
            .collect();
        tags.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        tags.truncate(limit);
        Ok(tags)
    }

    fn set_user_tags(&self, user: UserId, tags: &[TagId]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.user_tags.retain(|(u, _)| *u != user);
        inner.user_tags.extend(tags.iter().map(|t| (user, *t)));
        Ok(())
    }

    fn set_post_tags(&self, post: PostId, tags: &[TagId]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.post_tags.retain(|(p, _)| *p != post);
        inner.post_tags.extend(tags.iter().map(|t| (post, *t)));
        Ok(())
    }

    fn set_kairanban_tags(&self, kairanban: KairanbanId, tags: &[TagId]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.kairanban_tags.retain(|(k, _)| *k != kairanban);
        inner
            .kairanban_tags
            .extend(tags.iter().map(|t| (kairanban, *t)));
        Ok(())
    }

    fn custom_tag_names_for_user(&self, user: UserId) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .user_tags
            .iter()
            .filter(|(u, _)| *u == user)
            .filter_map(|(_, t)| inner.tags.iter().find(|tag| tag.id == *t))
            .map(|tag| tag.name.clone())
            .collect())
    }

    fn tag_names_for_post(&self, post: PostId) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .post_tags
            .iter()
            .filter(|(p, _)| *p == post)
            .filter_map(|(_, t)| inner.tags.iter().find(|tag| tag.id == *t))
            .map(|tag| tag.name.clone())
            .collect())
    }

    fn tag_names_for_kairanban(&self, kairanban: KairanbanId) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .kairanban_tags
            .iter()
            .filter(|(k, _)| *k == kairanban)
            .filter_map(|(_, t)| inner.tags.iter().find(|tag| tag.id == *t))
            .map(|tag| tag.name.clone())
            .collect())
    }

    fn create_post(&self, author: UserId, title: &str, content: &str) -> StoreResult<Post> {
        let mut inner = self.inner.lock();
        let post = Post {
            id: PostId(inner.next_id()),
            author,
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.posts.push(post.clone());
        Ok(post)
    }

    fn post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.inner.lock().posts.iter().find(|p| p.id == id).cloned())
    }

    fn update_post(
        &self,
        editor: UserId,
        id: PostId,
        title: &str,
        content: &str,
    ) -> StoreResult<Post> {
        let mut inner = self.inner.lock();
        let post = inner
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))?;
        if post.author != editor {
            return Err(StoreError::Forbidden("only the author may edit".into()));
        }
        post.title = title.to_string();
        post.content = content.to_string();
        post.updated_at = Some(Utc::now());
        Ok(post.clone())
    }

    fn recent_posts(&self, limit: usize, offset: usize) -> StoreResult<Vec<Post>> {
        let mut posts = self.inner.lock().posts.clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }

    fn search_posts(&self, query: &str, limit: usize, offset: usize) -> StoreResult<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .inner
            .lock()
            .posts
            .iter()
            .filter(|p| p.title.contains(query) || p.content.contains(query))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts.into_iter().skip(offset).take(limit).collect())
    }

    fn add_comment(&self, post: PostId, author: UserId, content: &str) -> StoreResult<Comment> {
        let mut inner = self.inner.lock();
        if !inner.posts.iter().any(|p| p.id == post) {
            return Err(StoreError::NotFound(format!("post {post}")));
        }
        let comment = Comment {
            id: CommentId(inner.next_id()),
            post,
            author,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.comments.push(comment.clone());
        Ok(comment)
    }

    fn comments_for_post(&self, post: PostId) -> StoreResult<Vec<Comment>> {
        Ok(self
            .inner
            .lock()
            .comments
            .iter()
            .filter(|c| c.post == post)
            .cloned()
            .collect())
    }

    fn prior_commenters(&self, post: PostId) -> StoreResult<Vec<UserId>> {
        let inner = self.inner.lock();
        let mut seen = BTreeSet::new();
        Ok(inner
            .comments
            .iter()
            .filter(|c| c.post == post)
            .map(|c| c.author)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    fn toggle_like(&self, user: UserId, post: PostId) -> StoreResult<ToggleState> {
        let mut inner = self.inner.lock();
        if inner.likes.remove(&(user, post)) {
            Ok(ToggleState::Off)
        } else {
            inner.likes.insert((user, post));
            Ok(ToggleState::On)
        }
    }

    fn toggle_bookmark(&self, user: UserId, post: PostId) -> StoreResult<ToggleState> {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.bookmarks.iter().position(|b| *b == (user, post)) {
            inner.bookmarks.remove(pos);
            Ok(ToggleState::Off)
        } else {
            inner.bookmarks.push((user, post));
            Ok(ToggleState::On)
        }
    }

    fn has_liked(&self, user: UserId, post: PostId) -> StoreResult<bool> {
        Ok(self.inner.lock().likes.contains(&(user, post)))
    }

    fn has_bookmarked(&self, user: UserId, post: PostId) -> StoreResult<bool> {
        Ok(self.inner.lock().bookmarks.contains(&(user, post)))
    }

    fn bookmarkers_of(&self, post: PostId) -> StoreResult<Vec<UserId>> {
        Ok(self
            .inner
            .lock()
            .bookmarks
            .iter()
            .filter(|(_, p)| *p == post)
            .map(|(u, _)| *u)
            .collect())
    }

    fn create_kairanban(
        &self,
        author: UserId,
        title: &str,
        content: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Kairanban> {
        let mut inner = self.inner.lock();
        let board = Kairanban {
            id: KairanbanId(inner.next_id()),
            author,
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            expires_at,
        };
        inner.boards.push(board.clone());
        Ok(board)
    }

    fn kairanban(&self, id: KairanbanId) -> StoreResult<Option<Kairanban>> {
        Ok(self.inner.lock().boards.iter().find(|b| b.id == id).cloned())
    }

    fn active_kairanban(&self, now: DateTime<Utc>) -> StoreResult<Vec<Kairanban>> {
        let mut boards: Vec<Kairanban> = self
            .inner
            .lock()
            .boards
            .iter()
            .filter(|b| b.is_active(now))
            .cloned()
            .collect();
        boards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(boards)
    }

    fn toggle_check(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<ToggleState> {
        let mut inner = self.inner.lock();
        if inner.checks.remove(&(user, kairanban)) {
            Ok(ToggleState::Off)
        } else {
            inner.checks.insert((user, kairanban));
            Ok(ToggleState::On)
        }
    }

    fn has_checked(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<bool> {
        Ok(self.inner.lock().checks.contains(&(user, kairanban)))
    }

    fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationId> {
        let mut inner = self.inner.lock();
        let id = NotificationId(inner.next_id());
        inner.notifications.push(Notification {
            id,
            recipient: new.recipient,
            message: new.message,
            is_read: false,
            created_at: Utc::now(),
            target: new.target,
        });
        Ok(id)
    }

    fn recent_notifications(&self, user: UserId, limit: usize) -> StoreResult<Vec<Notification>> {
        let mut inner = self.inner.lock();
        let mut indices: Vec<usize> = inner
            .notifications
            .iter()
            .enumerate()
            .filter(|(_, n)| n.recipient == user)
            .map(|(i, _)| i)
            .collect();
        indices.sort_by(|a, b| {
            inner.notifications[*b]
                .created_at
                .cmp(&inner.notifications[*a].created_at)
        });
        indices.truncate(limit);

        let mut out = Vec::with_capacity(indices.len());
        for i in indices {
            inner.notifications[i].is_read = true;
            out.push(inner.notifications[i].clone());
        }
        Ok(out)
    }

    fn has_unread_notifications(&self, user: UserId) -> StoreResult<bool> {
        Ok(self
            .inner
            .lock()
            .notifications
            .iter()
            .any(|n| n.recipient == user && !n.is_read))
    }

    fn users_with_custom_tag_in(&self, names: &[String]) -> StoreResult<Vec<UserId>> {
        let inner = self.inner.lock();
        let tag_ids: BTreeSet<TagId> = inner
            .tags
            .iter()
            .filter(|t| names.iter().any(|n| *n == t.name))
            .map(|t| t.id)
            .collect();
        let mut seen = BTreeSet::new();
        Ok(inner
            .user_tags
            .iter()
            .filter(|(_, t)| tag_ids.contains(t))
            .map(|(u, _)| *u)
            .filter(|u| seen.insert(*u))
            .collect())
    }

    fn users_with_status_in(&self, names: &[String]) -> StoreResult<Vec<UserId>> {
        let inner = self.inner.lock();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.status_tag_names().any(|s| names.iter().any(|n| n == s)))
            .map(|u| u.id)
            .collect())
    }

    fn upsert_push_subscription(&self, sub: PushSubscription) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner
            .subscriptions
            .retain(|s| !(s.user == sub.user && s.endpoint == sub.endpoint));
        inner.subscriptions.push(sub);
        Ok(())
    }

    fn remove_push_subscription(&self, user: UserId, endpoint: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .subscriptions
            .retain(|s| !(s.user == user && s.endpoint == endpoint));
        Ok(())
    }

    fn push_subscriptions(&self, user: UserId) -> StoreResult<Vec<PushSubscription>> {
        Ok(self
            .inner
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.user == user)
            .cloned()
            .collect())
    }
}

/// Push gateway double that records outbound messages.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<PushMessage>>,
    fail: bool,
}

impl RecordingGateway {
    /// A gateway whose every send fails with a 502, for the "push errors
    /// are swallowed" paths.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        if self.fail {
            return Err(PushError::Status(502));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Push gateway that accepts everything and delivers nothing, for tests
/// that only care about the store side.
#[derive(Default)]
pub struct NoopPushGateway;

#[async_trait]
impl PushGateway for NoopPushGateway {
    async fn send(&self, _message: &PushMessage) -> Result<(), PushError> {
        Ok(())
    }
}
