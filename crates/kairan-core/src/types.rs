//! Domain types shared across the Kairan crates.
//!
//! Identifiers are newtypes over the storage layer's integer keys so that
//! a post id can never be passed where a user id is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

id_newtype!(
    /// Row id of a registered user.
    UserId
);
id_newtype!(
    /// Row id of a tag.
    TagId
);
id_newtype!(
    /// Row id of a post.
    PostId
);
id_newtype!(
    /// Row id of a comment.
    CommentId
);
id_newtype!(
    /// Row id of a kairanban (circulated announcement).
    KairanbanId
);
id_newtype!(
    /// Row id of an in-app notification.
    NotificationId
);

/// A registered user with their audience-relevant profile attributes.
///
/// The five status fields are single-valued affiliation tags (exact-match
/// targeting keys); custom tags live in a separate many-to-many join and
/// are fetched through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
    pub bio: Option<String>,
    pub icon_url: Option<String>,
    pub grade: Option<String>,
    pub category: Option<String>,
    pub class: Option<String>,
    pub program: Option<String>,
    pub major: Option<String>,
    pub push_enabled: bool,
    pub notify_comment_like: bool,
    pub notify_reply: bool,
}

impl User {
    /// The user's non-empty status attributes, as targeting keys.
    pub fn status_tag_names(&self) -> impl Iterator<Item = &str> {
        [
            self.grade.as_deref(),
            self.category.as_deref(),
            self.class.as_deref(),
            self.program.as_deref(),
            self.major.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
    }
}

/// Fields supplied when registering a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub icon_url: Option<String>,
}

/// Profile fields a user may edit on their own account.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub icon_url: Option<String>,
    pub grade: Option<String>,
    pub category: Option<String>,
    pub class: Option<String>,
    pub program: Option<String>,
    pub major: Option<String>,
}

/// Per-user notification delivery preferences.
#[derive(Debug, Clone, Copy)]
pub struct NotificationPrefs {
    pub push_enabled: bool,
    pub notify_comment_like: bool,
    pub notify_reply: bool,
}

/// A tag name with its recency bookkeeping.
///
/// Names are globally unique and case-sensitive; `last_used` is refreshed
/// every time the name is referenced by a post, user, or kairanban and
/// drives the "recent tags" ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post: PostId,
    pub author: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A circulated announcement targeted via tags, with an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kairanban {
    pub id: KairanbanId,
    pub author: UserId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Kairanban {
    /// A kairanban circulates only while its expiry lies in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// What a notification points back at. At most one reference per row;
/// mention notifications on comments still point at the enclosing post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTarget {
    Post(PostId),
    Kairanban(KairanbanId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub target: Option<NotificationTarget>,
}

/// Row to insert; only the fan-out engine constructs these.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: UserId,
    pub message: String,
    pub target: Option<NotificationTarget>,
}

/// Resulting state of a like/bookmark/check toggle.
///
/// A uniqueness-constraint race on the insert side is reported as `On`:
/// from the user's point of view the thing is already in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    On,
    Off,
}

impl ToggleState {
    pub fn is_on(self) -> bool {
        matches!(self, ToggleState::On)
    }
}

/// One outbound push request handed to the gateway.
///
/// Recipients are opaque identifiers as far as the gateway contract is
/// concerned; we pass user row ids rendered as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub recipients: Vec<String>,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl PushMessage {
    pub fn new(recipients: Vec<UserId>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipients: recipients.into_iter().map(|id| id.0.to_string()).collect(),
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A browser push subscription kept server-side for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub user: UserId,
    pub endpoint: String,
    /// Key material as the browser handed it over, forwarded verbatim.
    pub keys: serde_json::Value,
}

/// Open Graph style metadata extracted for a link preview card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Ordered set of distinct tag names, the engine's audience-targeting key.
pub fn normalize_tag_names(comma_separated: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_tags_skip_empty_attributes() {
        let user = User {
            id: UserId(1),
            username: "tanaka".into(),
            is_admin: false,
            bio: None,
            icon_url: None,
            grade: Some("3年".into()),
            category: None,
            class: Some(String::new()),
            program: Some("夜間".into()),
            major: None,
            push_enabled: false,
            notify_comment_like: true,
            notify_reply: true,
        };

        let names: Vec<&str> = user.status_tag_names().collect();
        assert_eq!(names, vec!["3年", "夜間"]);
    }

    #[test]
    fn kairanban_active_window() {
        let now = Utc::now();
        let board = Kairanban {
            id: KairanbanId(1),
            author: UserId(1),
            title: "文化祭".into(),
            content: String::new(),
            created_at: now,
            expires_at: now + Duration::days(3),
        };
        assert!(board.is_active(now));
        assert!(!board.is_active(now + Duration::days(4)));
    }

    #[test]
    fn normalize_splits_trims_and_dedupes() {
        let names = normalize_tag_names(" 3年, ロボ部 ,,3年 , ");
        assert_eq!(names, vec!["3年", "ロボ部"]);
    }

    #[test]
    fn normalize_empty_input() {
        assert!(normalize_tag_names("").is_empty());
        assert!(normalize_tag_names(" , ,").is_empty());
    }

    #[test]
    fn push_message_stringifies_recipient_ids() {
        let msg = PushMessage::new(vec![UserId(4), UserId(7)], "t", "b").with_link("/post/1");
        assert_eq!(msg.recipients, vec!["4", "7"]);
        assert_eq!(msg.link.as_deref(), Some("/post/1"));
    }
}
