//! # Kairan core
//!
//! Domain types and business logic for the campus community platform:
//! the tag registry, the tag-based audience resolver, and the
//! notification fan-out engine, plus the traits storage and delivery
//! backends implement.
//!
//! Core defines the abstractions; `kairan-sqlite` supplies the store and
//! `kairan-net` the push gateway. Higher layers (routing, templating,
//! auth) live outside this workspace entirely.

pub mod audience;
pub mod config;
pub mod error;
pub mod fanout;
pub mod registry;
pub mod test_support;
pub mod traits;
pub mod types;

pub use audience::AudienceResolver;
pub use config::{AppConfig, ConfigError, PreviewConfig, PushConfig};
pub use error::{PushError, StoreError, StoreResult};
pub use fanout::NotificationEngine;
pub use registry::resolve_tags;
pub use traits::{BaseUrlLinks, CommunityStore, ProfileLinks, PushGateway};
pub use types::{
    Comment, CommentId, Kairanban, KairanbanId, LinkPreview, NewNotification, NewUser,
    Notification, NotificationId, NotificationPrefs, NotificationTarget, Post, PostId,
    ProfileUpdate, PushMessage, PushSubscription, Tag, TagId, ToggleState, User, UserId,
};
