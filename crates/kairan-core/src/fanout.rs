//! Notification fan-out engine.
//!
//! One entry point per content event. Each entry point determines the
//! recipient set, writes exactly one in-app notification row per
//! recipient, and then requests best-effort push delivery for recipients
//! who opted in. The actor is never a recipient of their own event, and
//! a push failure is logged and swallowed; it must not roll back or fail
//! the write that triggered it.

use crate::config::AppConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{CommunityStore, ProfileLinks, PushGateway};
use crate::types::{
    KairanbanId, NewNotification, NotificationTarget, PostId, PushMessage, UserId,
};
use tracing::{debug, warn};

/// Fan-out engine wired to its collaborators by reference.
pub struct NotificationEngine<'a> {
    store: &'a dyn CommunityStore,
    push: &'a dyn PushGateway,
    links: &'a dyn ProfileLinks,
    config: &'a AppConfig,
}

impl<'a> NotificationEngine<'a> {
    pub fn new(
        store: &'a dyn CommunityStore,
        push: &'a dyn PushGateway,
        links: &'a dyn ProfileLinks,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            store,
            push,
            links,
            config,
        }
    }

    /// A comment was added to `post` by `commenter`.
    ///
    /// Notifies the post author (preference-gated) unless they are the
    /// commenter. When the commenter IS the author, this is the "author
    /// replied to the thread" case: every distinct prior commenter other
    /// than the author gets a reply notification instead.
    pub async fn comment_added(&self, post: PostId, commenter: UserId) -> StoreResult<()> {
        let post = self
            .store
            .post(post)?
            .ok_or_else(|| StoreError::NotFound(format!("post {post}")))?;

        if commenter != post.author {
            let author = match self.store.user(post.author)? {
                Some(author) => author,
                None => return Ok(()),
            };
            if author.notify_comment_like {
                let message = format!("あなたの投稿「{}」にコメントが付きました。", post.title);
                self.store.insert_notification(NewNotification {
                    recipient: author.id,
                    message: message.clone(),
                    target: Some(NotificationTarget::Post(post.id)),
                })?;
                self.push_best_effort(
                    vec![author.id],
                    "新しいコメント",
                    &message,
                    Some(self.links.post_url(post.id)),
                )
                .await;
            }
            return Ok(());
        }

        // Author replied: fan out to everyone who commented before, except
        // the author themselves.
        let recipients: Vec<UserId> = self
            .store
            .prior_commenters(post.id)?
            .into_iter()
            .filter(|id| *id != commenter && *id != post.author)
            .collect();
        if recipients.is_empty() {
            return Ok(());
        }

        let message = format!("投稿「{}」に投稿者から返信が付きました。", post.title);
        for recipient in &recipients {
            self.store.insert_notification(NewNotification {
                recipient: *recipient,
                message: message.clone(),
                target: Some(NotificationTarget::Post(post.id)),
            })?;
        }
        debug!(post = %post.id, count = recipients.len(), "reply fan-out");
        self.push_best_effort(
            recipients,
            "投稿者からの返信",
            &message,
            Some(self.links.post_url(post.id)),
        )
        .await;
        Ok(())
    }

    /// A like transitioned to ON. Off transitions never reach the engine.
    pub async fn like_added(&self, post: PostId, liker: UserId) -> StoreResult<()> {
        let post = self
            .store
            .post(post)?
            .ok_or_else(|| StoreError::NotFound(format!("post {post}")))?;
        if liker == post.author {
            return Ok(());
        }
        let author = match self.store.user(post.author)? {
            Some(author) => author,
            None => return Ok(()),
        };
        if !author.notify_comment_like {
            return Ok(());
        }

        let message = format!("あなたの投稿「{}」にいいねが付きました。", post.title);
        self.store.insert_notification(NewNotification {
            recipient: author.id,
            message: message.clone(),
            target: Some(NotificationTarget::Post(post.id)),
        })?;
        self.push_best_effort(
            vec![author.id],
            "いいね",
            &message,
            Some(self.links.post_url(post.id)),
        )
        .await;
        Ok(())
    }

    /// A bookmark transitioned to ON. Unconditional for the author.
    pub async fn bookmark_added(&self, post: PostId, bookmarker: UserId) -> StoreResult<()> {
        let post = self
            .store
            .post(post)?
            .ok_or_else(|| StoreError::NotFound(format!("post {post}")))?;
        if bookmarker == post.author {
            return Ok(());
        }

        let message = format!("あなたの投稿「{}」がブックマークされました。", post.title);
        self.store.insert_notification(NewNotification {
            recipient: post.author,
            message: message.clone(),
            target: Some(NotificationTarget::Post(post.id)),
        })?;
        self.push_best_effort(
            vec![post.author],
            "ブックマーク",
            &message,
            Some(self.links.post_url(post.id)),
        )
        .await;
        Ok(())
    }

    /// A post was edited: notify everyone currently bookmarking it,
    /// except the editor.
    pub async fn post_edited(&self, post: PostId, editor: UserId) -> StoreResult<()> {
        let post = self
            .store
            .post(post)?
            .ok_or_else(|| StoreError::NotFound(format!("post {post}")))?;

        let recipients: Vec<UserId> = self
            .store
            .bookmarkers_of(post.id)?
            .into_iter()
            .filter(|id| *id != editor)
            .collect();
        if recipients.is_empty() {
            return Ok(());
        }

        let message = format!("ブックマーク中の投稿「{}」が更新されました。", post.title);
        for recipient in &recipients {
            self.store.insert_notification(NewNotification {
                recipient: *recipient,
                message: message.clone(),
                target: Some(NotificationTarget::Post(post.id)),
            })?;
        }
        self.push_best_effort(
            recipients,
            "投稿の更新",
            &message,
            Some(self.links.post_url(post.id)),
        )
        .await;
        Ok(())
    }

    /// A kairanban was created: fan out to the resolved tag audience,
    /// minus the author, with one batched push call.
    pub async fn kairanban_created(&self, kairanban: KairanbanId) -> StoreResult<()> {
        let board = self
            .store
            .kairanban(kairanban)?
            .ok_or_else(|| StoreError::NotFound(format!("kairanban {kairanban}")))?;

        let tag_names = self.store.tag_names_for_kairanban(board.id)?;
        let resolver = crate::audience::AudienceResolver::new(self.store);
        let recipients: Vec<UserId> = resolver
            .resolve_audience(&tag_names)?
            .into_iter()
            .filter(|id| *id != board.author)
            .collect();
        if recipients.is_empty() {
            return Ok(());
        }

        let message = format!("回覧板「{}」が届きました。", board.title);
        for recipient in &recipients {
            self.store.insert_notification(NewNotification {
                recipient: *recipient,
                message: message.clone(),
                target: Some(NotificationTarget::Kairanban(board.id)),
            })?;
        }
        debug!(kairanban = %board.id, count = recipients.len(), "kairanban fan-out");
        self.push_best_effort(
            recipients,
            "回覧板",
            &message,
            Some(self.links.kairanban_url(board.id)),
        )
        .await;
        Ok(())
    }

    /// A resolved `@username` mention was found in content authored by
    /// `author`. The in-app notification is unconditional; push is gated
    /// on the mentioned user's push flag like every other event.
    pub async fn mention_found(
        &self,
        target: NotificationTarget,
        mentioned_username: &str,
        author: UserId,
    ) -> StoreResult<()> {
        let mentioned = match self.store.user_by_username(mentioned_username)? {
            Some(user) if user.id != author => user,
            _ => return Ok(()),
        };
        let author_name = self
            .store
            .user(author)?
            .map(|u| u.username)
            .unwrap_or_else(|| "誰か".to_string());

        let message = format!("{author_name}さんがあなたをメンションしました。");
        self.store.insert_notification(NewNotification {
            recipient: mentioned.id,
            message: message.clone(),
            target: Some(target),
        })?;

        let link = match target {
            NotificationTarget::Post(id) => self.links.post_url(id),
            NotificationTarget::Kairanban(id) => self.links.kairanban_url(id),
        };
        self.push_best_effort(vec![mentioned.id], "メンション", &message, Some(link))
            .await;
        Ok(())
    }

    /// Deliver a push to the opted-in subset of `recipients`. Failures
    /// are logged and swallowed; the in-app rows are already committed.
    async fn push_best_effort(
        &self,
        recipients: Vec<UserId>,
        title: &str,
        body: &str,
        link: Option<String>,
    ) {
        if !self.config.push.enabled || recipients.is_empty() {
            return;
        }

        let mut opted_in = Vec::new();
        for id in recipients {
            match self.store.user(id) {
                Ok(Some(user)) if user.push_enabled => opted_in.push(id),
                Ok(_) => {}
                Err(err) => warn!(user = %id, %err, "skipping push recipient"),
            }
        }
        if opted_in.is_empty() {
            return;
        }

        let mut message = PushMessage::new(opted_in, title, body);
        if let Some(link) = link {
            message = message.with_link(link);
        }
        if let Err(err) = self.push.send(&message).await {
            warn!(%err, title, "push delivery failed; in-app notifications kept");
        }
    }
}
