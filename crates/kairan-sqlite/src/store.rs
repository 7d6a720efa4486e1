//! `CommunityStore` implementation over SQLite.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use chrono::{DateTime, SecondsFormat, Utc};
use kairan_core::{
    Comment, CommentId, CommunityStore, Kairanban, KairanbanId, NewNotification, NewUser,
    Notification, NotificationId, NotificationPrefs, NotificationTarget, Post, PostId,
    ProfileUpdate, PushSubscription, StoreResult, Tag, TagId, ToggleState, User, UserId,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

/// SQLite-backed community store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// In-memory store for tests.
    pub fn memory() -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::memory()?))
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqliteError::Serialization(format!("bad timestamp {raw:?}: {e}")))
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get("id")?),
        username: row.get("username")?,
        is_admin: row.get("is_admin")?,
        bio: row.get("bio")?,
        icon_url: row.get("icon_url")?,
        grade: row.get("grade")?,
        category: row.get("category")?,
        class: row.get("class")?,
        program: row.get("program")?,
        major: row.get("major")?,
        push_enabled: row.get("push_enabled")?,
        notify_comment_like: row.get("notify_comment_like")?,
        notify_reply: row.get("notify_reply")?,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<(PostId, UserId, String, String, String, Option<String>)> {
    Ok((
        PostId(row.get("id")?),
        UserId(row.get("author_id")?),
        row.get("title")?,
        row.get("content")?,
        row.get("created_at")?,
        row.get("updated_at")?,
    ))
}

fn build_post(raw: (PostId, UserId, String, String, String, Option<String>)) -> SqliteResult<Post> {
    let (id, author, title, content, created_at, updated_at) = raw;
    Ok(Post {
        id,
        author,
        title,
        content,
        created_at: parse_ts(&created_at)?,
        updated_at: updated_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn map_tag(row: &Row<'_>) -> rusqlite::Result<(TagId, String, String)> {
    Ok((TagId(row.get("id")?), row.get("name")?, row.get("last_used")?))
}

fn build_tag(raw: (TagId, String, String)) -> SqliteResult<Tag> {
    let (id, name, last_used) = raw;
    Ok(Tag {
        id,
        name,
        last_used: parse_ts(&last_used)?,
    })
}

/// Placeholder list `?1, ?2, ...` for a dynamic IN clause.
fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

const USER_COLUMNS: &str = "id, username, is_admin, bio, icon_url, grade, category, class, \
     program, major, push_enabled, notify_comment_like, notify_reply";

impl SqliteStore {
    /// Shared on/off toggle over a (user, target) uniqueness table.
    ///
    /// A concurrent duplicate insert is absorbed by `INSERT OR IGNORE`:
    /// whichever writer loses still observes the row as present, which
    /// is exactly "already in that state".
    fn toggle(
        &self,
        conn: &Connection,
        table: &str,
        target_col: &str,
        user: UserId,
        target: i64,
    ) -> SqliteResult<ToggleState> {
        let deleted = conn.execute(
            &format!("DELETE FROM {table} WHERE user_id = ?1 AND {target_col} = ?2"),
            params![user.0, target],
        )?;
        if deleted > 0 {
            return Ok(ToggleState::Off);
        }
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {table} (user_id, {target_col}, created_at)
                 VALUES (?1, ?2, ?3)"
            ),
            params![user.0, target, ts(Utc::now())],
        )?;
        Ok(ToggleState::On)
    }

    fn user_ids_matching(
        &self,
        conn: &Connection,
        sql: &str,
        names: &[String],
    ) -> SqliteResult<Vec<UserId>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(names.iter()), |row| {
            row.get::<_, i64>(0).map(UserId)
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl CommunityStore for SqliteStore {
    fn create_user(&self, new: NewUser) -> StoreResult<User> {
        Ok(self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, bio, icon_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.username, new.password_hash, new.bio, new.icon_url, ts(Utc::now())],
            )?;
            let id = conn.last_insert_rowid();
            debug!(user = id, "created user");
            Ok(conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                map_user,
            )?)
        })?)
    }

    fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.pool.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    [id.0],
                    map_user,
                )
                .optional()?)
        })?)
    }

    fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.pool.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                    [username],
                    map_user,
                )
                .optional()?)
        })?)
    }

    fn update_profile(&self, id: UserId, update: ProfileUpdate) -> StoreResult<()> {
        Ok(self.pool.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE users SET bio = ?1, icon_url = ?2, grade = ?3, category = ?4,
                        class = ?5, program = ?6, major = ?7
                 WHERE id = ?8",
                params![
                    update.bio,
                    update.icon_url,
                    update.grade,
                    update.category,
                    update.class,
                    update.program,
                    update.major,
                    id.0
                ],
            )?;
            if changed == 0 {
                return Err(SqliteError::NotFound(format!("user {id}")));
            }
            Ok(())
        })?)
    }

    fn set_notification_prefs(&self, id: UserId, prefs: NotificationPrefs) -> StoreResult<()> {
        Ok(self.pool.with_connection(|conn| {
            let changed = conn.execute(
                "UPDATE users SET push_enabled = ?1, notify_comment_like = ?2, notify_reply = ?3
                 WHERE id = ?4",
                params![
                    prefs.push_enabled,
                    prefs.notify_comment_like,
                    prefs.notify_reply,
                    id.0
                ],
            )?;
            if changed == 0 {
                return Err(SqliteError::NotFound(format!("user {id}")));
            }
            Ok(())
        })?)
    }

    fn fetch_or_create_tag(&self, name: &str, now: DateTime<Utc>) -> StoreResult<Tag> {
        Ok(self.pool.with_connection(|conn| {
            // Upsert keeps the UNIQUE(name) row and refreshes recency.
            conn.execute(
                "INSERT INTO tags (name, last_used) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET last_used = excluded.last_used",
                params![name, ts(now)],
            )?;
            let raw = conn.query_row(
                "SELECT id, name, last_used FROM tags WHERE name = ?1",
                [name],
                map_tag,
            )?;
            build_tag(raw)
        })?)
    }

    fn tag_by_name(&self, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self.pool.with_connection(|conn| {
            let raw = conn
                .query_row(
                    "SELECT id, name, last_used FROM tags WHERE name = ?1",
                    [name],
                    map_tag,
                )
                .optional()?;
            raw.map(build_tag).transpose()
        })?)
    }

    fn recent_tags(&self, limit: usize) -> StoreResult<Vec<Tag>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, last_used FROM tags ORDER BY last_used DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], map_tag)?;
            rows.map(|raw| build_tag(raw?)).collect()
        })?)
    }

    fn search_tags(&self, prefix: &str, limit: usize) -> StoreResult<Vec<Tag>> {
        // ESCAPE so a literal % or _ in the prefix stays literal.
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, last_used FROM tags
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY last_used DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit as i64], map_tag)?;
            rows.map(|raw| build_tag(raw?)).collect()
        })?)
    }

    fn set_user_tags(&self, user: UserId, tags: &[TagId]) -> StoreResult<()> {
        Ok(self.pool.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM user_tags WHERE user_id = ?1", [user.0])?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO user_tags (user_id, tag_id) VALUES (?1, ?2)",
                    params![user.0, tag.0],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?)
    }

    fn set_post_tags(&self, post: PostId, tags: &[TagId]) -> StoreResult<()> {
        Ok(self.pool.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM post_tags WHERE post_id = ?1", [post.0])?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
                    params![post.0, tag.0],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?)
    }

    fn set_kairanban_tags(&self, kairanban: KairanbanId, tags: &[TagId]) -> StoreResult<()> {
        Ok(self.pool.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM kairanban_tags WHERE kairanban_id = ?1",
                [kairanban.0],
            )?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO kairanban_tags (kairanban_id, tag_id) VALUES (?1, ?2)",
                    params![kairanban.0, tag.0],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?)
    }

    fn custom_tag_names_for_user(&self, user: UserId) -> StoreResult<Vec<String>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name FROM tags t
                 JOIN user_tags ut ON ut.tag_id = t.id
                 WHERE ut.user_id = ?1
                 ORDER BY t.name",
            )?;
            let rows = stmt.query_map([user.0], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?)
    }

    fn tag_names_for_post(&self, post: PostId) -> StoreResult<Vec<String>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name FROM tags t
                 JOIN post_tags pt ON pt.tag_id = t.id
                 WHERE pt.post_id = ?1
                 ORDER BY t.name",
            )?;
            let rows = stmt.query_map([post.0], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?)
    }

    fn tag_names_for_kairanban(&self, kairanban: KairanbanId) -> StoreResult<Vec<String>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name FROM tags t
                 JOIN kairanban_tags kt ON kt.tag_id = t.id
                 WHERE kt.kairanban_id = ?1
                 ORDER BY t.name",
            )?;
            let rows = stmt.query_map([kairanban.0], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?)
    }

    fn create_post(&self, author: UserId, title: &str, content: &str) -> StoreResult<Post> {
        Ok(self.pool.with_connection(|conn| {
            let now = ts(Utc::now());
            conn.execute(
                "INSERT INTO posts (author_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![author.0, title, content, now],
            )?;
            let id = conn.last_insert_rowid();
            let raw = conn.query_row(
                "SELECT id, author_id, title, content, created_at, updated_at
                 FROM posts WHERE id = ?1",
                [id],
                map_post,
            )?;
            build_post(raw)
        })?)
    }

    fn post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.pool.with_connection(|conn| {
            let raw = conn
                .query_row(
                    "SELECT id, author_id, title, content, created_at, updated_at
                     FROM posts WHERE id = ?1",
                    [id.0],
                    map_post,
                )
                .optional()?;
            raw.map(build_post).transpose()
        })?)
    }

    fn update_post(
        &self,
        editor: UserId,
        id: PostId,
        title: &str,
        content: &str,
    ) -> StoreResult<Post> {
        Ok(self.pool.with_connection(|conn| {
            let author: Option<i64> = conn
                .query_row("SELECT author_id FROM posts WHERE id = ?1", [id.0], |row| {
                    row.get(0)
                })
                .optional()?;
            let author = author.ok_or_else(|| SqliteError::NotFound(format!("post {id}")))?;
            if author != editor.0 {
                return Err(SqliteError::Forbidden("only the author may edit".into()));
            }

            conn.execute(
                "UPDATE posts SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
                params![title, content, ts(Utc::now()), id.0],
            )?;
            let raw = conn.query_row(
                "SELECT id, author_id, title, content, created_at, updated_at
                 FROM posts WHERE id = ?1",
                [id.0],
                map_post,
            )?;
            build_post(raw)
        })?)
    }

    fn recent_posts(&self, limit: usize, offset: usize) -> StoreResult<Vec<Post>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, title, content, created_at, updated_at
                 FROM posts ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], map_post)?;
            rows.map(|raw| build_post(raw?)).collect()
        })?)
    }

    fn search_posts(&self, query: &str, limit: usize, offset: usize) -> StoreResult<Vec<Post>> {
        let pattern = format!(
            "%{}%",
            query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, title, content, created_at, updated_at
                 FROM posts
                 WHERE title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows =
                stmt.query_map(params![pattern, limit as i64, offset as i64], map_post)?;
            rows.map(|raw| build_post(raw?)).collect()
        })?)
    }

    fn add_comment(&self, post: PostId, author: UserId, content: &str) -> StoreResult<Comment> {
        Ok(self.pool.with_connection(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO comments (post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![post.0, author.0, content, ts(now)],
            )?;
            Ok(Comment {
                id: CommentId(conn.last_insert_rowid()),
                post,
                author,
                content: content.to_string(),
                created_at: now,
            })
        })?)
    }

    fn comments_for_post(&self, post: PostId) -> StoreResult<Vec<Comment>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, post_id, author_id, content, created_at
                 FROM comments WHERE post_id = ?1 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map([post.0], |row| {
                Ok((
                    CommentId(row.get(0)?),
                    PostId(row.get(1)?),
                    UserId(row.get(2)?),
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.map(|raw| {
                let (id, post, author, content, created_at) = raw?;
                Ok(Comment {
                    id,
                    post,
                    author,
                    content,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
        })?)
    }

    fn prior_commenters(&self, post: PostId) -> StoreResult<Vec<UserId>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT author_id FROM comments WHERE post_id = ?1
                 GROUP BY author_id ORDER BY MIN(id)",
            )?;
            let rows = stmt.query_map([post.0], |row| row.get::<_, i64>(0).map(UserId))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?)
    }

    fn toggle_like(&self, user: UserId, post: PostId) -> StoreResult<ToggleState> {
        Ok(self
            .pool
            .with_connection(|conn| self.toggle(conn, "likes", "post_id", user, post.0))?)
    }

    fn toggle_bookmark(&self, user: UserId, post: PostId) -> StoreResult<ToggleState> {
        Ok(self
            .pool
            .with_connection(|conn| self.toggle(conn, "bookmarks", "post_id", user, post.0))?)
    }

    fn has_liked(&self, user: UserId, post: PostId) -> StoreResult<bool> {
        Ok(self.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user.0, post.0],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })?)
    }

    fn has_bookmarked(&self, user: UserId, post: PostId) -> StoreResult<bool> {
        Ok(self.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
                params![user.0, post.0],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })?)
    }

    fn bookmarkers_of(&self, post: PostId) -> StoreResult<Vec<UserId>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM bookmarks WHERE post_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([post.0], |row| row.get::<_, i64>(0).map(UserId))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })?)
    }

    fn create_kairanban(
        &self,
        author: UserId,
        title: &str,
        content: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Kairanban> {
        Ok(self.pool.with_connection(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO kairanban (author_id, title, content, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![author.0, title, content, ts(now), ts(expires_at)],
            )?;
            Ok(Kairanban {
                id: KairanbanId(conn.last_insert_rowid()),
                author,
                title: title.to_string(),
                content: content.to_string(),
                created_at: now,
                expires_at,
            })
        })?)
    }

    fn kairanban(&self, id: KairanbanId) -> StoreResult<Option<Kairanban>> {
        Ok(self.pool.with_connection(|conn| {
            let raw = conn
                .query_row(
                    "SELECT id, author_id, title, content, created_at, expires_at
                     FROM kairanban WHERE id = ?1",
                    [id.0],
                    |row| {
                        Ok((
                            KairanbanId(row.get(0)?),
                            UserId(row.get(1)?),
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()?;
            raw.map(|(id, author, title, content, created_at, expires_at)| {
                Ok(Kairanban {
                    id,
                    author,
                    title,
                    content,
                    created_at: parse_ts(&created_at)?,
                    expires_at: parse_ts(&expires_at)?,
                })
            })
            .transpose()
        })?)
    }

    fn active_kairanban(&self, now: DateTime<Utc>) -> StoreResult<Vec<Kairanban>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, title, content, created_at, expires_at
                 FROM kairanban WHERE expires_at > ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([ts(now)], |row| {
                Ok((
                    KairanbanId(row.get(0)?),
                    UserId(row.get(1)?),
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;
            rows.map(|raw| {
                let (id, author, title, content, created_at, expires_at) = raw?;
                Ok(Kairanban {
                    id,
                    author,
                    title,
                    content,
                    created_at: parse_ts(&created_at)?,
                    expires_at: parse_ts(&expires_at)?,
                })
            })
            .collect()
        })?)
    }

    fn toggle_check(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<ToggleState> {
        Ok(self.pool.with_connection(|conn| {
            self.toggle(conn, "kairanban_checks", "kairanban_id", user, kairanban.0)
        })?)
    }

    fn has_checked(&self, user: UserId, kairanban: KairanbanId) -> StoreResult<bool> {
        Ok(self.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM kairanban_checks
                 WHERE user_id = ?1 AND kairanban_id = ?2",
                params![user.0, kairanban.0],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })?)
    }

    fn insert_notification(&self, new: NewNotification) -> StoreResult<NotificationId> {
        let (post_id, kairanban_id) = match new.target {
            Some(NotificationTarget::Post(id)) => (Some(id.0), None),
            Some(NotificationTarget::Kairanban(id)) => (None, Some(id.0)),
            None => (None, None),
        };
        Ok(self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT INTO notifications (recipient_id, message, created_at, post_id, kairanban_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.recipient.0, new.message, ts(Utc::now()), post_id, kairanban_id],
            )?;
            Ok(NotificationId(conn.last_insert_rowid()))
        })?)
    }

    fn recent_notifications(&self, user: UserId, limit: usize) -> StoreResult<Vec<Notification>> {
        Ok(self.pool.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let notifications = {
                let mut stmt = tx.prepare(
                    "SELECT id, recipient_id, message, is_read, created_at, post_id, kairanban_id
                     FROM notifications WHERE recipient_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user.0, limit as i64], |row| {
                    Ok((
                        NotificationId(row.get(0)?),
                        UserId(row.get(1)?),
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                })?;
                rows.map(|raw| {
                    let (id, recipient, message, is_read, created_at, post_id, kairanban_id) =
                        raw?;
                    let target = match (post_id, kairanban_id) {
                        (Some(p), _) => Some(NotificationTarget::Post(PostId(p))),
                        (None, Some(k)) => Some(NotificationTarget::Kairanban(KairanbanId(k))),
                        (None, None) => None,
                    };
                    Ok(Notification {
                        id,
                        recipient,
                        message,
                        is_read,
                        created_at: parse_ts(&created_at)?,
                        target,
                    })
                })
                .collect::<SqliteResult<Vec<_>>>()?
            };

            // Viewing the list marks the listed rows read.
            for notification in &notifications {
                tx.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                    [notification.id.0],
                )?;
            }
            tx.commit()?;
            Ok(notifications)
        })?)
    }

    fn has_unread_notifications(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [user.0],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })?)
    }

    fn users_with_custom_tag_in(&self, names: &[String]) -> StoreResult<Vec<UserId>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT ut.user_id FROM user_tags ut
             JOIN tags t ON t.id = ut.tag_id
             WHERE t.name IN ({}) ORDER BY ut.user_id",
            placeholders(names.len())
        );
        Ok(self
            .pool
            .with_connection(|conn| self.user_ids_matching(conn, &sql, names))?)
    }

    fn users_with_status_in(&self, names: &[String]) -> StoreResult<Vec<UserId>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        // Five status columns, each checked against the full name list.
        let set = placeholders(names.len());
        let sql = format!(
            "SELECT id FROM users
             WHERE grade IN ({set}) OR category IN ({set}) OR class IN ({set})
                OR program IN ({set}) OR major IN ({set})
             ORDER BY id"
        );
        Ok(self
            .pool
            .with_connection(|conn| self.user_ids_matching(conn, &sql, names))?)
    }

    fn upsert_push_subscription(&self, sub: PushSubscription) -> StoreResult<()> {
        let keys = serde_json::to_string(&sub.keys)
            .map_err(|e| SqliteError::Serialization(e.to_string()))?;
        Ok(self.pool.with_connection(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (user_id, endpoint, keys_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, endpoint) DO UPDATE SET keys_json = excluded.keys_json",
                params![sub.user.0, sub.endpoint, keys, ts(Utc::now())],
            )?;
            Ok(())
        })?)
    }

    fn remove_push_subscription(&self, user: UserId, endpoint: &str) -> StoreResult<()> {
        Ok(self.pool.with_connection(|conn| {
            conn.execute(
                "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
                params![user.0, endpoint],
            )?;
            Ok(())
        })?)
    }

    fn push_subscriptions(&self, user: UserId) -> StoreResult<Vec<PushSubscription>> {
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, endpoint, keys_json FROM push_subscriptions
                 WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([user.0], |row| {
                Ok((
                    UserId(row.get(0)?),
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.map(|raw| {
                let (user, endpoint, keys) = raw?;
                Ok(PushSubscription {
                    user,
                    endpoint,
                    keys: serde_json::from_str(&keys)
                        .map_err(|e| SqliteError::Serialization(e.to_string()))?,
                })
            })
            .collect()
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairan_core::NewUser;

    fn user(store: &SqliteStore, name: &str) -> User {
        store
            .create_user(NewUser {
                username: name.to_string(),
                password_hash: "x".to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn create_and_find_user() {
        let store = SqliteStore::memory().unwrap();
        let created = user(&store, "tanaka");
        assert!(created.notify_comment_like, "defaults on");
        assert!(!created.push_enabled, "push defaults off");

        let found = store.user_by_username("tanaka").unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.user_by_username("sato").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_an_error() {
        let store = SqliteStore::memory().unwrap();
        user(&store, "tanaka");
        let result = store.create_user(NewUser {
            username: "tanaka".to_string(),
            password_hash: "y".to_string(),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn tag_upsert_refreshes_recency() {
        let store = SqliteStore::memory().unwrap();
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(10);

        let first = store.fetch_or_create_tag("ロボ部", early).unwrap();
        let second = store.fetch_or_create_tag("ロボ部", late).unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.last_used > first.last_used);

        let other = store.fetch_or_create_tag("3年", early).unwrap();
        assert_ne!(other.id, first.id);

        let recent = store.recent_tags(10).unwrap();
        assert_eq!(recent[0].name, "ロボ部");
    }

    #[test]
    fn tag_prefix_search_escapes_like_wildcards() {
        let store = SqliteStore::memory().unwrap();
        let now = Utc::now();
        store.fetch_or_create_tag("abc", now).unwrap();
        store.fetch_or_create_tag("a%c", now).unwrap();

        let hits = store.search_tags("a%", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "a%c");
    }

    #[test]
    fn toggle_like_round_trip() {
        let store = SqliteStore::memory().unwrap();
        let u = user(&store, "u");
        let p = store.create_post(u.id, "t", "c").unwrap();

        assert!(store.toggle_like(u.id, p.id).unwrap().is_on());
        assert!(store.has_liked(u.id, p.id).unwrap());
        assert!(!store.toggle_like(u.id, p.id).unwrap().is_on());
        assert!(!store.has_liked(u.id, p.id).unwrap());
        assert!(store.toggle_like(u.id, p.id).unwrap().is_on());
    }

    #[test]
    fn update_post_checks_ownership_and_stamps() {
        let store = SqliteStore::memory().unwrap();
        let author = user(&store, "author");
        let other = user(&store, "other");
        let post = store.create_post(author.id, "t", "c").unwrap();
        assert!(post.updated_at.is_none());

        let err = store
            .update_post(other.id, post.id, "t2", "c2")
            .unwrap_err();
        assert!(matches!(err, kairan_core::StoreError::Forbidden(_)));

        let edited = store.update_post(author.id, post.id, "t2", "c2").unwrap();
        assert_eq!(edited.title, "t2");
        assert!(edited.updated_at.is_some());
    }

    #[test]
    fn search_posts_matches_title_or_content() {
        let store = SqliteStore::memory().unwrap();
        let u = user(&store, "u");
        store.create_post(u.id, "回路実験", "抵抗の話").unwrap();
        store.create_post(u.id, "雑談", "実験つらい").unwrap();
        store.create_post(u.id, "無関係", "別の話").unwrap();

        let hits = store.search_posts("実験", 10, 0).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn prior_commenters_distinct_in_first_comment_order() {
        let store = SqliteStore::memory().unwrap();
        let a = user(&store, "a");
        let b = user(&store, "b");
        let p = store.create_post(a.id, "t", "c").unwrap();

        store.add_comment(p.id, b.id, "1").unwrap();
        store.add_comment(p.id, a.id, "2").unwrap();
        store.add_comment(p.id, b.id, "3").unwrap();

        assert_eq!(store.prior_commenters(p.id).unwrap(), vec![b.id, a.id]);
    }

    #[test]
    fn notification_listing_marks_read() {
        let store = SqliteStore::memory().unwrap();
        let u = user(&store, "u");
        let p = store.create_post(u.id, "t", "c").unwrap();

        for i in 0..3 {
            store
                .insert_notification(NewNotification {
                    recipient: u.id,
                    message: format!("m{i}"),
                    target: Some(NotificationTarget::Post(p.id)),
                })
                .unwrap();
        }
        assert!(store.has_unread_notifications(u.id).unwrap());

        let listed = store.recent_notifications(u.id, 5).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(!store.has_unread_notifications(u.id).unwrap());
    }

    #[test]
    fn audience_queries_match_custom_and_status() {
        let store = SqliteStore::memory().unwrap();
        let a = user(&store, "a");
        store
            .update_profile(
                a.id,
                ProfileUpdate {
                    grade: Some("3年".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let b = user(&store, "b");
        let tag = store.fetch_or_create_tag("ロボ部", Utc::now()).unwrap();
        store.set_user_tags(b.id, &[tag.id]).unwrap();
        user(&store, "c");

        let names = vec!["3年".to_string(), "ロボ部".to_string()];
        assert_eq!(store.users_with_status_in(&names).unwrap(), vec![a.id]);
        assert_eq!(store.users_with_custom_tag_in(&names).unwrap(), vec![b.id]);
    }

    #[test]
    fn push_subscription_upsert_and_remove() {
        let store = SqliteStore::memory().unwrap();
        let u = user(&store, "u");
        let sub = PushSubscription {
            user: u.id,
            endpoint: "https://push.example/ep1".to_string(),
            keys: serde_json::json!({"p256dh": "k", "auth": "a"}),
        };
        store.upsert_push_subscription(sub.clone()).unwrap();
        // Same endpoint, new keys: replaces, not duplicates
        let mut renewed = sub.clone();
        renewed.keys = serde_json::json!({"p256dh": "k2", "auth": "a2"});
        store.upsert_push_subscription(renewed.clone()).unwrap();

        let subs = store.push_subscriptions(u.id).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].keys["p256dh"], "k2");

        store
            .remove_push_subscription(u.id, "https://push.example/ep1")
            .unwrap();
        assert!(store.push_subscriptions(u.id).unwrap().is_empty());
    }
}
