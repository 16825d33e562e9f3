use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewPost, Post, PostChanges, RemovedPost};

/// Post records. Creating and removing a post also moves the creator's
/// `post_count`, in the same atomic step.
#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create(&self, new: NewPost<'_>) -> anyhow::Result<Post>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// Most recently updated first.
    async fn list_recent(&self) -> anyhow::Result<Vec<Post>>;
    /// Most recently created first.
    async fn list_by_category(&self, category: &str) -> anyhow::Result<Vec<Post>>;
    /// Most recently created first.
    async fn list_by_creator(&self, creator: Uuid) -> anyhow::Result<Vec<Post>>;
    /// `None` when no post with this id and creator exists.
    async fn update(
        &self,
        id: Uuid,
        creator: Uuid,
        changes: PostChanges<'_>,
    ) -> anyhow::Result<Option<Post>>;
    /// `None` when no post with this id and creator exists.
    async fn delete(&self, id: Uuid, creator: Uuid) -> anyhow::Result<Option<RemovedPost>>;
}

const POST_COLUMNS: &str =
    "id, title, category, description, thumbnail, creator, created_at, updated_at";

#[derive(Clone)]
pub struct PgPostRepo {
    db: PgPool,
}

impl PgPostRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostRepo for PgPostRepo {
    async fn create(&self, new: NewPost<'_>) -> anyhow::Result<Post> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (id, title, category, description, thumbnail, creator)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.title)
        .bind(new.category)
        .bind(new.desc)
        .bind(new.thumbnail)
        .bind(new.creator)
        .fetch_one(&mut *tx)
        .await
        .context("insert post")?;

        sqlx::query("UPDATE users SET post_count = post_count + 1 WHERE id = $1")
            .bind(new.creator)
            .execute(&mut *tx)
            .await
            .context("increment post_count")?;

        tx.commit().await.context("commit tx")?;
        Ok(post)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find post by id")?;
        Ok(post)
    }

    async fn list_recent(&self) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list posts")?;
        Ok(rows)
    }

    async fn list_by_category(&self, category: &str) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
              FROM posts
             WHERE category = $1
             ORDER BY created_at DESC
            "#
        ))
        .bind(category)
        .fetch_all(&self.db)
        .await
        .context("list posts by category")?;
        Ok(rows)
    }

    async fn list_by_creator(&self, creator: Uuid) -> anyhow::Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
              FROM posts
             WHERE creator = $1
             ORDER BY created_at DESC
            "#
        ))
        .bind(creator)
        .fetch_all(&self.db)
        .await
        .context("list posts by creator")?;
        Ok(rows)
    }

    async fn update(
        &self,
        id: Uuid,
        creator: Uuid,
        changes: PostChanges<'_>,
    ) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
               SET title = $3,
                   category = $4,
                   description = $5,
                   thumbnail = COALESCE($6, thumbnail),
                   updated_at = now()
             WHERE id = $1 AND creator = $2
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(creator)
        .bind(changes.title)
        .bind(changes.category)
        .bind(changes.desc)
        .bind(changes.thumbnail)
        .fetch_optional(&self.db)
        .await
        .context("update post")?;
        Ok(post)
    }

    async fn delete(&self, id: Uuid, creator: Uuid) -> anyhow::Result<Option<RemovedPost>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let deleted = sqlx::query("DELETE FROM posts WHERE id = $1 AND creator = $2")
            .bind(id)
            .bind(creator)
            .execute(&mut *tx)
            .await
            .context("delete post")?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await.context("rollback tx")?;
            return Ok(None);
        }

        let counter = sqlx::query_as::<_, (i32, bool)>(
            r#"
            WITH prev AS (
                SELECT post_count FROM users WHERE id = $1 FOR UPDATE
            )
            UPDATE users u
               SET post_count = GREATEST(prev.post_count - 1, 0)
              FROM prev
             WHERE u.id = $1
            RETURNING u.post_count, prev.post_count - 1 < 0
            "#,
        )
        .bind(creator)
        .fetch_optional(&mut *tx)
        .await
        .context("decrement post_count")?;

        tx.commit().await.context("commit tx")?;

        // creator row missing: the FK makes this unreachable, report it as clamped
        let (post_count, clamped) = counter.unwrap_or((0, true));
        Ok(Some(RemovedPost {
            post_count,
            clamped,
        }))
    }
}
