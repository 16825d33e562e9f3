use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, ProfileChanges, ProfileUpdate, User};

/// Credential store.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn list(&self) -> anyhow::Result<Vec<User>>;
    /// `None` when the email is already registered.
    async fn create(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>>;
    /// `None` when the user no longer exists.
    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>>;
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges<'_>,
    ) -> anyhow::Result<ProfileUpdate>;
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, avatar, post_count, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(users)
    }

    async fn create(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET avatar = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(avatar)
        .fetch_optional(&self.db)
        .await
        .context("update avatar")?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges<'_>,
    ) -> anyhow::Result<ProfileUpdate> {
        let res = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET name = $2, email = $3, password_hash = $4, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await;

        match res {
            Ok(Some(user)) => Ok(ProfileUpdate::Updated(user)),
            Ok(None) => Ok(ProfileUpdate::NotFound),
            // lost a race with another writer claiming the same email
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(ProfileUpdate::EmailTaken)
            }
            Err(e) => Err(e).context("update user profile"),
        }
    }
}
