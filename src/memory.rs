//! In-process document store used when no `DATABASE_URL` is configured.
//!
//! Users and posts share one lock so a post insert/delete and the creator's
//! counter move together, like the Postgres transaction does.

use std::cmp::Reverse;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    posts::{
        repo::PostRepo,
        repo_types::{NewPost, Post, PostChanges, RemovedPost},
    },
    users::{
        repo::UserRepo,
        repo_types::{NewUser, ProfileChanges, ProfileUpdate, User},
    },
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    // insertion order; newest last
    posts: Vec<Post>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first by `key`; ties keep the most recently inserted first.
fn newest_first<'a, F>(posts: impl DoubleEndedIterator<Item = &'a Post>, key: F) -> Vec<Post>
where
    F: Fn(&Post) -> OffsetDateTime,
{
    let mut out: Vec<Post> = posts.rev().cloned().collect();
    out.sort_by_key(|p| Reverse(key(p)));
    out
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn create(&self, new: NewUser<'_>) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name.to_string(),
            email: new.email.to_string(),
            password_hash: new.password_hash.to_string(),
            avatar: None,
            post_count: 0,
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(Some(user))
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.write().await;
        Ok(t.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.avatar = Some(avatar.to_string());
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges<'_>,
    ) -> anyhow::Result<ProfileUpdate> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == changes.email && u.id != id) {
            return Ok(ProfileUpdate::EmailTaken);
        }
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(ProfileUpdate::NotFound);
        };
        user.name = changes.name.to_string();
        user.email = changes.email.to_string();
        user.password_hash = changes.password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(ProfileUpdate::Updated(user.clone()))
    }
}

#[async_trait]
impl PostRepo for MemoryStore {
    async fn create(&self, new: NewPost<'_>) -> anyhow::Result<Post> {
        let mut t = self.tables.write().await;
        let creator = t
            .users
            .iter_mut()
            .find(|u| u.id == new.creator)
            .ok_or_else(|| anyhow::anyhow!("creator {} does not exist", new.creator))?;
        creator.post_count += 1;

        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: Uuid::new_v4(),
            title: new.title.to_string(),
            category: new.category.to_string(),
            desc: new.desc.to_string(),
            thumbnail: new.thumbnail.to_string(),
            creator: new.creator,
            created_at: now,
            updated_at: now,
        };
        t.posts.push(post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let t = self.tables.read().await;
        Ok(t.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_recent(&self) -> anyhow::Result<Vec<Post>> {
        let t = self.tables.read().await;
        Ok(newest_first(t.posts.iter(), |p| p.updated_at))
    }

    async fn list_by_category(&self, category: &str) -> anyhow::Result<Vec<Post>> {
        let t = self.tables.read().await;
        let matching: Vec<&Post> = t.posts.iter().filter(|p| p.category == category).collect();
        Ok(newest_first(matching.into_iter(), |p| p.created_at))
    }

    async fn list_by_creator(&self, creator: Uuid) -> anyhow::Result<Vec<Post>> {
        let t = self.tables.read().await;
        let matching: Vec<&Post> = t.posts.iter().filter(|p| p.creator == creator).collect();
        Ok(newest_first(matching.into_iter(), |p| p.created_at))
    }

    async fn update(
        &self,
        id: Uuid,
        creator: Uuid,
        changes: PostChanges<'_>,
    ) -> anyhow::Result<Option<Post>> {
        let mut t = self.tables.write().await;
        let Some(post) = t
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.creator == creator)
        else {
            return Ok(None);
        };
        post.title = changes.title.to_string();
        post.category = changes.category.to_string();
        post.desc = changes.desc.to_string();
        if let Some(thumbnail) = changes.thumbnail {
            post.thumbnail = thumbnail.to_string();
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(Some(post.clone()))
    }

    async fn delete(&self, id: Uuid, creator: Uuid) -> anyhow::Result<Option<RemovedPost>> {
        let mut t = self.tables.write().await;
        let Some(idx) = t
            .posts
            .iter()
            .position(|p| p.id == id && p.creator == creator)
        else {
            return Ok(None);
        };
        t.posts.remove(idx);

        let removed = match t.users.iter_mut().find(|u| u.id == creator) {
            Some(user) => {
                let clamped = user.post_count <= 0;
                user.post_count = (user.post_count - 1).max(0);
                RemovedPost {
                    post_count: user.post_count,
                    clamped,
                }
            }
            None => RemovedPost {
                post_count: 0,
                clamped: true,
            },
        };
        Ok(Some(removed))
    }
}
