use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::PostFields,
    repo_types::{NewPost, Post, PostChanges},
};
use crate::{
    attachments::{AttachmentSaga, UploadItem},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const THUMBNAIL_MAX_BYTES: usize = 2_000_000;
pub const MIN_DESC_LEN: usize = 12;

const THUMBNAIL_TOO_BIG: &str = "Thumbnail too big. File should be less than 2MB.";

fn parse_post_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::not_found("Post not found."))
}

/// Load a post and make sure `caller` wrote it.
async fn owned_post(st: &AppState, caller: &AuthUser, id: Uuid, action: &str) -> ApiResult<Post> {
    let post = st
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found."))?;
    if post.creator != caller.id {
        warn!(post_id = %id, user_id = %caller.id, creator = %post.creator, "not the creator");
        return Err(ApiError::Forbidden(format!(
            "Only the author can {action} this post."
        )));
    }
    Ok(post)
}

pub async fn create_post(
    st: &AppState,
    caller: &AuthUser,
    fields: PostFields,
    thumbnail: Option<UploadItem>,
) -> ApiResult<Post> {
    let thumbnail = match thumbnail {
        Some(t) if !fields.title.is_empty()
            && !fields.category.is_empty()
            && !fields.desc.is_empty() => t,
        _ => {
            return Err(ApiError::validation(
                "Fill in all fields and choose thumbnail.",
            ))
        }
    };
    thumbnail.ensure_within(THUMBNAIL_MAX_BYTES, THUMBNAIL_TOO_BIG)?;

    if st.users.find_by_id(caller.id).await?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }

    let mut saga = AttachmentSaga::new(st.storage.as_ref());
    let name = saga.write_attachment(&thumbnail).await?;
    let post = saga
        .write_record(async {
            let post = st
                .posts
                .create(NewPost {
                    title: &fields.title,
                    category: &fields.category,
                    desc: &fields.desc,
                    thumbnail: &name,
                    creator: caller.id,
                })
                .await?;
            Ok(post)
        })
        .await?;
    saga.commit(None).await;

    info!(post_id = %post.id, user_id = %caller.id, author = %caller.name, thumbnail = %post.thumbnail, "post created");
    Ok(post)
}

pub async fn list_posts(st: &AppState) -> ApiResult<Vec<Post>> {
    Ok(st.posts.list_recent().await?)
}

pub async fn get_post(st: &AppState, id: &str) -> ApiResult<Post> {
    let id = parse_post_id(id)?;
    st.posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found."))
}

pub async fn list_by_category(st: &AppState, category: &str) -> ApiResult<Vec<Post>> {
    Ok(st.posts.list_by_category(category).await?)
}

pub async fn list_by_author(st: &AppState, creator: &str) -> ApiResult<Vec<Post>> {
    // an unknown author simply has no posts
    match Uuid::parse_str(creator.trim()) {
        Ok(id) => Ok(st.posts.list_by_creator(id).await?),
        Err(_) => Ok(Vec::new()),
    }
}

pub async fn edit_post(
    st: &AppState,
    caller: &AuthUser,
    id: &str,
    fields: PostFields,
    thumbnail: Option<UploadItem>,
) -> ApiResult<Post> {
    if fields.title.is_empty() || fields.category.is_empty() {
        return Err(ApiError::validation("Fill in all fields."));
    }
    if fields.desc.chars().count() < MIN_DESC_LEN {
        return Err(ApiError::validation(
            "Description should be at least 12 characters.",
        ));
    }
    if let Some(t) = &thumbnail {
        t.ensure_within(THUMBNAIL_MAX_BYTES, THUMBNAIL_TOO_BIG)?;
    }

    let post_id = parse_post_id(id)?;
    let old = owned_post(st, caller, post_id, "edit").await?;

    let update_failed = || ApiError::UpdateFailed("Couldn't update post.".into());
    let Some(thumbnail) = thumbnail else {
        let updated = st
            .posts
            .update(
                post_id,
                caller.id,
                PostChanges {
                    title: &fields.title,
                    category: &fields.category,
                    desc: &fields.desc,
                    thumbnail: None,
                },
            )
            .await?
            .ok_or_else(update_failed)?;
        info!(post_id = %post_id, user_id = %caller.id, author = %caller.name, "post updated");
        return Ok(updated);
    };

    let mut saga = AttachmentSaga::new(st.storage.as_ref());
    let name = saga.write_attachment(&thumbnail).await?;
    let updated = saga
        .write_record(async {
            st.posts
                .update(
                    post_id,
                    caller.id,
                    PostChanges {
                        title: &fields.title,
                        category: &fields.category,
                        desc: &fields.desc,
                        thumbnail: Some(&name),
                    },
                )
                .await?
                .ok_or_else(update_failed)
        })
        .await?;
    saga.commit(Some(&old.thumbnail)).await;

    info!(post_id = %post_id, user_id = %caller.id, author = %caller.name, thumbnail = %name, "post updated with new thumbnail");
    Ok(updated)
}

pub async fn delete_post(st: &AppState, caller: &AuthUser, id: &str) -> ApiResult<String> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("Post unavailable.".into()));
    }
    let post_id = parse_post_id(id)?;
    let post = owned_post(st, caller, post_id, "delete").await?;

    st.storage
        .delete_object(&post.thumbnail)
        .await
        .map_err(|e| {
            error!(error = %e, post_id = %post_id, attachment = %post.thumbnail, "thumbnail delete failed; post kept");
            ApiError::Storage(e.to_string())
        })?;

    match st.posts.delete(post_id, caller.id).await {
        Ok(Some(removed)) => {
            if removed.clamped {
                warn!(user_id = %caller.id, "post_count would have gone negative; held at zero");
            }
            info!(post_id = %post_id, user_id = %caller.id, post_count = removed.post_count, "post deleted");
            Ok(format!("Post {post_id} deleted successfully."))
        }
        Ok(None) => {
            warn!(post_id = %post_id, attachment = %post.thumbnail, "post vanished while deleting");
            Err(ApiError::not_found("Post not found."))
        }
        Err(e) => {
            error!(error = %e, post_id = %post_id, attachment = %post.thumbnail, "thumbnail removed but post record kept; dangling reference");
            Err(e.into())
        }
    }
}
