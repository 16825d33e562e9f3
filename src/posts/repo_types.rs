use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    #[sqlx(rename = "description")]
    pub desc: String,
    pub thumbnail: String, // generated attachment name
    pub creator: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy)]
pub struct NewPost<'a> {
    pub title: &'a str,
    pub category: &'a str,
    pub desc: &'a str,
    pub thumbnail: &'a str,
    pub creator: Uuid,
}

/// Editable fields; `thumbnail: None` keeps the current attachment.
#[derive(Debug, Clone, Copy)]
pub struct PostChanges<'a> {
    pub title: &'a str,
    pub category: &'a str,
    pub desc: &'a str,
    pub thumbnail: Option<&'a str>,
}

/// Creator's counter after a post was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedPost {
    pub post_count: i32,
    /// The counter would have gone negative and was held at zero.
    pub clamped: bool,
}
