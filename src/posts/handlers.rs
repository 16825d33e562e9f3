use axum::{
    extract::{multipart::MultipartRejection, FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::get,
    Form, Json, Router,
};
use tracing::instrument;

use super::{dto::PostFields, repo_types::Post, services};
use crate::{
    attachments::{read_form, UploadItem},
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(edit_post).delete(delete_post),
        )
        .route("/posts/categories/:category", get(list_by_category))
        .route("/posts/users/:id", get(list_by_author))
}

/// Text fields plus the optional `thumbnail` file. Multipart bodies may carry a
/// file; JSON and urlencoded bodies carry text only.
async fn read_post_body(
    req: Request,
    state: &AppState,
) -> ApiResult<(PostFields, Option<UploadItem>)> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mp = Multipart::from_request(req, state).await?;
        let form = read_form(mp, "thumbnail").await?;
        Ok((PostFields::from(&form), form.file))
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<PostFields>::from_request(req, state).await?;
        Ok((fields.trimmed(), None))
    } else {
        let Json(fields) = Json::<PostFields>::from_request(req, state).await?;
        Ok((fields.trimmed(), None))
    }
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(services::list_posts(&state).await?))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Post>> {
    Ok(Json(services::get_post(&state, &id).await?))
}

#[instrument(skip(state))]
pub async fn list_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(services::list_by_category(&state, &category).await?))
}

#[instrument(skip(state))]
pub async fn list_by_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(services::list_by_author(&state, &id).await?))
}

/// POST /posts (multipart: title, category, desc, file field `thumbnail`)
#[instrument(skip(state, caller, mp), fields(user_id = %caller.id))]
pub async fn create_post(
    State(state): State<AppState>,
    caller: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let form = read_form(mp?, "thumbnail").await?;
    let fields = PostFields::from(&form);
    let post = services::create_post(&state, &caller, fields, form.file).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PATCH /posts/:id (multipart with optional `thumbnail`, or JSON / urlencoded text)
#[instrument(skip(state, caller, req), fields(user_id = %caller.id))]
pub async fn edit_post(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<Post>> {
    let (fields, thumbnail) = read_post_body(req, &state).await?;
    Ok(Json(
        services::edit_post(&state, &caller, &id, fields, thumbnail).await?,
    ))
}

#[instrument(skip(state, caller), fields(user_id = %caller.id))]
pub async fn delete_post(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<String>> {
    Ok(Json(services::delete_post(&state, &caller, &id).await?))
}
