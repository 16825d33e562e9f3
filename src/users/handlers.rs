use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{EditUserRequest, LoginRequest, LoginResponse, RegisterRequest},
    repo_types::User,
    services,
};
use crate::{
    attachments::read_form,
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/authors", get(list_authors))
        .route("/users/change-avatar", post(change_avatar))
        .route("/users/edit-user", post(edit_user))
        .route("/users/:id", get(get_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<String>)> {
    let Json(payload) = payload?;
    let msg = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(msg)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    Ok(Json(services::login(&state, payload).await?))
}

#[instrument(skip(state, _caller))]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    Ok(Json(services::get_profile(&state, &id).await?))
}

#[instrument(skip(state))]
pub async fn list_authors(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(services::list_authors(&state).await?))
}

/// POST /users/change-avatar (multipart, file field `avatar`)
#[instrument(skip(state, caller, mp), fields(user_id = %caller.id))]
pub async fn change_avatar(
    State(state): State<AppState>,
    caller: AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<User>> {
    let form = read_form(mp?, "avatar").await?;
    Ok(Json(
        services::change_avatar(&state, &caller, form.file).await?,
    ))
}

#[instrument(skip(state, caller, payload), fields(user_id = %caller.id))]
pub async fn edit_user(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<EditUserRequest>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(payload) = payload?;
    Ok(Json(services::edit_profile(&state, &caller, payload).await?))
}
