use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every failure a handler can surface. Rendered as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidCredentials(&'static str),

    #[error("Unauthorized. {0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("{0}")]
    UpdateFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) | ApiError::UpdateFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidCredentials(_) | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }
}

/// Unreadable bodies: 422 when the payload parsed but had the wrong shape, 400 otherwise.
fn from_rejection(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        ApiError::Validation(text)
    } else {
        ApiError::BadRequest(text)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                e.to_string()
            }
            ApiError::Storage(msg) => {
                tracing::error!(error = %msg, "storage error");
                self.to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(
            response_status(ApiError::validation("Fill in all fields.")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            response_status(ApiError::Conflict("Email already exists.".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            response_status(ApiError::InvalidCredentials("Invalid credentials.")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            response_status(ApiError::Unauthorized("No token.")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            response_status(ApiError::Forbidden("nope".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            response_status(ApiError::not_found("Post not found.")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            response_status(ApiError::TooLarge("big".into())),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            response_status(ApiError::UpdateFailed("Couldn't update post.".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unexpected_errors_default_to_500() {
        let err = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(response_status(err), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response_status(ApiError::Storage("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_message() {
        let res = ApiError::validation("Passwords do not match.").into_response();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["message"], "Passwords do not match.");
    }
}
