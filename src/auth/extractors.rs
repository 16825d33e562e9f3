use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::error::ApiError;

/// Caller identity taken from a verified bearer token.
///
/// Used as an extractor on every protected handler; the handler never runs
/// when the token is missing, malformed, badly signed or expired.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized("No token."))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized("Invalid token.")
        })?;

        Ok(AuthUser {
            id: claims.id,
            name: claims.name,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::http::Request;

    #[derive(Clone)]
    struct TestState(JwtKeys);

    impl FromRef<TestState> for JwtKeys {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn state() -> TestState {
        TestState(JwtKeys::from(&JwtConfig {
            secret: "gate-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 60,
        }))
    }

    async fn extract(header: Option<&str>, st: &TestState) -> Result<AuthUser, ApiError> {
        let mut req = Request::builder().uri("/");
        if let Some(h) = header {
            req = req.header(AUTHORIZATION, h);
        }
        let (mut parts, _) = req.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, st).await
    }

    #[tokio::test]
    async fn missing_header_is_no_token() {
        let err = extract(None, &state()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("No token.")));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_no_token() {
        let err = extract(Some("Basic abc"), &state()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("No token.")));
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let err = extract(Some("Bearer not.a.jwt"), &state()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("Invalid token.")));
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let st = state();
        let id = Uuid::new_v4();
        let token = st.0.sign(id, "alice").unwrap();
        let user = extract(Some(&format!("Bearer {token}")), &st).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name, "alice");
    }
}
