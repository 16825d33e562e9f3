use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{EditUserRequest, LoginRequest, LoginResponse, RegisterRequest},
    repo_types::{NewUser, ProfileChanges, ProfileUpdate, User},
};
use crate::{
    attachments::{AttachmentSaga, UploadItem},
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        AuthUser, JwtKeys,
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const AVATAR_MAX_BYTES: usize = 500_000;
pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are compared and stored in this form everywhere.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn all_present(fields: &[&str]) -> bool {
    fields.iter().all(|f| !f.trim().is_empty())
}

pub async fn register(st: &AppState, req: RegisterRequest) -> ApiResult<String> {
    if !all_present(&[
        req.name.as_str(),
        req.email.as_str(),
        req.password.as_str(),
        req.password2.as_str(),
    ]) {
        return Err(ApiError::validation("Fill in all fields."));
    }

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::validation("Invalid email."));
    }

    if st.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::Conflict("Email already exists.".into()));
    }

    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "Password should be at least 6 characters.",
        ));
    }

    if req.password != req.password2 {
        return Err(ApiError::validation("Passwords do not match."));
    }

    let hash = hash_password_blocking(req.password).await?;
    let user = st
        .users
        .create(NewUser {
            name: req.name.trim(),
            email: &email,
            password_hash: &hash,
        })
        .await?
        // a concurrent registration won the race for this email
        .ok_or_else(|| ApiError::Conflict("Email already exists.".into()))?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(format!("New user {} registered.", user.email))
}

pub async fn login(st: &AppState, req: LoginRequest) -> ApiResult<LoginResponse> {
    if !all_present(&[req.email.as_str(), req.password.as_str()]) {
        return Err(ApiError::validation("Fill in all fields."));
    }

    let email = normalize_email(&req.email);
    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(ApiError::InvalidCredentials("Invalid credentials."));
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials("Invalid credentials."));
    }

    let token = JwtKeys::from(&st.config.jwt).sign(user.id, &user.name)?;

    info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse {
        token,
        id: user.id,
        name: user.name,
    })
}

pub async fn get_profile(st: &AppState, id: &str) -> ApiResult<User> {
    let id = Uuid::parse_str(id).map_err(|_| ApiError::not_found("User not found."))?;
    st.users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))
}

pub async fn list_authors(st: &AppState) -> ApiResult<Vec<User>> {
    Ok(st.users.list().await?)
}

pub async fn change_avatar(
    st: &AppState,
    caller: &AuthUser,
    upload: Option<UploadItem>,
) -> ApiResult<User> {
    let upload = upload.ok_or_else(|| ApiError::validation("Please choose an image."))?;
    upload.ensure_within(
        AVATAR_MAX_BYTES,
        "Profile picture too big. Should be less than 500kb.",
    )?;

    let user = st
        .users
        .find_by_id(caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let mut saga = AttachmentSaga::new(st.storage.as_ref());
    let name = saga.write_attachment(&upload).await?;
    let updated = saga
        .write_record(async {
            st.users
                .set_avatar(caller.id, &name)
                .await?
                .ok_or_else(|| ApiError::UpdateFailed("Avatar couldn't be changed.".into()))
        })
        .await?;
    saga.commit(user.avatar.as_deref()).await;

    info!(user_id = %caller.id, avatar = %name, "avatar changed");
    Ok(updated)
}

pub async fn edit_profile(
    st: &AppState,
    caller: &AuthUser,
    req: EditUserRequest,
) -> ApiResult<User> {
    if !all_present(&[
        req.name.as_str(),
        req.email.as_str(),
        req.current_password.as_str(),
        req.new_password.as_str(),
        req.confirm_new_password.as_str(),
    ]) {
        return Err(ApiError::validation("Fill in all fields."));
    }

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("Invalid email."));
    }

    let user = st
        .users
        .find_by_id(caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    if let Some(owner) = st.users.find_by_email(&email).await? {
        if owner.id != caller.id {
            warn!(user_id = %caller.id, %email, "email belongs to another user");
            return Err(ApiError::Conflict("Email already exists.".into()));
        }
    }

    if !verify_password_blocking(req.current_password, user.password_hash).await? {
        warn!(user_id = %caller.id, "edit profile with wrong current password");
        return Err(ApiError::InvalidCredentials("Invalid current password."));
    }

    if req.new_password != req.confirm_new_password {
        return Err(ApiError::validation("New passwords do not match."));
    }
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(
            "Password should be at least 6 characters.",
        ));
    }

    let hash = hash_password_blocking(req.new_password).await?;
    let changes = ProfileChanges {
        name: req.name.trim(),
        email: &email,
        password_hash: &hash,
    };
    match st.users.update_profile(caller.id, changes).await? {
        ProfileUpdate::Updated(user) => {
            info!(user_id = %user.id, "profile updated");
            Ok(user)
        }
        ProfileUpdate::NotFound => Err(ApiError::not_found("User not found.")),
        ProfileUpdate::EmailTaken => Err(ApiError::Conflict("Email already exists.".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn register_req(name: &str, email: &str, pw: &str, pw2: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: pw.into(),
            password2: pw2.into(),
        }
    }

    async fn registered(st: &AppState, name: &str, email: &str) -> AuthUser {
        register(st, register_req(name, email, "secret1", "secret1"))
            .await
            .unwrap();
        let res = login(
            st,
            LoginRequest {
                email: email.into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();
        AuthUser {
            id: res.id,
            name: res.name,
        }
    }

    fn image(len: usize) -> UploadItem {
        UploadItem {
            file_name: "me.png".into(),
            content_type: "image/png".into(),
            body: Bytes::from(vec![1u8; len]),
        }
    }

    fn edit_req(email: &str, current: &str, new: &str, confirm: &str) -> EditUserRequest {
        EditUserRequest {
            name: "Alice B".into(),
            email: email.into(),
            current_password: current.into(),
            new_password: new.into(),
            confirm_new_password: confirm.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@x.com"));
        assert!(!is_valid_email("alice@x"));
        assert!(!is_valid_email("no spaces@x.com"));
    }

    #[tokio::test]
    async fn register_confirms_with_lowercased_email() {
        let (st, _) = AppState::in_memory();
        let msg = register(&st, register_req("Alice", "Alice@X.com", "secret1", "secret1"))
            .await
            .unwrap();
        assert_eq!(msg, "New user alice@x.com registered.");

        let user = st.users.find_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(user.post_count, 0);
        assert!(user.avatar.is_none());
        assert_ne!(user.password_hash, "secret1");
    }

    #[tokio::test]
    async fn emails_differing_only_in_case_are_duplicates() {
        let (st, _) = AppState::in_memory();
        register(&st, register_req("A", "alice@x.com", "secret1", "secret1"))
            .await
            .unwrap();
        let err = register(&st, register_req("B", "ALICE@X.COM", "secret1", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let (st, _) = AppState::in_memory();
        let missing = register(&st, register_req("", "a@x.com", "secret1", "secret1")).await;
        assert!(matches!(missing, Err(ApiError::Validation(_))));

        let short = register(&st, register_req("A", "a@x.com", "12345", "12345")).await;
        assert!(matches!(short, Err(ApiError::Validation(m)) if m.contains("6 characters")));

        let mismatch = register(&st, register_req("A", "a@x.com", "secret1", "secret2")).await;
        assert!(matches!(mismatch, Err(ApiError::Validation(m)) if m.contains("do not match")));

        assert!(st.users.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_issues_verifiable_token() {
        let (st, _) = AppState::in_memory();
        register(&st, register_req("Alice", "alice@x.com", "secret1", "secret1"))
            .await
            .unwrap();
        let res = login(
            &st,
            LoginRequest {
                email: "ALICE@x.com".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(res.name, "Alice");
        let claims = JwtKeys::from(&st.config.jwt).verify(&res.token).unwrap();
        assert_eq!(claims.id, res.id);
        assert_eq!(claims.name, "Alice");
    }

    #[tokio::test]
    async fn login_failures_are_invalid_credentials() {
        let (st, _) = AppState::in_memory();
        registered(&st, "Alice", "alice@x.com").await;

        let unknown = login(
            &st,
            LoginRequest {
                email: "bob@x.com".into(),
                password: "secret1".into(),
            },
        )
        .await;
        assert!(matches!(unknown, Err(ApiError::InvalidCredentials(_))));

        let wrong = login(
            &st,
            LoginRequest {
                email: "alice@x.com".into(),
                password: "wrong-pw".into(),
            },
        )
        .await;
        assert!(matches!(wrong, Err(ApiError::InvalidCredentials(_))));

        let missing = login(&st, LoginRequest::default()).await;
        assert!(matches!(missing, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn profile_and_authors() {
        let (st, _) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;
        registered(&st, "Bob", "bob@x.com").await;

        let profile = get_profile(&st, &alice.id.to_string()).await.unwrap();
        assert_eq!(profile.name, "Alice");
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["postCount"], 0);

        let missing = get_profile(&st, &Uuid::new_v4().to_string()).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
        let garbage = get_profile(&st, "not-an-id").await;
        assert!(matches!(garbage, Err(ApiError::NotFound(_))));

        assert_eq!(list_authors(&st).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn avatar_boundary_and_replacement() {
        let (st, storage) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;

        let too_big = change_avatar(&st, &alice, Some(image(AVATAR_MAX_BYTES + 1))).await;
        assert!(matches!(too_big, Err(ApiError::TooLarge(_))));
        assert_eq!(storage.len(), 0);

        let first = change_avatar(&st, &alice, Some(image(AVATAR_MAX_BYTES)))
            .await
            .unwrap();
        let first_name = first.avatar.clone().unwrap();
        assert!(first_name.starts_with("me") && first_name.ends_with(".png"));
        assert!(storage.contains(&first_name));

        let second = change_avatar(&st, &alice, Some(image(10))).await.unwrap();
        let second_name = second.avatar.unwrap();
        assert_ne!(first_name, second_name);
        assert!(storage.contains(&second_name));
        assert!(!storage.contains(&first_name));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn avatar_requires_an_image() {
        let (st, _) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;
        let err = change_avatar(&st, &alice, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn avatar_for_vanished_user_writes_nothing() {
        let (st, storage) = AppState::in_memory();
        let ghost = AuthUser {
            id: Uuid::new_v4(),
            name: "ghost".into(),
        };
        let err = change_avatar(&st, &ghost, Some(image(10))).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn edit_profile_updates_and_normalizes() {
        let (st, _) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;

        let user = edit_profile(
            &st,
            &alice,
            edit_req("Alice.B@X.com", "secret1", "newpass", "newpass"),
        )
        .await
        .unwrap();
        assert_eq!(user.name, "Alice B");
        assert_eq!(user.email, "alice.b@x.com");

        let res = login(
            &st,
            LoginRequest {
                email: "alice.b@x.com".into(),
                password: "newpass".into(),
            },
        )
        .await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn edit_profile_keeping_own_email_is_allowed() {
        let (st, _) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;
        let res = edit_profile(
            &st,
            &alice,
            edit_req("alice@x.com", "secret1", "newpass", "newpass"),
        )
        .await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn edit_profile_failures() {
        let (st, _) = AppState::in_memory();
        let alice = registered(&st, "Alice", "alice@x.com").await;
        registered(&st, "Bob", "bob@x.com").await;

        let taken = edit_profile(&st, &alice, edit_req("BOB@x.com", "secret1", "newpass", "newpass")).await;
        assert!(matches!(taken, Err(ApiError::Conflict(_))));

        let wrong = edit_profile(&st, &alice, edit_req("alice@x.com", "nope123", "newpass", "newpass")).await;
        assert!(matches!(wrong, Err(ApiError::InvalidCredentials(_))));

        let mismatch = edit_profile(&st, &alice, edit_req("alice@x.com", "secret1", "newpass", "other12")).await;
        assert!(matches!(mismatch, Err(ApiError::Validation(_))));

        let ghost = AuthUser {
            id: Uuid::new_v4(),
            name: "ghost".into(),
        };
        let vanished = edit_profile(&st, &ghost, edit_req("g@x.com", "secret1", "newpass", "newpass")).await;
        assert!(matches!(vanished, Err(ApiError::NotFound(_))));
    }
}
