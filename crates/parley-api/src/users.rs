use axum::{Extension, Json, extract::State, response::IntoResponse};
use argon2::{Argon2, PasswordHash, PasswordVerifier};

use parley_types::api::{UpdateProfileRequest, UserProfile};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::media;
use crate::middleware::CurrentUser;

/// GET /users — every registered user, avatar materialized, no password
/// fields anywhere near the wire.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_users())
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    let users: Vec<UserProfile> = rows
        .iter()
        .map(crate::user_profile)
        .collect::<Result<_, _>>()?;

    Ok(Json(users))
}

/// PUT /profile — username/bio update with optional new avatar. The account
/// password is re-checked first; a profile mutation never rides on the token
/// alone.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated("Invalid password"))?;

    if req.username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }

    let db = state.clone();
    let user_id = user.profile.id.to_string();
    let updated = tokio::task::spawn_blocking(move || {
        let avatar = match &req.avatar {
            Some(upload) => Some(media::register_media(&db.db, upload)?),
            None => None,
        };

        db.db.update_profile(
            &user_id,
            &req.username,
            req.bio.as_deref(),
            avatar.as_ref().map(|a| a.id.to_string()).as_deref(),
        )?;

        let row = db
            .db
            .get_user_by_id(&user_id)?
            .ok_or(ApiError::Unauthenticated("Invalid token"))?;
        crate::user_profile(&row)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use argon2::{
        PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };
    use parley_gateway::Dispatcher;
    use parley_types::api::MediaUpload;
    use uuid::Uuid;

    use crate::auth::AppStateInner;

    fn state() -> AppState {
        Arc::new(AppStateInner {
            db: parley_db::Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            registry: Arc::new(Dispatcher::new()),
            upload_dir: std::env::temp_dir(),
            enforce_recipient: false,
        })
    }

    fn seed_user(state: &AppState, name: &str, password: &str) -> CurrentUser {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string();

        let id = Uuid::new_v4();
        let email = format!("{}@example.com", name);
        state
            .db
            .create_user(&id.to_string(), name, &email, &hash)
            .unwrap();
        CurrentUser {
            profile: UserProfile {
                id,
                username: name.into(),
                email,
                bio: None,
                avatar: None,
            },
            password_hash: hash,
        }
    }

    #[tokio::test]
    async fn profile_update_requires_the_account_password() {
        let state = state();
        let user = seed_user(&state, "ada", "correct horse");

        let req = UpdateProfileRequest {
            username: "ada2".into(),
            bio: Some("bio".into()),
            password: "wrong".into(),
            avatar: None,
        };
        let err = update_profile(
            State(state.clone()),
            Extension(user.clone()),
            Json(req),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Unauthenticated(_)));

        // Nothing changed.
        let row = state.db.get_user_by_id(&user.profile.id.to_string()).unwrap().unwrap();
        assert_eq!(row.user.username, "ada");
    }

    #[tokio::test]
    async fn profile_update_sets_bio_and_avatar() {
        let state = state();
        let user = seed_user(&state, "ada", "correct horse");

        let req = UpdateProfileRequest {
            username: "ada".into(),
            bio: Some("engineer".into()),
            password: "correct horse".into(),
            avatar: Some(MediaUpload {
                hash: "abc123".into(),
                kind: "avatar".into(),
                format: "image/png".into(),
            }),
        };
        update_profile(State(state.clone()), Extension(user.clone()), Json(req))
            .await
            .map_err(|e| panic!("update failed: {}", e))
            .ok();

        let row = state.db.get_user_by_id(&user.profile.id.to_string()).unwrap().unwrap();
        assert_eq!(row.user.bio.as_deref(), Some("engineer"));
        assert_eq!(row.avatar.unwrap().hash, "abc123");
    }

    #[tokio::test]
    async fn taking_an_existing_username_is_rejected_whole() {
        let state = state();
        seed_user(&state, "grace", "pw1");
        let user = seed_user(&state, "ada", "correct horse");

        let req = UpdateProfileRequest {
            username: "grace".into(),
            bio: None,
            password: "correct horse".into(),
            avatar: None,
        };
        let err = update_profile(State(state.clone()), Extension(user.clone()), Json(req))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Constraint(_)));

        let row = state.db.get_user_by_id(&user.profile.id.to_string()).unwrap().unwrap();
        assert_eq!(row.user.username, "ada");
    }
}
