use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use parley_types::api::{Claims, UserProfile};

use crate::auth::AppState;
use crate::error::ApiError;

/// The session context: a verified identity, resolved once per request.
/// Carries the full user record so downstream handlers never touch the
/// credential again.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: UserProfile,
    pub password_hash: String,
}

/// Resolve a bearer credential into a session context.
///
/// Fails closed: missing header, bad prefix, bad signature, expiry, and a
/// verified token whose user no longer exists all come back as
/// `Unauthenticated`. Read-only — no writes happen on this path.
pub async fn authenticate(
    state: AppState,
    auth_header: Option<String>,
) -> Result<CurrentUser, ApiError> {
    let header_value = auth_header.ok_or(ApiError::Unauthenticated("Invalid token"))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated("Invalid token"))?
        .to_owned();

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated("Invalid token"))?;

    let db = state.clone();
    let user_id = token_data.claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || db.db.get_user_by_id(&user_id))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??
        // Token verified but the account is gone (e.g. deleted).
        .ok_or(ApiError::Unauthenticated("Invalid token"))?;

    Ok(CurrentUser {
        profile: crate::user_profile(&row)?,
        password_hash: row.user.password,
    })
}

/// Extract and validate the bearer token, then stash the session context as
/// a request extension for the handlers behind this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let user = authenticate(state, auth_header).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_gateway::Dispatcher;

    use crate::auth::{AppStateInner, create_token};

    fn state() -> AppState {
        Arc::new(AppStateInner {
            db: parley_db::Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            registry: Arc::new(Dispatcher::new()),
            upload_dir: std::env::temp_dir(),
            enforce_recipient: false,
        })
    }

    #[tokio::test]
    async fn missing_and_garbled_credentials_are_rejected() {
        let state = state();

        for header in [None, Some("garbage".to_string()), Some("Bearer not-a-jwt".to_string())] {
            let err = authenticate(state.clone(), header).await.unwrap_err();
            assert!(matches!(err, ApiError::Unauthenticated(_)));
        }
    }

    #[tokio::test]
    async fn valid_token_for_deleted_account_is_rejected() {
        let state = state();
        // Token signs fine but no such user row exists.
        let token = create_token("test-secret", uuid::Uuid::new_v4(), "ghost").unwrap();

        let err = authenticate(state, Some(format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn valid_token_resolves_the_full_user_record() {
        let state = state();
        let user_id = uuid::Uuid::new_v4();
        state
            .db
            .create_user(&user_id.to_string(), "ada", "ada@example.com", "hash")
            .unwrap();

        let token = create_token("test-secret", user_id, "ada").unwrap();
        let user = authenticate(state, Some(format!("Bearer {}", token)))
            .await
            .unwrap();

        assert_eq!(user.profile.id, user_id);
        assert_eq!(user.profile.email, "ada@example.com");
        assert_eq!(user.password_hash, "hash");
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let state = state();
        let token = create_token("other-secret", uuid::Uuid::new_v4(), "eve").unwrap();

        let err = authenticate(state, Some(format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }
}
