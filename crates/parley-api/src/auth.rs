use std::path::PathBuf;
use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::DeliveryRegistry;
use parley_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest, UserProfile};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub registry: Arc<dyn DeliveryRegistry>,
    pub upload_dir: PathBuf,
    /// When set, direct messages to an id that names no user are rejected
    /// instead of stored with a dangling recipient.
    pub enforce_recipient: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if req.email.is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }

    // Hash password with Argon2id
    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();

    // Uniqueness of username and email is enforced by the store; a violation
    // rejects the whole write and surfaces as 400.
    let db = state.clone();
    let username = req.username.clone();
    let email = req.email.clone();
    tokio::task::spawn_blocking(move || {
        db.db.create_user(&user_id.to_string(), &username, &email, &password_hash)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    let access_token = create_token(&state.jwt_secret, user_id, &req.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            user: UserProfile {
                id: user_id,
                username: req.username,
                email: req.email,
                bio: None,
                avatar: None,
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let email = req.email.clone();
    let user = tokio::task::spawn_blocking(move || db.db.get_user_by_email(&email))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??
        .ok_or(ApiError::Unauthenticated("Invalid email/password"))?;

    let parsed_hash = PasswordHash::new(&user.user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated("Invalid email/password"))?;

    let profile = crate::user_profile(&user)?;
    let access_token = create_token(&state.jwt_secret, profile.id, &profile.username)?;

    Ok(Json(AuthResponse {
        access_token,
        user: profile,
    }))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash failed: {}", e)))?
        .to_string())
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}
