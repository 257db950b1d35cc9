pub mod auth;
pub mod chat;
pub mod error;
pub mod media;
pub mod middleware;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

use anyhow::anyhow;
use parley_db::models::{MediaRow, UserWithAvatar};
use parley_types::api::{MediaInfo, UserProfile};

pub(crate) fn media_info(row: &MediaRow) -> Result<MediaInfo, ApiError> {
    Ok(MediaInfo {
        id: row
            .id
            .parse()
            .map_err(|_| ApiError::Internal(anyhow!("corrupt media id '{}'", row.id)))?,
        hash: row.hash.clone(),
        kind: row.kind.clone(),
        format: row.format.clone(),
    })
}

pub(crate) fn user_profile(row: &UserWithAvatar) -> Result<UserProfile, ApiError> {
    Ok(UserProfile {
        id: row
            .user
            .id
            .parse()
            .map_err(|_| ApiError::Internal(anyhow!("corrupt user id '{}'", row.user.id)))?,
        username: row.user.username.clone(),
        email: row.user.email.clone(),
        bio: row.user.bio.clone(),
        avatar: row.avatar.as_ref().map(media_info).transpose()?,
    })
}
