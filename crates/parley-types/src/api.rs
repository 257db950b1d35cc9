use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared by parley-api (REST middleware) and parley-gateway
/// (WebSocket Identify handshake). Canonical definition lives here so the
/// two crates cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Media --

/// A registered media descriptor. `hash` is the opaque storage key; `kind`
/// serializes as `"type"` on the wire ("avatar", "attachment", ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaInfo {
    pub id: Uuid,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

/// Raw upload metadata handed to the attachment registrar: storage key,
/// category tag, content format. Produced by the upload endpoint (or by any
/// client that already holds a storage key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUpload {
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<MediaInfo>,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}

// -- Profile --

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub bio: Option<String>,
    /// Current account password, re-checked before any profile mutation.
    pub password: String,
    pub avatar: Option<MediaUpload>,
}

// -- Messages --

/// Discriminator tag stored on every message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Global,
    Direct,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Direct => "direct",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    pub attachment: Option<MediaUpload>,
}

/// The persisted message, exactly as returned to the sender and pushed over
/// the gateway. `recipient_id` absent means global broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub attachment: Option<MediaInfo>,
    pub created_at: DateTime<Utc>,
}

/// One entry of a conversation listing: the message plus a minimal
/// projection of its sender.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    #[serde(flatten)]
    pub message: MessagePayload,
    pub sender: UserProfile,
}
