use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use parley_db::models::ConversationRow;
use parley_types::api::{
    ConversationMessage, MessageKind, MessagePayload, SendMessageRequest,
};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::media;
use crate::middleware::CurrentUser;

/// POST /chat/global — persist a broadcast message and fan it out to every
/// connected session.
pub async fn send_global(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = submit_message(state, &user, None, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /chat/{recipient_id} — persist a direct message and push it to the
/// recipient's live session, if any.
pub async fn send_direct(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = parse_recipient(&recipient_id)?;
    let message = submit_message(state, &user, Some(recipient), req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /chat/{counterpart_id} — the direct-message history with one user,
/// oldest first. This is the durability surface: anything a client missed
/// live is recoverable here.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(counterpart_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let counterpart = parse_recipient(&counterpart_id)?;
    let messages = conversation(state, &user, counterpart).await?;
    Ok(Json(messages))
}

pub fn parse_recipient(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid user".into()))
}

/// The message pipeline: validate, register the attachment, persist, then
/// dispatch. The session context was already enforced upstream.
///
/// Persistence happens-before dispatch, and dispatch never rolls it back:
/// once the insert commits, the call succeeds no matter what the live push
/// does. Undelivered pushes are logged only — persisted history, not live
/// delivery, is the durability contract.
pub async fn submit_message(
    state: AppState,
    sender: &CurrentUser,
    recipient: Option<Uuid>,
    req: SendMessageRequest,
) -> Result<MessagePayload, ApiError> {
    if let Some(recipient_id) = recipient {
        if state.enforce_recipient {
            let db = state.clone();
            let id = recipient_id.to_string();
            let exists = tokio::task::spawn_blocking(move || db.db.user_exists(&id))
                .await
                .map_err(|e| ApiError::Internal(e.into()))??;
            if !exists {
                return Err(ApiError::Validation("Invalid user".into()));
            }
        }
    }

    let message_id = Uuid::new_v4();
    let sender_id = sender.profile.id;
    let created_at = Utc::now();
    let kind = match recipient {
        Some(_) => MessageKind::Direct,
        None => MessageKind::Global,
    };

    // Registrar first, then the message insert, both off the async runtime.
    // A failed registration aborts before any message row is written.
    let db = state.clone();
    let content = req.content.clone();
    let attachment_upload = req.attachment;
    let stored_at = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let attachment = tokio::task::spawn_blocking(move || {
        let attachment = match &attachment_upload {
            Some(upload) => Some(media::register_media(&db.db, upload)?),
            None => None,
        };

        db.db.insert_message(
            &message_id.to_string(),
            &sender_id.to_string(),
            recipient.map(|r| r.to_string()).as_deref(),
            &content,
            attachment.as_ref().map(|a| a.id.to_string()).as_deref(),
            kind.as_str(),
            &stored_at,
        )?;

        Ok::<_, ApiError>(attachment)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    let message = MessagePayload {
        id: message_id,
        sender_id,
        recipient_id: recipient,
        content: req.content,
        kind,
        attachment,
        created_at,
    };

    // Committed. Everything below is best-effort notification.
    let event = GatewayEvent::MessageCreate {
        message: message.clone(),
    };
    match recipient {
        Some(recipient_id) => {
            if !state.registry.send_to(recipient_id, event) {
                debug!(
                    "message {} stored; recipient {} has no live session",
                    message_id, recipient_id
                );
            }
        }
        None => {
            let reached = state.registry.broadcast(event);
            debug!("message {} broadcast to {} live sessions", message_id, reached);
        }
    }

    Ok(message)
}

pub async fn conversation(
    state: AppState,
    user: &CurrentUser,
    counterpart: Uuid,
) -> Result<Vec<ConversationMessage>, ApiError> {
    let db = state.clone();
    let me = user.profile.id.to_string();
    let other = counterpart.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_direct_between(&me, &other))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    rows.iter().map(row_to_entry).collect()
}

fn row_to_entry(row: &ConversationRow) -> Result<ConversationMessage, ApiError> {
    let message = MessagePayload {
        id: row.message.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.message.id, e);
            Uuid::default()
        }),
        sender_id: row.message.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id on message '{}': {}", row.message.id, e);
            Uuid::default()
        }),
        recipient_id: row.message.recipient_id.as_deref().map(|r| {
            r.parse().unwrap_or_else(|e| {
                warn!("Corrupt recipient_id on message '{}': {}", row.message.id, e);
                Uuid::default()
            })
        }),
        content: row.message.content.clone(),
        kind: match row.message.kind.as_str() {
            "global" => MessageKind::Global,
            _ => MessageKind::Direct,
        },
        attachment: row.attachment.as_ref().map(crate::media_info).transpose()?,
        created_at: row
            .message
            .created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|e| {
                warn!("Corrupt created_at on message '{}': {}", row.message.id, e);
                DateTime::default()
            }),
    };

    Ok(ConversationMessage {
        message,
        sender: crate::user_profile(&row.sender)?,
    })
}
