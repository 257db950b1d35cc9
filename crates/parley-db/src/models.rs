/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub avatar_id: Option<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct MediaRow {
    pub id: String,
    pub hash: String,
    pub kind: String,
    pub format: String,
}

/// A user row with its avatar media materialized (LEFT JOIN).
pub struct UserWithAvatar {
    pub user: UserRow,
    pub avatar: Option<MediaRow>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub content: String,
    pub attachment_id: Option<String>,
    pub kind: String,
    pub created_at: String,
}

/// One row of a conversation listing: the message, its attachment (if any)
/// and the sender profile, all fetched in a single query.
pub struct ConversationRow {
    pub message: MessageRow,
    pub attachment: Option<MediaRow>,
    pub sender: UserWithAvatar,
}
