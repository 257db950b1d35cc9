use crate::models::{ConversationRow, MediaRow, MessageRow, UserRow, UserWithAvatar};
use crate::{Database, DbError};
use rusqlite::{OptionalExtension, Row};

const USER_WITH_AVATAR_SELECT: &str = "
    SELECT u.id, u.username, u.email, u.password, u.bio, u.avatar_id, u.created_at,
           a.id, a.hash, a.kind, a.format
    FROM users u
    LEFT JOIN media a ON a.id = u.avatar_id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserWithAvatar>, DbError> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE u.email = ?1", USER_WITH_AVATAR_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([email], read_user_with_avatar).optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserWithAvatar>, DbError> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE u.id = ?1", USER_WITH_AVATAR_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], read_user_with_avatar).optional()?;
            Ok(row)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserWithAvatar>, DbError> {
        self.with_conn(|conn| {
            let sql = format!("{} ORDER BY u.username ASC", USER_WITH_AVATAR_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], read_user_with_avatar)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_exists(&self, id: &str) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        username: &str,
        bio: Option<&str>,
        avatar_id: Option<&str>,
    ) -> Result<(), DbError> {
        self.with_conn(|conn| {
            match avatar_id {
                Some(avatar_id) => conn.execute(
                    "UPDATE users SET username = ?1, bio = ?2, avatar_id = ?3 WHERE id = ?4",
                    (username, bio, avatar_id, id),
                )?,
                None => conn.execute(
                    "UPDATE users SET username = ?1, bio = ?2 WHERE id = ?3",
                    (username, bio, id),
                )?,
            };
            Ok(())
        })
    }

    // -- Media --

    pub fn create_media(
        &self,
        id: &str,
        hash: &str,
        kind: &str,
        format: &str,
    ) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO media (id, hash, kind, format) VALUES (?1, ?2, ?3, ?4)",
                (id, hash, kind, format),
            )?;
            Ok(())
        })
    }

    pub fn get_media(&self, id: &str) -> Result<Option<MediaRow>, DbError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, hash, kind, format FROM media WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(MediaRow {
                            id: row.get(0)?,
                            hash: row.get(1)?,
                            kind: row.get(2)?,
                            format: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: Option<&str>,
        content: &str,
        attachment_id: Option<&str>,
        kind: &str,
        created_at: &str,
    ) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content, attachment_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (id, sender_id, recipient_id, content, attachment_id, kind, created_at),
            )?;
            Ok(())
        })
    }

    /// Direct messages between two users, both directions, oldest first.
    /// Attachment and sender profile come back in the same query (no N+1).
    pub fn list_direct_between(
        &self,
        me: &str,
        other: &str,
    ) -> Result<Vec<ConversationRow>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.recipient_id, m.content, m.attachment_id,
                        m.kind, m.created_at,
                        att.id, att.hash, att.kind, att.format,
                        u.id, u.username, u.email, u.password, u.bio, u.avatar_id, u.created_at,
                        av.id, av.hash, av.kind, av.format
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 LEFT JOIN media att ON att.id = m.attachment_id
                 LEFT JOIN media av ON av.id = u.avatar_id
                 WHERE (m.sender_id = ?1 AND m.recipient_id = ?2)
                    OR (m.sender_id = ?2 AND m.recipient_id = ?1)
                 ORDER BY m.created_at ASC, m.rowid ASC",
            )?;

            let rows = stmt
                .query_map([me, other], |row| {
                    Ok(ConversationRow {
                        message: MessageRow {
                            id: row.get(0)?,
                            sender_id: row.get(1)?,
                            recipient_id: row.get(2)?,
                            content: row.get(3)?,
                            attachment_id: row.get(4)?,
                            kind: row.get(5)?,
                            created_at: row.get(6)?,
                        },
                        attachment: read_media_at(row, 7)?,
                        sender: UserWithAvatar {
                            user: UserRow {
                                id: row.get(11)?,
                                username: row.get(12)?,
                                email: row.get(13)?,
                                password: row.get(14)?,
                                bio: row.get(15)?,
                                avatar_id: row.get(16)?,
                                created_at: row.get(17)?,
                            },
                            avatar: read_media_at(row, 18)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn message_count(&self) -> Result<i64, DbError> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count)
        })
    }
}

fn read_user_with_avatar(row: &Row<'_>) -> rusqlite::Result<UserWithAvatar> {
    Ok(UserWithAvatar {
        user: UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            bio: row.get(4)?,
            avatar_id: row.get(5)?,
            created_at: row.get(6)?,
        },
        avatar: read_media_at(row, 7)?,
    })
}

/// Reads a LEFT JOINed media row starting at `base`; NULL id means no row.
fn read_media_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Option<MediaRow>> {
    let id: Option<String> = row.get(base)?;
    Ok(id.map(|id| -> rusqlite::Result<MediaRow> {
        Ok(MediaRow {
            id,
            hash: row.get(base + 1)?,
            kind: row.get(base + 2)?,
            format: row.get(base + 3)?,
        })
    })
    .transpose()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, username: &str, email: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, email, "hash").unwrap();
        id
    }

    #[test]
    fn duplicate_username_is_a_constraint_error() {
        let db = db();
        add_user(&db, "ada", "ada@example.com");

        let err = db
            .create_user(&Uuid::new_v4().to_string(), "ada", "other@example.com", "hash")
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn duplicate_email_is_a_constraint_error() {
        let db = db();
        add_user(&db, "ada", "ada@example.com");

        let err = db
            .create_user(&Uuid::new_v4().to_string(), "grace", "ada@example.com", "hash")
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn user_lookup_materializes_avatar() {
        let db = db();
        let user_id = add_user(&db, "ada", "ada@example.com");

        let media_id = Uuid::new_v4().to_string();
        db.create_media(&media_id, "abc123", "avatar", "image/png").unwrap();
        db.update_profile(&user_id, "ada", Some("hello"), Some(media_id.as_str())).unwrap();

        let found = db.get_user_by_id(&user_id).unwrap().unwrap();
        assert_eq!(found.user.bio.as_deref(), Some("hello"));
        let avatar = found.avatar.unwrap();
        assert_eq!(avatar.hash, "abc123");
        assert_eq!(avatar.format, "image/png");
    }

    #[test]
    fn conversation_covers_both_directions_oldest_first() {
        let db = db();
        let a = add_user(&db, "ada", "ada@example.com");
        let b = add_user(&db, "grace", "grace@example.com");

        let pairs = [(a.as_str(), b.as_str()), (b.as_str(), a.as_str()), (a.as_str(), b.as_str())];
        for (i, (from, to)) in pairs.into_iter().enumerate() {
            db.insert_message(
                &Uuid::new_v4().to_string(),
                from,
                Some(to),
                &format!("msg {}", i),
                None,
                "direct",
                &format!("2026-01-01T00:00:0{}.000Z", i),
            )
            .unwrap();
        }

        // A message to a third party must not show up in the A<->B pair.
        let c = add_user(&db, "joan", "joan@example.com");
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &a,
            Some(c.as_str()),
            "other pair",
            None,
            "direct",
            "2026-01-01T00:00:09.000Z",
        )
        .unwrap();

        let rows = db.list_direct_between(&a, &b).unwrap();
        let contents: Vec<_> = rows.iter().map(|r| r.message.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2"]);
        assert_eq!(rows[1].sender.user.username, "grace");

        // Same result from the counterpart's side.
        let mirrored = db.list_direct_between(&b, &a).unwrap();
        assert_eq!(mirrored.len(), 3);
    }

    #[test]
    fn dangling_recipient_is_accepted() {
        let db = db();
        let a = add_user(&db, "ada", "ada@example.com");
        let ghost = Uuid::new_v4().to_string();

        db.insert_message(
            &Uuid::new_v4().to_string(),
            &a,
            Some(ghost.as_str()),
            "hello?",
            None,
            "direct",
            "2026-01-01T00:00:00.000Z",
        )
        .unwrap();

        let rows = db.list_direct_between(&a, &ghost).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].message.attachment_id.is_none());
    }

    #[test]
    fn message_attachment_comes_back_joined() {
        let db = db();
        let a = add_user(&db, "ada", "ada@example.com");
        let b = add_user(&db, "grace", "grace@example.com");

        let media_id = Uuid::new_v4().to_string();
        db.create_media(&media_id, "deadbeef", "attachment", "image/jpeg").unwrap();
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &a,
            Some(b.as_str()),
            "look",
            Some(media_id.as_str()),
            "direct",
            "2026-01-01T00:00:00.000Z",
        )
        .unwrap();

        let rows = db.list_direct_between(&a, &b).unwrap();
        let attachment = rows[0].attachment.as_ref().unwrap();
        assert_eq!(attachment.hash, "deadbeef");
        assert_eq!(attachment.kind, "attachment");
    }
}
