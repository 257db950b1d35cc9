use thiserror::Error;

/// Storage-layer errors. Constraint violations (unique username/email,
/// foreign keys) are split out so the API boundary can map them to a client
/// error instead of a generic server fault.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => DbError::Sqlite(err),
        }
    }
}
