use thiserror::Error;

/// Failures of the credential store.
///
/// Absence of a row and failed authentication are not errors: they come back
/// as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller input rejected before touching the database.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The unique index on the email column refused the write.
    #[error("{context}: email already registered")]
    Duplicate { context: &'static str },

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl StoreError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| {
            if let sqlx::Error::Database(db) = &source {
                if db.is_unique_violation() {
                    return Self::Duplicate { context };
                }
            }
            Self::Storage { context, source }
        }
    }

    /// True when the database refused a duplicate email.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}
