//! Error types for the database layer.

use formflow_ids::FormId;
use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another form already owns this slug
    #[error("Slug '{0}' is already used by another form")]
    DuplicateSlug(String),

    /// The form's schema moved on since the submission was validated
    #[error("Schema of form {form_id} changed (validated against v{expected}, now v{actual})")]
    SchemaChanged {
        form_id: FormId,
        expected: i64,
        actual: i64,
    },

    /// A field slated for deletion still has submitted data
    #[error("Field '{field_key}' cannot be deleted: {references} submitted value(s) reference it")]
    FieldInUse { field_key: String, references: i64 },

    /// Constraint violation (unique, foreign key, etc.)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Row content that cannot be mapped back to a domain type
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Returns the message of a UNIQUE constraint failure, if `err` is one.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.message().to_string())
        }
        _ => None,
    }
}
