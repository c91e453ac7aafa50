//! Engine-level errors.

use crate::files::StorageError;
use formflow_db::{DbError, FieldType};
use formflow_ids::FormId;
use formflow_schema::SchemaDefinitionError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormflowError>;

/// Everything an engine operation can fail with.
#[derive(Debug, Error)]
pub enum FormflowError {
    /// Unknown form or submission, or an inactive form on the public path
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Slug '{0}' is already used by another form")]
    DuplicateSlug(String),

    #[error("File storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Condition dependency cycle: {}", path.join(" -> "))]
    ConditionCycle { path: Vec<String> },

    #[error("Invalid form schema: {0}")]
    Schema(SchemaDefinitionError),

    #[error("Schema of form {form_id} changed during the submission (v{expected} -> v{actual})")]
    SchemaChanged {
        form_id: FormId,
        expected: i64,
        actual: i64,
    },

    #[error("Field '{field_key}' cannot be deleted: {references} submitted value(s) reference it")]
    FieldInUse { field_key: String, references: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(DbError),
}

impl FormflowError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// The aggregated field errors, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<DbError> for FormflowError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => Self::NotFound(msg),
            DbError::DuplicateSlug(slug) => Self::DuplicateSlug(slug),
            DbError::SchemaChanged {
                form_id,
                expected,
                actual,
            } => Self::SchemaChanged {
                form_id,
                expected,
                actual,
            },
            DbError::FieldInUse { field_key, references } => Self::FieldInUse { field_key, references },
            other => Self::Database(other),
        }
    }
}

impl From<SchemaDefinitionError> for FormflowError {
    fn from(err: SchemaDefinitionError) -> Self {
        match err {
            SchemaDefinitionError::ConditionCycle { path } => Self::ConditionCycle { path },
            other => Self::Schema(other),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Why a single field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldErrorKind {
    MissingRequiredField,
    InvalidType { expected: FieldType, reason: String },
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredField => write!(f, "this field is required"),
            Self::InvalidType { expected, reason } => write!(f, "invalid {}: {}", expected, reason),
        }
    }
}

/// A rejected field of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field_key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.label, self.field_key, self.kind)
    }
}

/// Every problem found in one submission, in field order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn push(&mut self, field_key: &str, label: &str, kind: FieldErrorKind) {
        self.errors.push(FieldError {
            field_key: field_key.to_string(),
            label: label.to_string(),
            kind,
        });
    }

    /// The error recorded for `field_key`, if any.
    pub fn for_field(&self, field_key: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field_key == field_key)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Submission rejected: {} field error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_engine_kinds() {
        let err: FormflowError = DbError::DuplicateSlug("contact".into()).into();
        assert!(matches!(err, FormflowError::DuplicateSlug(ref s) if s == "contact"));

        let err: FormflowError = DbError::not_found("Form x").into();
        assert!(matches!(err, FormflowError::NotFound(_)));

        let err: FormflowError = DbError::constraint("boom").into();
        assert!(matches!(err, FormflowError::Database(DbError::Constraint(_))));
    }

    #[test]
    fn cycle_is_lifted_out_of_schema_errors() {
        let err: FormflowError = SchemaDefinitionError::ConditionCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert_eq!(err.to_string(), "Condition dependency cycle: a -> b -> a");

        let err: FormflowError = SchemaDefinitionError::EmptyTitle.into();
        assert!(matches!(err, FormflowError::Schema(_)));
    }

    #[test]
    fn validation_report_lists_every_field() {
        let mut errors = ValidationError::default();
        errors.push("name", "Name", FieldErrorKind::MissingRequiredField);
        errors.push(
            "age",
            "Age",
            FieldErrorKind::InvalidType {
                expected: FieldType::Number,
                reason: "'x' is not a number".into(),
            },
        );

        let report = FormflowError::from(errors).to_string();
        assert!(report.contains("2 field error(s)"));
        assert!(report.contains("Name (name): this field is required"));
        assert!(report.contains("Age (age): invalid number"));
    }
}
