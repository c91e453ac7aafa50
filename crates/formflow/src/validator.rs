//! Submission validation against a live schema.
//!
//! Two passes over the ordered fields. The first resolves every field's
//! required-ness against the complete raw submission, so a condition may
//! depend on a field that comes later in the order. The second coerces
//! present values and records a missing value for required fields. All field
//! errors are collected before failing.

use crate::error::{FieldErrorKind, Result, ValidationError};
use crate::store::{SchemaSnapshot, SchemaStore};
use formflow_db::{Form, FormField};
use formflow_ids::FormId;
use formflow_schema::{coerce, Coerced, ConditionEvaluator, FileHandle, RawValue, TypedValue};
use std::collections::HashMap;
use tracing::debug;

/// Raw submitted values keyed by `field_key`.
pub type RawSubmission = HashMap<String, RawValue>;

/// A coerced scalar value and the field it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedValue {
    pub field: FormField,
    pub value: TypedValue,
}

/// An accepted upload for a file-typed field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFile {
    pub field: FormField,
    pub file: FileHandle,
}

/// A submission that passed validation against one schema version.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub form: Form,
    /// The version the values were checked against; the write is guarded on it
    pub schema_version: i64,
    /// Non-file values in field order
    pub values: Vec<ValidatedValue>,
    /// File entries in field order
    pub files: Vec<ValidatedFile>,
}

impl ValidatedSubmission {
    pub fn value(&self, field_key: &str) -> Option<&TypedValue> {
        self.values
            .iter()
            .find(|v| v.field.field_key == field_key)
            .map(|v| &v.value)
    }

    /// Number of rows this submission will write (values plus attachments).
    pub fn row_count(&self) -> usize {
        self.values.len() + self.files.len()
    }
}

#[derive(Clone)]
pub struct SubmissionValidator {
    store: SchemaStore,
}

impl SubmissionValidator {
    pub fn new(store: SchemaStore) -> Self {
        Self { store }
    }

    /// Validate `raw` against the current schema of an active form.
    pub async fn validate(&self, form_id: &FormId, raw: &RawSubmission) -> Result<ValidatedSubmission> {
        let snapshot = self.store.active_fields(form_id).await?;
        Ok(Self::validate_snapshot(&snapshot, raw)?)
    }

    /// Validate `raw` against a schema snapshot.
    pub fn validate_snapshot(
        snapshot: &SchemaSnapshot,
        raw: &RawSubmission,
    ) -> std::result::Result<ValidatedSubmission, ValidationError> {
        let fields = &snapshot.fields;

        // Pass 1: known, non-empty raw values only
        let mut present: HashMap<String, RawValue> = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            if !fields.iter().any(|f| &f.field_key == key) {
                debug!(form_id = %snapshot.form.id, field_key = %key, "Ignoring unknown submission key");
                continue;
            }
            if !value.is_empty() {
                present.insert(key.clone(), value.clone());
            }
        }

        let evaluator = ConditionEvaluator::new(fields);
        let required: Vec<bool> = fields
            .iter()
            .map(|field| evaluator.is_required(field, &present))
            .collect();

        // Pass 2: requirement then coercion, per field in order
        let mut errors = ValidationError::default();
        let mut values = Vec::new();
        let mut files = Vec::new();

        for (field, required) in fields.iter().zip(required) {
            let Some(raw_value) = present.remove(&field.field_key) else {
                if required {
                    errors.push(&field.field_key, &field.label, FieldErrorKind::MissingRequiredField);
                }
                continue;
            };

            match coerce(raw_value, field) {
                Ok(Coerced::Value(value)) => values.push(ValidatedValue {
                    field: field.clone(),
                    value,
                }),
                Ok(Coerced::File(file)) => files.push(ValidatedFile {
                    field: field.clone(),
                    file,
                }),
                Err(e) => errors.push(
                    &field.field_key,
                    &field.label,
                    FieldErrorKind::InvalidType {
                        expected: e.expected,
                        reason: e.reason,
                    },
                ),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedSubmission {
            form: snapshot.form.clone(),
            schema_version: snapshot.schema_version(),
            values,
            files,
        })
    }
}
