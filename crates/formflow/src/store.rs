//! Read model for a form's current schema.
//!
//! Nothing is cached: every call reads the latest committed schema, and the
//! form row and its fields come from one read transaction.

use crate::error::{FormflowError, Result};
use formflow_db::{Form, FormField, FormflowDb};
use formflow_ids::FormId;

/// A form and its ordered fields as of one committed schema version.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub form: Form,
    /// Ordered by `order`
    pub fields: Vec<FormField>,
}

impl SchemaSnapshot {
    pub fn schema_version(&self) -> i64 {
        self.form.schema_version
    }

    pub fn field(&self, field_key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.field_key == field_key)
    }
}

#[derive(Clone)]
pub struct SchemaStore {
    db: FormflowDb,
}

impl SchemaStore {
    pub fn new(db: FormflowDb) -> Self {
        Self { db }
    }

    /// Public path: the schema of an active form.
    pub async fn active_fields(&self, form_id: &FormId) -> Result<SchemaSnapshot> {
        let snapshot = self.fields(form_id).await?;
        if !snapshot.form.is_active {
            return Err(FormflowError::not_found(format!("Form {} is not active", form_id)));
        }
        Ok(snapshot)
    }

    /// Admin path: the schema regardless of `is_active`.
    pub async fn fields(&self, form_id: &FormId) -> Result<SchemaSnapshot> {
        let (form, fields) = self
            .db
            .get_form_with_fields(form_id)
            .await?
            .ok_or_else(|| FormflowError::not_found(format!("Form {}", form_id)))?;
        Ok(SchemaSnapshot { form, fields })
    }

    /// Resolve a slug to an active form.
    pub async fn resolve_public_form(&self, slug: &str) -> Result<Form> {
        match self.db.get_form_by_slug(slug).await? {
            Some(form) if form.is_active => Ok(form),
            Some(_) => Err(FormflowError::not_found(format!("Form '{}' is not active", slug))),
            None => Err(FormflowError::not_found(format!("Form '{}'", slug))),
        }
    }
}
