//! Submission operations (EAV value rows, file attachments, read side)

use crate::error::{DbError, Result};
use crate::forms::{fetch_form, parse_id};
use crate::types::*;
use crate::FormflowDb;
use formflow_ids::{AttachmentId, FieldId, FormId, SubmissionId, SubmissionValueId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

/// An open submission write.
///
/// Created by [`FormflowDb::begin_submission`], which has already inserted the
/// header row under the form's version guard. Value and attachment rows are
/// staged on the same transaction; nothing is visible until [`commit`].
/// Dropping the handle without committing rolls everything back.
///
/// [`commit`]: SubmissionTx::commit
pub struct SubmissionTx {
    tx: Transaction<'static, Sqlite>,
    submission: FormSubmission,
}

impl FormflowDb {
    /// Start a submission write for `form_id`, validated against `schema_version`.
    ///
    /// The header insert is guarded: it only succeeds if the form is still
    /// active and still at `schema_version`. That insert is also the
    /// transaction's first write, so the schema cannot change underneath the
    /// rows staged afterwards.
    pub async fn begin_submission(&self, form_id: &FormId, schema_version: i64) -> Result<SubmissionTx> {
        let mut tx = self.pool.begin().await?;
        let id = SubmissionId::new();
        let now = Self::now_millis();

        let inserted = sqlx::query(
            r#"
            INSERT INTO form_submissions (id, form_id, schema_version, submitted_at)
            SELECT ?, id, schema_version, ?
            FROM forms
            WHERE id = ? AND schema_version = ? AND is_active = 1
            "#,
        )
        .bind(id.as_str())
        .bind(now)
        .bind(form_id.as_str())
        .bind(schema_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let current = fetch_form(&mut *tx, form_id).await?;
            tx.rollback().await?;
            return Err(match current {
                Some(form) if form.is_active => DbError::SchemaChanged {
                    form_id: form_id.clone(),
                    expected: schema_version,
                    actual: form.schema_version,
                },
                Some(_) => DbError::not_found(format!("Form {} is not active", form_id)),
                None => DbError::not_found(format!("Form {}", form_id)),
            });
        }

        Ok(SubmissionTx {
            tx,
            submission: FormSubmission {
                id,
                form_id: form_id.clone(),
                schema_version,
                submitted_at: Self::millis_to_datetime(now)?,
            },
        })
    }

    /// Get a submission header by ID
    pub async fn get_submission(&self, id: &SubmissionId) -> Result<Option<FormSubmission>> {
        let row = sqlx::query(
            "SELECT id, form_id, schema_version, submitted_at FROM form_submissions WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_submission).transpose()
    }

    /// All submissions of a form, newest first
    pub async fn list_submissions(&self, form_id: &FormId) -> Result<Vec<FormSubmission>> {
        let rows = sqlx::query(
            r#"
            SELECT id, form_id, schema_version, submitted_at
            FROM form_submissions
            WHERE form_id = ?
            ORDER BY submitted_at DESC, id
            "#,
        )
        .bind(form_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_submission).collect()
    }

    /// Number of submissions stored for a form
    pub async fn count_submissions(&self, form_id: &FormId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM form_submissions WHERE form_id = ?")
            .bind(form_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// EAV value rows of a submission
    pub async fn get_submission_values(&self, submission_id: &SubmissionId) -> Result<Vec<SubmissionValue>> {
        let rows = sqlx::query(
            "SELECT id, submission_id, field_id, value FROM submission_values WHERE submission_id = ?",
        )
        .bind(submission_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_value).collect()
    }

    /// File attachments of a submission
    pub async fn get_attachments(&self, submission_id: &SubmissionId) -> Result<Vec<FileAttachment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, submission_id, field_id, stored_reference, original_filename, content_type, size_bytes
            FROM file_attachments
            WHERE submission_id = ?
            "#,
        )
        .bind(submission_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_attachment).collect()
    }
}

impl SubmissionTx {
    /// The header row staged by this transaction.
    pub fn submission(&self) -> &FormSubmission {
        &self.submission
    }

    /// Stage one EAV value row.
    ///
    /// The insert only matches if `field_id` belongs to the submission's form.
    pub async fn insert_value(&mut self, field_id: &FieldId, value: &str) -> Result<SubmissionValue> {
        let id = SubmissionValueId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO submission_values (id, submission_id, field_id, value)
            SELECT ?, ?, f.id, ?
            FROM form_fields f
            WHERE f.id = ? AND f.form_id = ?
            "#,
        )
        .bind(id.as_str())
        .bind(self.submission.id.as_str())
        .bind(value)
        .bind(field_id.as_str())
        .bind(self.submission.form_id.as_str())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(self.foreign_field(field_id));
        }

        Ok(SubmissionValue {
            id,
            submission_id: self.submission.id.clone(),
            field_id: field_id.clone(),
            value: value.to_string(),
        })
    }

    /// Stage one file attachment row for an already-stored file.
    pub async fn insert_attachment(
        &mut self,
        field_id: &FieldId,
        stored_reference: &str,
        original_filename: &str,
        content_type: Option<&str>,
        size_bytes: i64,
    ) -> Result<FileAttachment> {
        let id = AttachmentId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO file_attachments (
                id, submission_id, field_id, stored_reference, original_filename, content_type, size_bytes
            )
            SELECT ?, ?, f.id, ?, ?, ?, ?
            FROM form_fields f
            WHERE f.id = ? AND f.form_id = ?
            "#,
        )
        .bind(id.as_str())
        .bind(self.submission.id.as_str())
        .bind(stored_reference)
        .bind(original_filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(field_id.as_str())
        .bind(self.submission.form_id.as_str())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(self.foreign_field(field_id));
        }

        Ok(FileAttachment {
            id,
            submission_id: self.submission.id.clone(),
            field_id: field_id.clone(),
            stored_reference: stored_reference.to_string(),
            original_filename: original_filename.to_string(),
            content_type: content_type.map(str::to_string),
            size_bytes,
        })
    }

    /// Commit every staged row at once.
    pub async fn commit(self) -> Result<FormSubmission> {
        self.tx.commit().await?;
        debug!(submission_id = %self.submission.id, "Submission committed");
        Ok(self.submission)
    }

    /// Discard every staged row, including the header.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!(submission_id = %self.submission.id, "Submission rolled back");
        Ok(())
    }

    fn foreign_field(&self, field_id: &FieldId) -> DbError {
        DbError::constraint(format!(
            "Field {} does not belong to form {}",
            field_id, self.submission.form_id
        ))
    }
}

fn row_to_submission(row: &SqliteRow) -> Result<FormSubmission> {
    let id: String = row.try_get("id")?;
    let form_id: String = row.try_get("form_id")?;
    Ok(FormSubmission {
        id: parse_id(&id)?,
        form_id: parse_id(&form_id)?,
        schema_version: row.try_get("schema_version")?,
        submitted_at: FormflowDb::millis_to_datetime(row.try_get("submitted_at")?)?,
    })
}

fn row_to_value(row: &SqliteRow) -> Result<SubmissionValue> {
    let id: String = row.try_get("id")?;
    let submission_id: String = row.try_get("submission_id")?;
    let field_id: String = row.try_get("field_id")?;
    Ok(SubmissionValue {
        id: parse_id(&id)?,
        submission_id: parse_id(&submission_id)?,
        field_id: parse_id(&field_id)?,
        value: row.try_get("value")?,
    })
}

fn row_to_attachment(row: &SqliteRow) -> Result<FileAttachment> {
    let id: String = row.try_get("id")?;
    let submission_id: String = row.try_get("submission_id")?;
    let field_id: String = row.try_get("field_id")?;
    Ok(FileAttachment {
        id: parse_id(&id)?,
        submission_id: parse_id(&submission_id)?,
        field_id: parse_id(&field_id)?,
        stored_reference: row.try_get("stored_reference")?,
        original_filename: row.try_get("original_filename")?,
        content_type: row.try_get("content_type")?,
        size_bytes: row.try_get("size_bytes")?,
    })
}
