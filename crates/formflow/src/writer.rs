//! Transactional writes: schema edits and submissions.

use crate::error::{FormflowError, Result};
use crate::files::{FileStorage, StorageError, StoredFile};
use crate::validator::ValidatedSubmission;
use formflow_db::{FileAttachment, Form, FormSchemaEdit, FormSubmission, FormflowDb, SubmissionTx};
use formflow_schema::{check_schema_edit, slugify, SchemaDefinitionError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A committed submission and the attachment rows written with it.
#[derive(Debug, Clone)]
pub struct CommittedSubmission {
    pub submission: FormSubmission,
    pub attachments: Vec<FileAttachment>,
}

#[derive(Clone)]
pub struct AtomicWriter {
    db: FormflowDb,
    storage: Arc<dyn FileStorage>,
    storage_timeout: Duration,
}

impl AtomicWriter {
    pub fn new(db: FormflowDb, storage: Arc<dyn FileStorage>, storage_timeout: Duration) -> Self {
        Self {
            db,
            storage,
            storage_timeout,
        }
    }

    /// Check and persist a complete schema edit.
    ///
    /// A new form without a slug gets one derived from its title. The checks
    /// (keys, options, conditions, cycles) run before anything is written.
    pub async fn save_form_schema(&self, mut edit: FormSchemaEdit) -> Result<Form> {
        if edit.form_id.is_none() && edit.slug.is_none() {
            let slug = slugify(&edit.title)
                .ok_or_else(|| SchemaDefinitionError::InvalidSlug(edit.title.clone()))?;
            edit.slug = Some(slug);
        }
        check_schema_edit(&edit)?;

        Ok(self.db.save_form_schema(&edit).await?)
    }

    /// Persist a validated submission.
    ///
    /// Files go to storage first, each bounded by the storage timeout, so no
    /// database lock is held while an upload is in flight. The header, value
    /// and attachment rows are then written in one short transaction whose
    /// header insert is guarded on `validated.schema_version`. On any failure
    /// nothing is committed and files already handed to storage are removed.
    pub async fn save_submission(&self, validated: &ValidatedSubmission) -> Result<CommittedSubmission> {
        let mut stored: Vec<StoredFile> = Vec::with_capacity(validated.files.len());

        let result = match self.store_files(validated, &mut stored).await {
            Ok(()) => self.write_rows(validated, &stored).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(committed) => {
                info!(
                    form_id = %validated.form.id,
                    submission_id = %committed.submission.id,
                    values = validated.values.len(),
                    files = committed.attachments.len(),
                    "Submission saved"
                );
                Ok(committed)
            }
            Err(e) => {
                self.discard(&stored).await;
                Err(e)
            }
        }
    }

    async fn store_files(&self, validated: &ValidatedSubmission, stored: &mut Vec<StoredFile>) -> Result<()> {
        for entry in &validated.files {
            let file = tokio::time::timeout(self.storage_timeout, self.storage.store(&entry.file))
                .await
                .map_err(|_| StorageError::Timeout(self.storage_timeout))??;
            stored.push(file);
        }
        Ok(())
    }

    async fn write_rows(&self, validated: &ValidatedSubmission, stored: &[StoredFile]) -> Result<CommittedSubmission> {
        let mut tx = self
            .db
            .begin_submission(&validated.form.id, validated.schema_version)
            .await?;

        match stage(&mut tx, validated, stored).await {
            Ok(attachments) => {
                let submission = tx.commit().await?;
                Ok(CommittedSubmission {
                    submission,
                    attachments,
                })
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Submission rollback failed; dropping transaction");
                }
                Err(e)
            }
        }
    }

    /// Best-effort removal of files whose submission did not commit.
    async fn discard(&self, stored: &[StoredFile]) {
        for reference in stored.iter().map(|f| &f.reference) {
            let removal = tokio::time::timeout(self.storage_timeout, self.storage.remove(reference)).await;
            match removal {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(reference = %reference, error = %e, "Failed to remove orphaned upload"),
                Err(_) => warn!(reference = %reference, "Timed out removing orphaned upload"),
            }
        }
    }
}

async fn stage(
    tx: &mut SubmissionTx,
    validated: &ValidatedSubmission,
    stored: &[StoredFile],
) -> Result<Vec<FileAttachment>> {
    for entry in &validated.values {
        tx.insert_value(&entry.field.id, &entry.value.to_storage()).await?;
    }

    let mut attachments = Vec::with_capacity(stored.len());
    for (entry, file) in validated.files.iter().zip(stored) {
        let attachment = tx
            .insert_attachment(
                &entry.field.id,
                &file.reference,
                &entry.file.filename,
                entry.file.content_type.as_deref(),
                i64::try_from(file.size_bytes).unwrap_or(i64::MAX),
            )
            .await?;
        attachments.push(attachment);
    }

    Ok(attachments)
}
