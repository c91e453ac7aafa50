//! The engine facade called by transports (HTTP handlers, the CLI).

use crate::config::FormflowConfig;
use crate::error::{FormflowError, Result};
use crate::files::{FileStorage, LocalFileStorage};
use crate::notify::{ChannelDispatcher, LogSink, NotificationDispatcher, NotificationTrigger, NotificationWorker};
use crate::store::{SchemaSnapshot, SchemaStore};
use crate::validator::{RawSubmission, SubmissionValidator};
use crate::writer::AtomicWriter;
use formflow_db::{FileAttachment, Form, FormSchemaEdit, FormSubmission, FormflowDb};
use formflow_ids::{FormId, SubmissionId};
use formflow_schema::TypedValue;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub storage_timeout: Duration,
    pub max_schema_retries: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(10),
            max_schema_retries: 3,
        }
    }
}

impl From<&FormflowConfig> for EngineOptions {
    fn from(config: &FormflowConfig) -> Self {
        Self {
            storage_timeout: config.storage_timeout(),
            max_schema_retries: config.max_schema_retries,
        }
    }
}

/// One line of the admin detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailEntry {
    pub field_key: String,
    pub label: String,
    pub display: String,
    /// Present for file-typed fields
    pub attachment: Option<FileAttachment>,
}

/// A submission flattened to `label -> display value`, in field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionDetailView {
    pub form: Form,
    pub submission: FormSubmission,
    pub entries: Vec<DetailEntry>,
}

impl SubmissionDetailView {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.display.as_str())
    }

    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.label.clone(), e.display.clone()))
            .collect()
    }
}

#[derive(Clone)]
pub struct FormEngine {
    db: FormflowDb,
    store: SchemaStore,
    validator: SubmissionValidator,
    writer: AtomicWriter,
    trigger: NotificationTrigger,
    max_schema_retries: u32,
}

impl FormEngine {
    pub fn new(
        db: FormflowDb,
        storage: Arc<dyn FileStorage>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        options: EngineOptions,
    ) -> Self {
        let store = SchemaStore::new(db.clone());
        Self {
            validator: SubmissionValidator::new(store.clone()),
            writer: AtomicWriter::new(db.clone(), storage, options.storage_timeout),
            trigger: NotificationTrigger::new(dispatcher),
            max_schema_retries: options.max_schema_retries,
            store,
            db,
        }
    }

    /// Open the configured database and upload directory with the channel
    /// dispatcher and log sink. The returned worker must be spawned.
    pub async fn from_config(config: &FormflowConfig) -> Result<(Self, NotificationWorker)> {
        let db = FormflowDb::open(&config.database_path, config.db_options()).await?;
        let storage = Arc::new(LocalFileStorage::new(&config.upload_dir));
        let (dispatcher, worker) = ChannelDispatcher::new(config.dispatch_queue_capacity, Arc::new(LogSink));

        let engine = Self::new(db, storage, Arc::new(dispatcher), EngineOptions::from(config));
        Ok((engine, worker))
    }

    pub fn db(&self) -> &FormflowDb {
        &self.db
    }

    // ========================================================================
    // Public submit path
    // ========================================================================

    /// Validate and persist a submission for an active form.
    ///
    /// Validation and the write are tied to one schema version. If an admin
    /// edit lands in between, the schema is re-read and the submission
    /// re-validated, up to `max_schema_retries` times.
    pub async fn validate_and_save_submission(
        &self,
        form_id: &FormId,
        raw: &RawSubmission,
    ) -> Result<FormSubmission> {
        let mut retries = 0;
        loop {
            let validated = self.validator.validate(form_id, raw).await?;

            match self.writer.save_submission(&validated).await {
                Ok(committed) => {
                    self.trigger.on_submission_committed(&committed, &validated);
                    return Ok(committed.submission);
                }
                Err(FormflowError::SchemaChanged { expected, actual, .. }) if retries < self.max_schema_retries => {
                    retries += 1;
                    debug!(
                        form_id = %form_id,
                        expected,
                        actual,
                        attempt = retries,
                        "Schema changed during submission, re-validating"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Same as [`validate_and_save_submission`](Self::validate_and_save_submission),
    /// addressed by slug.
    pub async fn validate_and_save_submission_by_slug(
        &self,
        slug: &str,
        raw: &RawSubmission,
    ) -> Result<FormSubmission> {
        let form = self.store.resolve_public_form(slug).await?;
        self.validate_and_save_submission(&form.id, raw).await
    }

    /// The schema a public client should render.
    pub async fn public_schema(&self, slug: &str) -> Result<SchemaSnapshot> {
        let form = self.store.resolve_public_form(slug).await?;
        self.store.active_fields(&form.id).await
    }

    // ========================================================================
    // Admin path
    // ========================================================================

    pub async fn save_form_schema(&self, edit: FormSchemaEdit) -> Result<Form> {
        self.writer.save_form_schema(edit).await
    }

    pub async fn get_form(&self, form_id: &FormId) -> Result<Form> {
        self.db
            .get_form(form_id)
            .await?
            .ok_or_else(|| FormflowError::not_found(format!("Form {}", form_id)))
    }

    pub async fn get_form_by_slug(&self, slug: &str) -> Result<Form> {
        self.db
            .get_form_by_slug(slug)
            .await?
            .ok_or_else(|| FormflowError::not_found(format!("Form '{}'", slug)))
    }

    /// Form and fields regardless of `is_active`.
    pub async fn form_schema(&self, form_id: &FormId) -> Result<SchemaSnapshot> {
        self.store.fields(form_id).await
    }

    pub async fn list_forms(&self) -> Result<Vec<Form>> {
        Ok(self.db.list_forms().await?)
    }

    /// All submissions of a form, newest first.
    pub async fn list_submissions(&self, form_id: &FormId) -> Result<Vec<FormSubmission>> {
        self.get_form(form_id).await?;
        Ok(self.db.list_submissions(form_id).await?)
    }

    pub async fn count_submissions(&self, form_id: &FormId) -> Result<i64> {
        Ok(self.db.count_submissions(form_id).await?)
    }

    /// Flatten a submission's EAV rows into display values, in field order.
    ///
    /// Values are re-typed with the field's current type; a stored value that
    /// no longer parses is shown as stored.
    pub async fn get_submission_detail_view(&self, submission_id: &SubmissionId) -> Result<SubmissionDetailView> {
        let submission = self
            .db
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| FormflowError::not_found(format!("Submission {}", submission_id)))?;
        let SchemaSnapshot { form, fields } = self.store.fields(&submission.form_id).await?;

        let mut values: HashMap<_, _> = self
            .db
            .get_submission_values(submission_id)
            .await?
            .into_iter()
            .map(|v| (v.field_id, v.value))
            .collect();
        let mut attachments: HashMap<_, _> = self
            .db
            .get_attachments(submission_id)
            .await?
            .into_iter()
            .map(|a| (a.field_id.clone(), a))
            .collect();

        let mut entries = Vec::new();
        for field in &fields {
            let entry = if let Some(attachment) = attachments.remove(&field.id) {
                DetailEntry {
                    field_key: field.field_key.clone(),
                    label: field.label.clone(),
                    display: attachment.original_filename.clone(),
                    attachment: Some(attachment),
                }
            } else if let Some(stored) = values.remove(&field.id) {
                let display = TypedValue::parse(field.field_type, &stored)
                    .map(|v| v.display())
                    .unwrap_or(stored);
                DetailEntry {
                    field_key: field.field_key.clone(),
                    label: field.label.clone(),
                    display,
                    attachment: None,
                }
            } else {
                continue;
            };
            entries.push(entry);
        }

        debug!(submission_id = %submission_id, entries = entries.len(), "Submission detail view built");
        Ok(SubmissionDetailView {
            form,
            submission,
            entries,
        })
    }
}
