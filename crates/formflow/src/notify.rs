//! Post-commit notifications.
//!
//! [`NotificationTrigger`] turns a committed submission into a flat,
//! human-readable [`NotificationPayload`] and hands it to a
//! [`NotificationDispatcher`]. Enqueueing never blocks and never fails the
//! request: errors are logged and dropped.
//!
//! The bundled dispatcher is a bounded channel drained by a background
//! [`NotificationWorker`], which passes each payload to a [`NotificationSink`].

use crate::validator::ValidatedSubmission;
use crate::writer::CommittedSubmission;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formflow_ids::{FormId, SubmissionId};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification worker has stopped")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// One `label: value` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEntry {
    pub label: String,
    pub value: String,
}

/// One stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationFile {
    pub label: String,
    pub filename: String,
    pub reference: String,
}

/// Flat view of a committed submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub form_id: FormId,
    pub form_title: String,
    pub form_slug: String,
    pub submission_id: SubmissionId,
    pub submitted_at: DateTime<Utc>,
    pub entries: Vec<NotificationEntry>,
    pub files: Vec<NotificationFile>,
}

impl NotificationPayload {
    pub fn build(committed: &CommittedSubmission, validated: &ValidatedSubmission) -> Self {
        let entries = validated
            .values
            .iter()
            .map(|v| NotificationEntry {
                label: v.field.label.clone(),
                value: v.value.display(),
            })
            .collect();

        let files = committed
            .attachments
            .iter()
            .map(|a| NotificationFile {
                label: validated
                    .files
                    .iter()
                    .find(|f| f.field.id == a.field_id)
                    .map(|f| f.field.label.clone())
                    .unwrap_or_else(|| a.field_id.to_string()),
                filename: a.original_filename.clone(),
                reference: a.stored_reference.clone(),
            })
            .collect();

        Self {
            form_id: validated.form.id.clone(),
            form_title: validated.form.title.clone(),
            form_slug: validated.form.slug.clone(),
            submission_id: committed.submission.id.clone(),
            submitted_at: committed.submission.submitted_at,
            entries,
            files,
        }
    }

    pub fn subject(&self) -> String {
        format!("New submission: {}", self.form_title)
    }

    /// Plain-text body.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Form: {} ({})", self.form_title, self.form_slug);
        let _ = writeln!(out, "Submission: {}", self.submission_id);
        let _ = writeln!(out, "Submitted at: {}", self.submitted_at.to_rfc3339());

        if !self.entries.is_empty() {
            out.push('\n');
            for entry in &self.entries {
                let _ = writeln!(out, "{}: {}", entry.label, entry.value);
            }
        }
        if !self.files.is_empty() {
            out.push_str("\nAttachments:\n");
            for file in &self.files {
                let _ = writeln!(out, "{}: {} [{}]", file.label, file.filename, file.reference);
            }
        }
        out
    }
}

/// Hand-off point to asynchronous delivery. Must not block.
pub trait NotificationDispatcher: Send + Sync {
    fn enqueue(&self, payload: NotificationPayload) -> Result<(), DispatchError>;
}

/// Final delivery of a payload (mail, webhook, log, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), DispatchError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        info!(
            form = %payload.form_slug,
            submission_id = %payload.submission_id,
            "{}\n{}",
            payload.subject(),
            payload.render_text()
        );
        Ok(())
    }
}

/// Bounded in-process queue feeding a [`NotificationWorker`].
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<NotificationPayload>,
}

impl ChannelDispatcher {
    /// Create the dispatcher and the worker that drains it.
    pub fn new(capacity: usize, sink: Arc<dyn NotificationSink>) -> (Self, NotificationWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, NotificationWorker { rx, sink })
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn enqueue(&self, payload: NotificationPayload) -> Result<(), DispatchError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Drains a [`ChannelDispatcher`] until every sender is dropped.
pub struct NotificationWorker {
    rx: mpsc::Receiver<NotificationPayload>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationWorker {
    pub async fn run(mut self) {
        while let Some(payload) = self.rx.recv().await {
            if let Err(e) = self.sink.deliver(&payload).await {
                warn!(submission_id = %payload.submission_id, error = %e, "Notification delivery failed");
            }
        }
        debug!("Notification worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Post-commit hook. Call once per committed submission, never on rollback.
#[derive(Clone)]
pub struct NotificationTrigger {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationTrigger {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn on_submission_committed(&self, committed: &CommittedSubmission, validated: &ValidatedSubmission) {
        let payload = NotificationPayload::build(committed, validated);
        let submission_id = payload.submission_id.clone();

        match self.dispatcher.enqueue(payload) {
            Ok(()) => debug!(submission_id = %submission_id, "Notification enqueued"),
            Err(e) => warn!(submission_id = %submission_id, error = %e, "Notification not enqueued"),
        }
    }
}
