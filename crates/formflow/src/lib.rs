//! Formflow: runtime-defined forms with validated, atomic submissions.
//!
//! Admins define a form's field schema at runtime; clients submit values
//! against it. Values are stored as EAV rows, so schema edits never change
//! the table layout.
//!
//! # Components
//!
//! - [`SchemaStore`]: current schema of a form, read fresh on every call
//! - [`SubmissionValidator`]: coercion plus conditional requirements, all
//!   field errors reported together
//! - [`AtomicWriter`]: schema edits and submissions, each one transaction
//! - [`NotificationTrigger`]: post-commit hand-off to an async dispatcher
//! - [`FormEngine`]: the facade tying them together
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = FormflowConfig::load(&home)?;
//! let (engine, worker) = FormEngine::from_config(&config).await?;
//! worker.spawn();
//!
//! let mut raw = RawSubmission::new();
//! raw.insert("loan_amount".into(), RawValue::from("150000"));
//! let submission = engine.validate_and_save_submission_by_slug("loan", &raw).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod notify;
pub mod store;
pub mod validator;
pub mod writer;

pub use config::FormflowConfig;
pub use engine::{DetailEntry, EngineOptions, FormEngine, SubmissionDetailView};
pub use error::{FieldError, FieldErrorKind, FormflowError, Result, ValidationError};
pub use files::{FileStorage, LocalFileStorage, StorageError, StoredFile};
pub use notify::{
    ChannelDispatcher, DispatchError, LogSink, NotificationDispatcher, NotificationPayload, NotificationSink,
    NotificationTrigger, NotificationWorker,
};
pub use store::{SchemaSnapshot, SchemaStore};
pub use validator::{RawSubmission, SubmissionValidator, ValidatedFile, ValidatedSubmission, ValidatedValue};
pub use writer::{AtomicWriter, CommittedSubmission};

pub use formflow_db::{
    ConditionOperator, FieldCondition, FieldInput, FieldType, FileAttachment, Form, FormField, FormSchemaEdit,
    FormSubmission, FormflowDb,
};
pub use formflow_ids::{FieldId, FormId, SubmissionId};
pub use formflow_schema::{FileHandle, RawValue, TypedValue};
