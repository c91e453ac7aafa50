//! Field semantics for Formflow.
//!
//! Pure logic with no I/O:
//!
//! - [`coercion`]: raw submitted values to typed values, per field type
//! - [`condition`]: conditional requirements evaluated against a submission
//! - [`definition`]: authoring-time checks of a schema edit (keys, options,
//!   condition compatibility, dependency cycles)
//!
//! The persisted entity types live in `formflow_db` and are re-exported here
//! for convenience.

pub mod coercion;
pub mod condition;
pub mod definition;

pub use coercion::{coerce, Coerced, CoercionError, FileHandle, RawValue, TypedValue, DATE_FORMAT};
pub use condition::{apply_operator, ConditionEvaluator};
pub use definition::{check_fields, check_schema_edit, slugify, validate_slug, SchemaDefinitionError};

pub use formflow_db::{ConditionOperator, FieldCondition, FieldInput, FieldType, FormField, FormSchemaEdit};
