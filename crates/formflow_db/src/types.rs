//! Entity types for the five Formflow tables.
//!
//! These types are the single source of truth for forms, fields and
//! submissions. The engine, the CLI and the schema checks all use them.

use chrono::{DateTime, Utc};
use formflow_ids::{AttachmentId, FieldId, FormId, SubmissionId, SubmissionValueId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Schema Types
// ============================================================================

/// A form: the owner of an ordered, admin-defined field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    /// Globally unique, URL-safe handle
    pub slug: String,
    pub title: String,
    /// Inactive forms are hidden from the public submit path
    pub is_active: bool,
    /// Bumped by every schema save; submissions record the version they used
    pub schema_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Declared type of a field. Closed set; coercion matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Number,
    Date,
    Boolean,
    Select,
    File,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        Self::Text,
        Self::Textarea,
        Self::Email,
        Self::Number,
        Self::Date,
        Self::Boolean,
        Self::Select,
        Self::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Email => "email",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Free-form string types (`contains` applies to these).
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Textarea | Self::Email | Self::Select)
    }

    /// Types with a total order (`greater_than` and friends apply to these).
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Number | Self::Date)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison used by a conditional requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
            Self::Contains => "contains",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater_than" => Some(Self::GreaterThan),
            "less_than" => Some(Self::LessThan),
            "greater_or_equal" => Some(Self::GreaterOrEqual),
            "less_or_equal" => Some(Self::LessOrEqual),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    /// Operators that need an ordered dependency type.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::LessThan | Self::GreaterOrEqual | Self::LessOrEqual
        )
    }
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single-predicate conditional requirement: "required when
/// `<depends_on> <operator> <value>`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// `field_key` of another field in the same form
    pub depends_on: String,
    pub operator: ConditionOperator,
    /// Raw comparison literal, coerced with the dependency's type when evaluated
    pub value: String,
}

/// A persisted field definition (one EAV attribute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: FieldId,
    pub form_id: FormId,
    pub label: String,
    /// Unique within the form; the attribute name in submissions
    pub field_key: String,
    pub field_type: FieldType,
    pub is_required: bool,
    /// Display and validation order
    pub order: i64,
    /// Allowed values for `select` fields, empty otherwise
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default)]
    pub condition: Option<FieldCondition>,
}

/// One field of an incoming schema edit.
///
/// `id` present means "update this existing field in place"; absent means
/// "create". Existing fields missing from the edit are deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInput {
    #[serde(default)]
    pub id: Option<FieldId>,
    pub label: String,
    pub field_key: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub is_required: bool,
    /// Defaults to the position in the incoming list
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default)]
    pub condition: Option<FieldCondition>,
}

impl FieldInput {
    pub fn new(field_key: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: None,
            label: label.into(),
            field_key: field_key.into(),
            field_type,
            is_required: false,
            order: None,
            options: Vec::new(),
            help_text: None,
            condition: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_id(mut self, id: FieldId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(
        mut self,
        depends_on: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        self.condition = Some(FieldCondition {
            depends_on: depends_on.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }

    /// Start an edit of an existing field from its persisted definition.
    pub fn from_field(field: &FormField) -> Self {
        Self {
            id: Some(field.id.clone()),
            label: field.label.clone(),
            field_key: field.field_key.clone(),
            field_type: field.field_type,
            is_required: field.is_required,
            order: Some(field.order),
            options: field.options.clone(),
            help_text: field.help_text.clone(),
            condition: field.condition.clone(),
        }
    }
}

/// An admin's complete form edit: form attributes plus the full new field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchemaEdit {
    /// `None` creates a new form
    #[serde(default)]
    pub form_id: Option<FormId>,
    pub title: String,
    /// Required on create (derive one from the title first); `None` on
    /// update keeps the current slug
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

fn default_active() -> bool {
    true
}

impl FormSchemaEdit {
    pub fn create(title: impl Into<String>) -> Self {
        Self {
            form_id: None,
            title: title.into(),
            slug: None,
            is_active: true,
            fields: Vec::new(),
        }
    }

    pub fn update(form_id: FormId, title: impl Into<String>) -> Self {
        Self {
            form_id: Some(form_id),
            ..Self::create(title)
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_field(mut self, field: FieldInput) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldInput>) -> Self {
        self.fields = fields;
        self
    }
}

// ============================================================================
// Submission Types
// ============================================================================

/// A committed, append-only submission header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: SubmissionId,
    pub form_id: FormId,
    /// Schema version the values were validated against
    pub schema_version: i64,
    pub submitted_at: DateTime<Utc>,
}

/// One EAV fact: the serialized value of a non-file field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionValue {
    pub id: SubmissionValueId,
    pub submission_id: SubmissionId,
    pub field_id: FieldId,
    pub value: String,
}

/// A stored file for a file-typed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: AttachmentId,
    pub submission_id: SubmissionId,
    pub field_id: FieldId,
    /// Opaque handle returned by the file storage backend
    pub stored_reference: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}
