//! Authoring-time checks for a form schema edit.
//!
//! Runs before any write. Rejects what the validator could not evaluate
//! later: unknown or self-referencing dependencies, cycles, operators that do
//! not apply to the dependency's type, and comparison literals that do not
//! parse under it.

use crate::coercion::TypedValue;
use formflow_db::{FieldInput, FieldType, FormSchemaEdit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));
static FIELD_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field key regex"));

pub const MAX_SLUG_LEN: usize = 100;

/// Errors in a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDefinitionError {
    #[error("Form title cannot be empty")]
    EmptyTitle,

    #[error("Invalid slug '{0}': use lowercase letters, digits and single dashes")]
    InvalidSlug(String),

    #[error("Invalid field key '{0}': use letters, digits and underscores, not starting with a digit")]
    InvalidFieldKey(String),

    #[error("Field key '{0}' is used more than once")]
    DuplicateFieldKey(String),

    /// Detail views and notifications are keyed by label
    #[error("Field label '{0}' is used more than once")]
    DuplicateLabel(String),

    #[error("Select field '{0}' needs at least one option")]
    MissingOptions(String),

    #[error("Field '{field_key}': {reason}")]
    InvalidField { field_key: String, reason: String },

    #[error("Field '{field_key}' depends on unknown field '{depends_on}'")]
    UnknownConditionField { field_key: String, depends_on: String },

    #[error("Invalid condition on field '{field_key}': {reason}")]
    InvalidCondition { field_key: String, reason: String },

    #[error("Condition dependency cycle: {}", path.join(" -> "))]
    ConditionCycle { path: Vec<String> },
}

/// Check a complete schema edit. The incoming field list is the whole new schema.
pub fn check_schema_edit(edit: &FormSchemaEdit) -> Result<(), SchemaDefinitionError> {
    if edit.title.trim().is_empty() {
        return Err(SchemaDefinitionError::EmptyTitle);
    }
    if let Some(slug) = &edit.slug {
        validate_slug(slug)?;
    }
    check_fields(&edit.fields)
}

/// Check field definitions, their conditions, and the dependency graph.
pub fn check_fields(fields: &[FieldInput]) -> Result<(), SchemaDefinitionError> {
    let mut by_key: HashMap<&str, &FieldInput> = HashMap::new();
    let mut seen_ids = HashSet::new();
    let mut seen_labels = HashSet::new();

    for field in fields {
        if !FIELD_KEY_RE.is_match(&field.field_key) {
            return Err(SchemaDefinitionError::InvalidFieldKey(field.field_key.clone()));
        }
        if by_key.insert(field.field_key.as_str(), field).is_some() {
            return Err(SchemaDefinitionError::DuplicateFieldKey(field.field_key.clone()));
        }
        if let Some(id) = &field.id {
            if !seen_ids.insert(id) {
                return Err(invalid_field(field, format!("field id {} listed twice", id)));
            }
        }
        check_field(field)?;
        if !seen_labels.insert(field.label.trim()) {
            return Err(SchemaDefinitionError::DuplicateLabel(field.label.trim().to_string()));
        }
    }

    for field in fields {
        let Some(condition) = &field.condition else {
            continue;
        };

        if condition.depends_on == field.field_key {
            return Err(SchemaDefinitionError::ConditionCycle {
                path: vec![field.field_key.clone(), field.field_key.clone()],
            });
        }

        let dependency = by_key.get(condition.depends_on.as_str()).ok_or_else(|| {
            SchemaDefinitionError::UnknownConditionField {
                field_key: field.field_key.clone(),
                depends_on: condition.depends_on.clone(),
            }
        })?;

        check_condition_types(field, dependency)?;
    }

    detect_cycle(fields)
}

fn check_field(field: &FieldInput) -> Result<(), SchemaDefinitionError> {
    if field.label.trim().is_empty() {
        return Err(invalid_field(field, "label cannot be empty"));
    }

    match field.field_type {
        FieldType::Select => {
            if field.options.is_empty() {
                return Err(SchemaDefinitionError::MissingOptions(field.field_key.clone()));
            }
            let mut seen = HashSet::new();
            for option in &field.options {
                if option.trim().is_empty() || option.trim() != option {
                    return Err(invalid_field(field, format!("invalid option {:?}", option)));
                }
                if !seen.insert(option) {
                    return Err(invalid_field(field, format!("option '{}' listed twice", option)));
                }
            }
        }
        _ if !field.options.is_empty() => {
            return Err(invalid_field(
                field,
                format!("options are only allowed on select fields, not {}", field.field_type),
            ));
        }
        _ => {}
    }

    Ok(())
}

fn check_condition_types(field: &FieldInput, dependency: &FieldInput) -> Result<(), SchemaDefinitionError> {
    let Some(condition) = &field.condition else {
        return Ok(());
    };
    let invalid = |reason: String| SchemaDefinitionError::InvalidCondition {
        field_key: field.field_key.clone(),
        reason,
    };

    if dependency.field_type == FieldType::File {
        return Err(invalid(format!("cannot compare file field '{}'", dependency.field_key)));
    }
    if condition.operator.is_ordering() && !dependency.field_type.is_ordered() {
        return Err(invalid(format!(
            "'{}' needs a number or date dependency, '{}' is {}",
            condition.operator, dependency.field_key, dependency.field_type
        )));
    }
    if condition.operator == formflow_db::ConditionOperator::Contains && !dependency.field_type.is_textual() {
        return Err(invalid(format!(
            "'contains' needs a text dependency, '{}' is {}",
            dependency.field_key, dependency.field_type
        )));
    }

    let literal = TypedValue::parse(dependency.field_type, &condition.value)
        .map_err(|e| invalid(format!("comparison value: {}", e)))?;
    if let TypedValue::Choice(choice) = &literal {
        if !dependency.options.iter().any(|o| o == choice) {
            return Err(invalid(format!(
                "'{}' is not an option of '{}'",
                choice, dependency.field_key
            )));
        }
    }

    Ok(())
}

/// Each field has at most one dependency, so the graph is a set of chains;
/// walking every chain finds any cycle.
fn detect_cycle(fields: &[FieldInput]) -> Result<(), SchemaDefinitionError> {
    let edges: HashMap<&str, &str> = fields
        .iter()
        .filter_map(|f| {
            f.condition
                .as_ref()
                .map(|c| (f.field_key.as_str(), c.depends_on.as_str()))
        })
        .collect();

    let mut cleared: HashSet<&str> = HashSet::new();

    for start in edges.keys() {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = *start;

        loop {
            if cleared.contains(current) {
                break;
            }
            if !on_path.insert(current) {
                let begin = path.iter().position(|k| *k == current).unwrap_or(0);
                let mut cycle: Vec<String> = path[begin..].iter().map(|k| k.to_string()).collect();
                cycle.push(current.to_string());
                return Err(SchemaDefinitionError::ConditionCycle { path: cycle });
            }
            path.push(current);
            match edges.get(current) {
                Some(next) => current = *next,
                None => break,
            }
        }

        cleared.extend(path);
    }

    Ok(())
}

fn invalid_field(field: &FieldInput, reason: impl Into<String>) -> SchemaDefinitionError {
    SchemaDefinitionError::InvalidField {
        field_key: field.field_key.clone(),
        reason: reason.into(),
    }
}

/// Check that a slug is URL-safe.
pub fn validate_slug(slug: &str) -> Result<(), SchemaDefinitionError> {
    if slug.len() > MAX_SLUG_LEN || !SLUG_RE.is_match(slug) {
        return Err(SchemaDefinitionError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Derive a slug from a title: lowercase ASCII words joined by dashes.
///
/// Returns `None` if the title has no ASCII letters or digits at all.
pub fn slugify(title: &str) -> Option<String> {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    let slug = slug.trim_end_matches('-').to_string();
    (!slug.is_empty()).then_some(slug)
}
