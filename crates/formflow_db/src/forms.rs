//! Form and field operations (schema read model and the atomic form edit)

use crate::error::{unique_violation, DbError, Result};
use crate::types::*;
use crate::FormflowDb;
use formflow_ids::{FieldId, FormId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use tracing::{debug, info};

const FORM_COLUMNS: &str = "id, slug, title, is_active, schema_version, created_at, updated_at";
const FIELD_COLUMNS: &str = "id, form_id, label, field_key, field_type, is_required, sort_order, \
     options_json, help_text, condition_field_key, condition_operator, condition_value";

impl FormflowDb {
    // ========================================================================
    // Read model
    // ========================================================================

    /// Get a form by ID
    pub async fn get_form(&self, id: &FormId) -> Result<Option<Form>> {
        let row = sqlx::query(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_form).transpose()
    }

    /// Get a form by slug
    pub async fn get_form_by_slug(&self, slug: &str) -> Result<Option<Form>> {
        let row = sqlx::query(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_form).transpose()
    }

    /// List all forms, active and inactive, by title
    pub async fn list_forms(&self) -> Result<Vec<Form>> {
        let rows = sqlx::query(&format!("SELECT {FORM_COLUMNS} FROM forms ORDER BY title, slug"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_form).collect()
    }

    /// Current field definitions of a form, in display order
    pub async fn get_fields(&self, form_id: &FormId) -> Result<Vec<FormField>> {
        let mut conn = self.pool.acquire().await?;
        fetch_fields(&mut *conn, form_id).await
    }

    /// A form together with its fields, read from one snapshot
    pub async fn get_form_with_fields(&self, form_id: &FormId) -> Result<Option<(Form, Vec<FormField>)>> {
        let mut tx = self.pool.begin().await?;

        let Some(form) = fetch_form(&mut *tx, form_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        let fields = fetch_fields(&mut *tx, form_id).await?;

        tx.commit().await?;
        Ok(Some((form, fields)))
    }

    // ========================================================================
    // Atomic form edit
    // ========================================================================

    /// Persist a form and its complete field list as one transaction.
    ///
    /// The incoming list is diffed against the stored one: stored fields whose
    /// id is absent are deleted, fields with an id are updated in place, fields
    /// without one are created. Any failure rolls back everything, including
    /// the form row itself.
    ///
    /// The first statement writes the form row, so the SQLite write lock is
    /// held before the existing fields are read; two concurrent edits of the
    /// same form cannot interleave their diffs.
    ///
    /// Callers validate the edit (keys, conditions, cycles) beforehand.
    pub async fn save_form_schema(&self, edit: &FormSchemaEdit) -> Result<Form> {
        let mut tx = self.pool.begin().await?;
        let now = Self::now_millis();

        let form_id = match &edit.form_id {
            None => {
                let slug = edit
                    .slug
                    .as_deref()
                    .ok_or_else(|| DbError::invalid_state("A new form needs a slug"))?;
                let id = FormId::new();
                sqlx::query(
                    r#"
                    INSERT INTO forms (id, slug, title, is_active, schema_version, created_at, updated_at)
                    VALUES (?, ?, ?, ?, 1, ?, ?)
                    "#,
                )
                .bind(id.as_str())
                .bind(slug)
                .bind(&edit.title)
                .bind(edit.is_active)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| slug_error(e, slug))?;
                id
            }
            Some(id) => {
                let result = sqlx::query(
                    r#"
                    UPDATE forms SET
                        title = ?,
                        slug = COALESCE(?, slug),
                        is_active = ?,
                        schema_version = schema_version + 1,
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&edit.title)
                .bind(edit.slug.as_deref())
                .bind(edit.is_active)
                .bind(now)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| slug_error(e, edit.slug.as_deref().unwrap_or_default()))?;

                if result.rows_affected() == 0 {
                    return Err(DbError::not_found(format!("Form {}", id)));
                }
                id.clone()
            }
        };

        apply_field_diff(&mut *tx, &form_id, &edit.fields).await?;

        let form = fetch_form(&mut *tx, &form_id)
            .await?
            .ok_or_else(|| DbError::invalid_state(format!("Form {} vanished mid-transaction", form_id)))?;

        tx.commit().await?;

        info!(
            form_id = %form.id,
            slug = %form.slug,
            schema_version = form.schema_version,
            fields = edit.fields.len(),
            "Form schema saved"
        );
        Ok(form)
    }
}

async fn apply_field_diff(
    conn: &mut SqliteConnection,
    form_id: &FormId,
    incoming: &[FieldInput],
) -> Result<()> {
    let existing = fetch_fields(conn, form_id).await?;
    let existing_ids: HashSet<&FieldId> = existing.iter().map(|f| &f.id).collect();
    let kept: HashSet<&FieldId> = incoming.iter().filter_map(|f| f.id.as_ref()).collect();

    for id in &kept {
        if !existing_ids.contains(id) {
            return Err(DbError::not_found(format!("Field {} in form {}", id, form_id)));
        }
    }

    // Deletions first so a re-added key does not collide with the old row
    for field in existing.iter().filter(|f| !kept.contains(&f.id)) {
        let references: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM submission_values WHERE field_id = ?1)
                 + (SELECT COUNT(*) FROM file_attachments WHERE field_id = ?1)
            "#,
        )
        .bind(field.id.as_str())
        .fetch_one(&mut *conn)
        .await?;

        if references > 0 {
            return Err(DbError::FieldInUse {
                field_key: field.field_key.clone(),
                references,
            });
        }

        sqlx::query("DELETE FROM form_fields WHERE id = ?")
            .bind(field.id.as_str())
            .execute(&mut *conn)
            .await?;
        debug!(form_id = %form_id, field_key = %field.field_key, "Field deleted");
    }

    // Park retained keys so renames and swaps never trip UNIQUE(form_id, field_key)
    sqlx::query("UPDATE form_fields SET field_key = '~' || id WHERE form_id = ?")
        .bind(form_id.as_str())
        .execute(&mut *conn)
        .await?;

    for (position, input) in incoming.iter().enumerate() {
        let order = input.order.unwrap_or(position as i64);
        let options_json = serde_json::to_string(&input.options)?;
        let (cond_key, cond_op, cond_value) = match &input.condition {
            Some(c) => (
                Some(c.depends_on.as_str()),
                Some(c.operator.as_str()),
                Some(c.value.as_str()),
            ),
            None => (None, None, None),
        };

        let id = input.id.clone().unwrap_or_default();
        let sql = if input.id.is_some() {
            r#"
            UPDATE form_fields SET
                label = ?2, field_key = ?3, field_type = ?4, is_required = ?5, sort_order = ?6,
                options_json = ?7, help_text = ?8,
                condition_field_key = ?9, condition_operator = ?10, condition_value = ?11
            WHERE id = ?1 AND form_id = ?12
            "#
        } else {
            r#"
            INSERT INTO form_fields (
                id, label, field_key, field_type, is_required, sort_order,
                options_json, help_text,
                condition_field_key, condition_operator, condition_value, form_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#
        };

        sqlx::query(sql)
            .bind(id.as_str())
            .bind(&input.label)
            .bind(&input.field_key)
            .bind(input.field_type.as_str())
            .bind(input.is_required)
            .bind(order)
            .bind(&options_json)
            .bind(input.help_text.as_deref())
            .bind(cond_key)
            .bind(cond_op)
            .bind(cond_value)
            .bind(form_id.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| match unique_violation(&e) {
                Some(_) => DbError::constraint(format!(
                    "Duplicate field key '{}' in form {}",
                    input.field_key, form_id
                )),
                None => DbError::Sqlx(e),
            })?;
    }

    Ok(())
}

pub(crate) async fn fetch_form(conn: &mut SqliteConnection, id: &FormId) -> Result<Option<Form>> {
    let row = sqlx::query(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_form).transpose()
}

pub(crate) async fn fetch_fields(conn: &mut SqliteConnection, form_id: &FormId) -> Result<Vec<FormField>> {
    let rows = sqlx::query(&format!(
        "SELECT {FIELD_COLUMNS} FROM form_fields WHERE form_id = ? ORDER BY sort_order, field_key"
    ))
    .bind(form_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_field).collect()
}

fn slug_error(err: sqlx::Error, slug: &str) -> DbError {
    match unique_violation(&err) {
        Some(message) if message.contains("forms.slug") => DbError::DuplicateSlug(slug.to_string()),
        Some(message) => DbError::constraint(message),
        None => DbError::Sqlx(err),
    }
}

pub(crate) fn parse_id<T: std::str::FromStr<Err = formflow_ids::IdParseError>>(raw: &str) -> Result<T> {
    T::from_str(raw).map_err(|e| DbError::invalid_state(e.to_string()))
}

pub(crate) fn row_to_form(row: &SqliteRow) -> Result<Form> {
    let id: String = row.try_get("id")?;
    Ok(Form {
        id: parse_id(&id)?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        is_active: row.try_get("is_active")?,
        schema_version: row.try_get("schema_version")?,
        created_at: FormflowDb::millis_to_datetime(row.try_get("created_at")?)?,
        updated_at: FormflowDb::millis_to_datetime(row.try_get("updated_at")?)?,
    })
}

pub(crate) fn row_to_field(row: &SqliteRow) -> Result<FormField> {
    let id: String = row.try_get("id")?;
    let form_id: String = row.try_get("form_id")?;

    let type_str: String = row.try_get("field_type")?;
    let field_type = FieldType::parse(&type_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown field type: {}", type_str)))?;

    let options_json: String = row.try_get("options_json")?;
    let options: Vec<String> = serde_json::from_str(&options_json)?;

    let cond_key: Option<String> = row.try_get("condition_field_key")?;
    let cond_op: Option<String> = row.try_get("condition_operator")?;
    let cond_value: Option<String> = row.try_get("condition_value")?;
    let condition = match (cond_key, cond_op) {
        (Some(depends_on), Some(op)) => {
            let operator = ConditionOperator::parse(&op)
                .ok_or_else(|| DbError::invalid_state(format!("Unknown condition operator: {}", op)))?;
            Some(FieldCondition {
                depends_on,
                operator,
                value: cond_value.unwrap_or_default(),
            })
        }
        _ => None,
    };

    Ok(FormField {
        id: parse_id(&id)?,
        form_id: parse_id(&form_id)?,
        label: row.try_get("label")?,
        field_key: row.try_get("field_key")?,
        field_type,
        is_required: row.try_get("is_required")?,
        order: row.try_get("sort_order")?,
        options,
        help_text: row.try_get("help_text")?,
        condition,
    })
}
