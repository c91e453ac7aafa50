//! `formflow form apply|list|show`

use super::output::{format_timestamp, print_json, print_table, yes_no};
use anyhow::{Context, Result};
use formflow::{FormEngine, FormField, FormSchemaEdit};
use formflow_schema::slugify;
use std::path::Path;

/// Create or update a form from a JSON schema file.
///
/// A file without `form_id` updates the form that owns its slug (or the slug
/// derived from its title) if there is one; fields without `id` are then
/// matched to existing fields by `field_key`.
pub async fn apply(engine: &FormEngine, path: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    let mut edit: FormSchemaEdit = serde_json::from_str(&content)
        .with_context(|| format!("Invalid schema file: {}", path.display()))?;

    if edit.form_id.is_none() {
        let lookup = edit.slug.clone().or_else(|| slugify(&edit.title));
        if let Some(slug) = lookup {
            if let Some(existing) = engine.db().get_form_by_slug(&slug).await? {
                let current = engine.form_schema(&existing.id).await?;
                for input in edit.fields.iter_mut().filter(|f| f.id.is_none()) {
                    input.id = current.field(&input.field_key).map(|f| f.id.clone());
                }
                edit.form_id = Some(existing.id);
            }
        }
    }

    let created = edit.form_id.is_none();
    let field_count = edit.fields.len();
    let form = engine.save_form_schema(edit).await?;

    if json {
        return print_json(&form);
    }
    println!(
        "{} form '{}' ({}), schema v{}, {} field(s)",
        if created { "Created" } else { "Updated" },
        form.slug,
        form.id,
        form.schema_version,
        field_count
    );
    Ok(())
}

pub async fn list(engine: &FormEngine, json: bool) -> Result<()> {
    let forms = engine.list_forms().await?;
    if json {
        return print_json(&forms);
    }
    if forms.is_empty() {
        println!("No forms yet. Create one with: formflow form apply <schema.json>");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(forms.len());
    for form in &forms {
        let submissions = engine.count_submissions(&form.id).await?;
        rows.push(vec![
            form.slug.clone(),
            form.title.clone(),
            yes_no(form.is_active).to_string(),
            form.schema_version.to_string(),
            submissions.to_string(),
            format_timestamp(&form.updated_at),
        ]);
    }
    print_table(&["Slug", "Title", "Active", "Version", "Submissions", "Updated"], rows);
    Ok(())
}

pub async fn show(engine: &FormEngine, slug: &str, json: bool) -> Result<()> {
    let form = engine.get_form_by_slug(slug).await?;
    let schema = engine.form_schema(&form.id).await?;

    if json {
        return print_json(&serde_json::json!({
            "form": schema.form,
            "fields": schema.fields,
        }));
    }

    println!("{} ({})", form.title, form.slug);
    println!("  id:       {}", form.id);
    println!("  active:   {}", yes_no(form.is_active));
    println!("  version:  {}", form.schema_version);
    println!("  created:  {}", format_timestamp(&form.created_at));
    println!("  updated:  {}", format_timestamp(&form.updated_at));

    let rows = schema.fields.iter().map(field_row).collect();
    print_table(&["#", "Key", "Label", "Type", "Required", "Condition", "Options"], rows);
    Ok(())
}

fn field_row(field: &FormField) -> Vec<String> {
    let condition = field
        .condition
        .as_ref()
        .map(|c| format!("{} {} {}", c.depends_on, c.operator, c.value))
        .unwrap_or_default();
    vec![
        field.order.to_string(),
        field.field_key.clone(),
        field.label.clone(),
        field.field_type.to_string(),
        yes_no(field.is_required).to_string(),
        condition,
        field.options.join(", "),
    ]
}
