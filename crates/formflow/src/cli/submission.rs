//! `formflow submit` and `formflow submission show|list`

use super::output::{format_size, format_timestamp, print_json, print_table};
use anyhow::{bail, Context, Result};
use formflow::{FileHandle, FormEngine, RawSubmission, RawValue, SubmissionId};
use std::path::{Path, PathBuf};

/// Parse a `key=value` argument
pub fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse a `key=path` argument
pub fn parse_key_path(s: &str) -> std::result::Result<(String, PathBuf), String> {
    parse_key_value(s).map(|(key, path)| (key, PathBuf::from(path)))
}

pub async fn submit(
    engine: &FormEngine,
    slug: &str,
    values: Vec<(String, String)>,
    files: Vec<(String, PathBuf)>,
    json: bool,
) -> Result<()> {
    let mut raw = RawSubmission::new();
    for (key, value) in values {
        if raw.insert(key.clone(), RawValue::from(value)).is_some() {
            bail!("Field '{}' given more than once", key);
        }
    }
    for (key, path) in files {
        let file = read_upload(&path).await?;
        if raw.insert(key.clone(), RawValue::File(file)).is_some() {
            bail!("Field '{}' given more than once", key);
        }
    }

    let submission = engine.validate_and_save_submission_by_slug(slug, &raw).await?;

    if json {
        return print_json(&submission);
    }
    println!("Submission {} saved ({})", submission.id, format_timestamp(&submission.submitted_at));
    Ok(())
}

pub async fn show(engine: &FormEngine, id: &str, json: bool) -> Result<()> {
    let id = SubmissionId::parse(id).with_context(|| format!("Invalid submission id: {}", id))?;
    let view = engine.get_submission_detail_view(&id).await?;

    if json {
        return print_json(&view);
    }

    println!("{} ({})", view.form.title, view.form.slug);
    println!("  submission: {}", view.submission.id);
    println!("  submitted:  {}", format_timestamp(&view.submission.submitted_at));
    println!("  schema:     v{}", view.submission.schema_version);

    let rows = view
        .entries
        .iter()
        .map(|entry| {
            let display = match &entry.attachment {
                Some(a) => format!(
                    "{} ({}, {})",
                    entry.display,
                    format_size(u64::try_from(a.size_bytes).unwrap_or(0)),
                    a.stored_reference
                ),
                None => entry.display.clone(),
            };
            vec![entry.label.clone(), display]
        })
        .collect();
    print_table(&["Field", "Value"], rows);
    Ok(())
}

pub async fn list(engine: &FormEngine, slug: &str, json: bool) -> Result<()> {
    let form = engine.get_form_by_slug(slug).await?;
    let submissions = engine.list_submissions(&form.id).await?;

    if json {
        return print_json(&submissions);
    }
    if submissions.is_empty() {
        println!("No submissions for '{}'", form.slug);
        return Ok(());
    }

    let rows = submissions
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                format_timestamp(&s.submitted_at),
                format!("v{}", s.schema_version),
            ]
        })
        .collect();
    print_table(&["Submission", "Submitted", "Schema"], rows);
    Ok(())
}

async fn read_upload(path: &Path) -> Result<FileHandle> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read upload: {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let mut file = FileHandle::new(filename, data);
    if let Some(content_type) = guess_content_type(path) {
        file = file.with_content_type(content_type);
    }
    Ok(file)
}

fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(content_type)
}
