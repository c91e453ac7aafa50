//! Database tests for schema edits and guarded submission writes.
//!
//! Uses REAL SQLite databases - no mocks.

use formflow_db::{
    ConditionOperator, DbError, DbOptions, FieldInput, FieldType, FormSchemaEdit, FormflowDb,
};
use formflow_ids::FieldId;
use tempfile::TempDir;

async fn open_db(tmp: &TempDir) -> FormflowDb {
    FormflowDb::open(tmp.path().join("formflow.sqlite3"), DbOptions::default())
        .await
        .unwrap()
}

fn contact_edit() -> FormSchemaEdit {
    FormSchemaEdit::create("Contact")
        .with_slug("contact")
        .with_field(FieldInput::new("name", "Name", FieldType::Text).required())
        .with_field(FieldInput::new("email", "Email", FieldType::Email))
}

async fn count(db: &FormflowDb, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db.pool())
        .await
        .unwrap()
}

// =============================================================================
// SCHEMA EDITS
// =============================================================================

/// Test creating a form persists fields in list order at version 1
#[tokio::test]
async fn test_create_form_with_fields() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let form = db.save_form_schema(&contact_edit()).await.unwrap();
    assert_eq!(form.slug, "contact");
    assert_eq!(form.schema_version, 1);
    assert!(form.is_active);

    let fields = db.get_fields(&form.id).await.unwrap();
    let keys: Vec<_> = fields.iter().map(|f| f.field_key.as_str()).collect();
    assert_eq!(keys, ["name", "email"]);
    assert_eq!(fields[0].order, 0);
    assert_eq!(fields[1].order, 1);

    let by_slug = db.get_form_by_slug("contact").await.unwrap().unwrap();
    assert_eq!(by_slug.id, form.id);
}

/// Test an update diffs fields: keep, rename, delete, add
#[tokio::test]
async fn test_update_diffs_fields() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let form = db.save_form_schema(&contact_edit()).await.unwrap();
    let fields = db.get_fields(&form.id).await.unwrap();
    let name_id = fields[0].id.clone();

    let mut renamed = FieldInput::from_field(&fields[0]);
    renamed.field_key = "full_name".into();
    renamed.order = None;

    let edit = FormSchemaEdit::update(form.id.clone(), "Contact us")
        .with_field(renamed)
        .with_field(FieldInput::new("phone", "Phone", FieldType::Text).with_condition(
            "full_name",
            ConditionOperator::Contains,
            "Dr",
        ));
    let updated = db.save_form_schema(&edit).await.unwrap();

    assert_eq!(updated.schema_version, 2);
    assert_eq!(updated.slug, "contact", "omitted slug is kept");
    assert_eq!(updated.title, "Contact us");

    let fields = db.get_fields(&form.id).await.unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].id, name_id, "updated in place");
    assert_eq!(fields[0].field_key, "full_name");
    assert_eq!(fields[1].field_key, "phone");
    assert_eq!(
        fields[1].condition.as_ref().map(|c| c.operator),
        Some(ConditionOperator::Contains)
    );
}

/// Test two fields can swap keys in one edit
#[tokio::test]
async fn test_key_swap() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let form = db.save_form_schema(&contact_edit()).await.unwrap();
    let fields = db.get_fields(&form.id).await.unwrap();

    let mut a = FieldInput::from_field(&fields[0]);
    let mut b = FieldInput::from_field(&fields[1]);
    std::mem::swap(&mut a.field_key, &mut b.field_key);

    db.save_form_schema(&FormSchemaEdit::update(form.id.clone(), "Contact").with_fields(vec![a, b]))
        .await
        .unwrap();

    let swapped = db.get_fields(&form.id).await.unwrap();
    assert_eq!(swapped[0].id, fields[0].id);
    assert_eq!(swapped[0].field_key, "email");
    assert_eq!(swapped[1].field_key, "name");
}

/// Test a slug collision rolls back the whole edit
#[tokio::test]
async fn test_duplicate_slug_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    db.save_form_schema(&contact_edit()).await.unwrap();
    let other = db
        .save_form_schema(
            &FormSchemaEdit::create("Feedback")
                .with_slug("feedback")
                .with_field(FieldInput::new("comment", "Comment", FieldType::Textarea)),
        )
        .await
        .unwrap();
    let before = db.get_fields(&other.id).await.unwrap();

    let edit = FormSchemaEdit::update(other.id.clone(), "Feedback")
        .with_slug("contact")
        .with_field(FieldInput::new("rating", "Rating", FieldType::Number));
    let err = db.save_form_schema(&edit).await.unwrap_err();
    assert!(matches!(err, DbError::DuplicateSlug(ref s) if s == "contact"), "{err}");

    let after = db.get_form(&other.id).await.unwrap().unwrap();
    assert_eq!(after.slug, "feedback");
    assert_eq!(after.schema_version, other.schema_version);
    assert_eq!(db.get_fields(&other.id).await.unwrap(), before);

    let err = db.save_form_schema(&contact_edit()).await.unwrap_err();
    assert!(matches!(err, DbError::DuplicateSlug(_)));
    assert_eq!(db.list_forms().await.unwrap().len(), 2);
}

/// Test a field id from another form is refused
#[tokio::test]
async fn test_unknown_field_id_refused() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit()).await.unwrap();

    let edit = FormSchemaEdit::update(form.id.clone(), "Contact")
        .with_field(FieldInput::new("x", "X", FieldType::Text).with_id(FieldId::new()));
    assert!(matches!(db.save_form_schema(&edit).await, Err(DbError::NotFound(_))));
    assert_eq!(db.get_fields(&form.id).await.unwrap().len(), 2);
}

// =============================================================================
// SUBMISSIONS
// =============================================================================

/// Test a committed submission is readable with its values and attachments
#[tokio::test]
async fn test_submission_commit() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db
        .save_form_schema(
            &contact_edit().with_field(FieldInput::new("cv", "CV", FieldType::File)),
        )
        .await
        .unwrap();
    let fields = db.get_fields(&form.id).await.unwrap();

    let mut tx = db.begin_submission(&form.id, form.schema_version).await.unwrap();
    tx.insert_value(&fields[0].id, "Ada").await.unwrap();
    tx.insert_attachment(&fields[2].id, "2024/01/abc-cv.pdf", "cv.pdf", Some("application/pdf"), 42)
        .await
        .unwrap();
    let submission = tx.commit().await.unwrap();

    assert_eq!(submission.schema_version, 1);
    assert_eq!(db.list_submissions(&form.id).await.unwrap(), vec![submission.clone()]);

    let values = db.get_submission_values(&submission.id).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, "Ada");

    let attachments = db.get_attachments(&submission.id).await.unwrap();
    assert_eq!(attachments[0].original_filename, "cv.pdf");
    assert_eq!(attachments[0].size_bytes, 42);
}

/// Test dropping or rolling back a submission leaves no rows
#[tokio::test]
async fn test_uncommitted_submission_leaves_nothing() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit()).await.unwrap();
    let fields = db.get_fields(&form.id).await.unwrap();

    let mut tx = db.begin_submission(&form.id, 1).await.unwrap();
    tx.insert_value(&fields[0].id, "Ada").await.unwrap();
    tx.rollback().await.unwrap();

    {
        let mut tx = db.begin_submission(&form.id, 1).await.unwrap();
        tx.insert_value(&fields[0].id, "Grace").await.unwrap();
    }

    assert_eq!(db.count_submissions(&form.id).await.unwrap(), 0);
    assert_eq!(count(&db, "submission_values").await, 0);
}

/// Test the version guard rejects submissions validated against an old schema
#[tokio::test]
async fn test_schema_changed_guard() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit()).await.unwrap();

    let fields = db.get_fields(&form.id).await.unwrap();
    let edit = FormSchemaEdit::update(form.id.clone(), "Contact")
        .with_fields(fields.iter().map(FieldInput::from_field).collect());
    db.save_form_schema(&edit).await.unwrap();

    match db.begin_submission(&form.id, 1).await {
        Err(DbError::SchemaChanged { expected, actual, .. }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        Err(other) => panic!("expected SchemaChanged, got {other}"),
        Ok(_) => panic!("expected SchemaChanged"),
    }
    assert_eq!(db.count_submissions(&form.id).await.unwrap(), 0);
}

/// Test inactive forms refuse submissions
#[tokio::test]
async fn test_inactive_form_refuses_submission() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit().inactive()).await.unwrap();

    assert!(matches!(
        db.begin_submission(&form.id, form.schema_version).await,
        Err(DbError::NotFound(_))
    ));
}

/// Test values for fields of another form are refused
#[tokio::test]
async fn test_foreign_field_refused() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let contact = db.save_form_schema(&contact_edit()).await.unwrap();
    let other = db
        .save_form_schema(
            &FormSchemaEdit::create("Other")
                .with_slug("other")
                .with_field(FieldInput::new("x", "X", FieldType::Text)),
        )
        .await
        .unwrap();
    let foreign = db.get_fields(&other.id).await.unwrap();

    let mut tx = db.begin_submission(&contact.id, 1).await.unwrap();
    let err = tx.insert_value(&foreign[0].id, "nope").await.unwrap_err();
    assert!(matches!(err, DbError::Constraint(_)));
}

/// Test deleting a field with submitted data fails and keeps the schema
#[tokio::test]
async fn test_field_in_use() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit()).await.unwrap();
    let fields = db.get_fields(&form.id).await.unwrap();

    let mut tx = db.begin_submission(&form.id, 1).await.unwrap();
    tx.insert_value(&fields[1].id, "ada@example.com").await.unwrap();
    tx.commit().await.unwrap();

    let edit = FormSchemaEdit::update(form.id.clone(), "Contact")
        .with_field(FieldInput::from_field(&fields[0]));
    match db.save_form_schema(&edit).await {
        Err(DbError::FieldInUse { field_key, references }) => {
            assert_eq!(field_key, "email");
            assert_eq!(references, 1);
        }
        other => panic!("expected FieldInUse, got {other:?}"),
    }

    assert_eq!(db.get_fields(&form.id).await.unwrap(), fields);
    assert_eq!(db.get_form(&form.id).await.unwrap().unwrap().schema_version, 1);
}

/// Test concurrent edits of one form serialize into consecutive versions
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_schema_saves_serialize() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;
    let form = db.save_form_schema(&contact_edit()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let db = db.clone();
        let id = form.id.clone();
        handles.push(tokio::spawn(async move {
            let edit = FormSchemaEdit::update(id, format!("Contact {i}"))
                .with_field(FieldInput::new(format!("only_{i}"), "Only", FieldType::Text));
            db.save_form_schema(&edit).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = db.get_form(&form.id).await.unwrap().unwrap();
    assert_eq!(stored.schema_version, 5);

    // Exactly one edit's field list survives, whole
    let fields = db.get_fields(&form.id).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert!(stored.title.ends_with(&fields[0].field_key["only_".len()..]));
}
