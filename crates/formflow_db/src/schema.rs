//! Table creation for all Formflow entities.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::FormflowDb;
use tracing::info;

impl FormflowDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_form_tables().await?;
        self.create_submission_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Forms and their field definitions
    async fn create_form_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS forms (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                schema_version INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Conditions are flattened into three nullable columns; all or none set
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS form_fields (
                id TEXT PRIMARY KEY,
                form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                field_key TEXT NOT NULL,
                field_type TEXT NOT NULL,
                is_required INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                options_json TEXT NOT NULL DEFAULT '[]',
                help_text TEXT,
                condition_field_key TEXT,
                condition_operator TEXT,
                condition_value TEXT,
                UNIQUE(form_id, field_key),
                CHECK((condition_field_key IS NULL) = (condition_operator IS NULL))
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_form_fields_form ON form_fields(form_id, sort_order)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Submissions and their EAV value/file rows
    async fn create_submission_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS form_submissions (
                id TEXT PRIMARY KEY,
                form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
                schema_version INTEGER NOT NULL,
                submitted_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // field_id has no cascade: deleting a field with data must fail
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS submission_values (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL REFERENCES form_submissions(id) ON DELETE CASCADE,
                field_id TEXT NOT NULL REFERENCES form_fields(id),
                value TEXT NOT NULL,
                UNIQUE(submission_id, field_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS file_attachments (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL REFERENCES form_submissions(id) ON DELETE CASCADE,
                field_id TEXT NOT NULL REFERENCES form_fields(id),
                stored_reference TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                content_type TEXT,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                UNIQUE(submission_id, field_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_form ON form_submissions(form_id, submitted_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_values_field ON submission_values(field_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_field ON file_attachments(field_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
