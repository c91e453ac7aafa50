//! `formflow init` and `formflow config`

use super::output::{print_json, print_table};
use anyhow::{Context, Result};
use formflow::config::CONFIG_FILE_NAME;
use formflow::{FormflowConfig, FormflowDb};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ConfigReport<'a> {
    home: &'a Path,
    config_file: Option<String>,
    #[serde(flatten)]
    config: &'a FormflowConfig,
}

/// Create the home directory, a default config file, the database and the
/// upload directory. Existing files are left alone.
pub async fn init(home: &Path) -> Result<()> {
    std::fs::create_dir_all(home)
        .with_context(|| format!("Failed to create home directory: {}", home.display()))?;

    let config_path = home.join(CONFIG_FILE_NAME);
    let config = if config_path.exists() {
        println!("Config exists:   {}", config_path.display());
        FormflowConfig::load(home)?
    } else {
        let config = FormflowConfig::with_home(home);
        let written = config.save(home)?;
        println!("Wrote config:    {}", written.display());
        config
    };

    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("Failed to create upload directory: {}", config.upload_dir.display()))?;

    let db = FormflowDb::open(&config.database_path, config.db_options())
        .await
        .with_context(|| format!("Failed to open database: {}", config.database_path.display()))?;
    db.close().await;

    println!("Database:        {}", config.database_path.display());
    println!("Uploads:         {}", config.upload_dir.display());
    Ok(())
}

/// Show the effective configuration.
pub fn show(home: &Path, json: bool) -> Result<()> {
    let config = FormflowConfig::load(home)?;
    let config_path = home.join(CONFIG_FILE_NAME);
    let config_file = config_path
        .exists()
        .then(|| config_path.display().to_string());

    if json {
        return print_json(&ConfigReport {
            home,
            config_file,
            config: &config,
        });
    }

    print_table(
        &["Setting", "Value"],
        vec![
            vec!["home".into(), home.display().to_string()],
            vec![
                "config_file".into(),
                config_file.unwrap_or_else(|| "(defaults)".into()),
            ],
            vec!["database_path".into(), config.database_path.display().to_string()],
            vec!["upload_dir".into(), config.upload_dir.display().to_string()],
            vec!["storage_timeout_ms".into(), config.storage_timeout_ms.to_string()],
            vec!["dispatch_queue_capacity".into(), config.dispatch_queue_capacity.to_string()],
            vec!["max_schema_retries".into(), config.max_schema_retries.to_string()],
            vec!["busy_timeout_ms".into(), config.busy_timeout_ms.to_string()],
            vec!["max_connections".into(), config.max_connections.to_string()],
        ],
    );
    Ok(())
}
