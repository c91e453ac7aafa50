//! Formflow admin CLI
//!
//! Manage form schemas, submit values, and inspect stored submissions
//! against a local Formflow home directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formflow::{FormEngine, FormflowConfig, FormflowError};
use formflow_logging::{init_logging, LogConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;

mod cli;

/// How long to wait for queued notifications after a command finishes
const NOTIFICATION_DRAIN_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "formflow", version, about = "Runtime-defined forms with validated, atomic submissions")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Formflow home directory (default: ~/.formflow)
    #[arg(long, global = true, env = "FORMFLOW_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the home directory, config file, database and upload directory
    Init,

    /// Show the effective configuration
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Manage form schemas
    Form {
        #[command(subcommand)]
        action: FormAction,
    },

    /// Submit values to an active form
    Submit {
        /// Form slug
        slug: String,

        /// Field value as KEY=VALUE (repeatable)
        #[arg(long = "value", value_name = "KEY=VALUE", value_parser = cli::submission::parse_key_value)]
        values: Vec<(String, String)>,

        /// File upload as KEY=PATH (repeatable)
        #[arg(long = "file", value_name = "KEY=PATH", value_parser = cli::submission::parse_key_path)]
        files: Vec<(String, PathBuf)>,

        #[arg(long)]
        json: bool,
    },

    /// Inspect stored submissions
    Submission {
        #[command(subcommand)]
        action: SubmissionAction,
    },
}

#[derive(Subcommand, Debug)]
enum FormAction {
    /// Create or update a form from a JSON schema file
    Apply {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List all forms
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a form and its fields
    Show {
        slug: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SubmissionAction {
    /// Show one submission as label/value pairs
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List submissions of a form, newest first
    List {
        slug: String,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let home = cli.home.clone().unwrap_or_else(formflow_logging::formflow_home);

    if let Err(err) = init_logging(LogConfig {
        app_name: "formflow",
        log_dir: Some(home.join("logs")),
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {}", err);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run_command(cli.command, &home)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<FormflowError>().and_then(FormflowError::validation) {
                Some(report) => eprintln!("{}", report),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}

async fn run_command(command: Commands, home: &Path) -> Result<()> {
    match command {
        Commands::Init => cli::config::init(home).await,
        Commands::Config { json } => cli::config::show(home, json),
        command => {
            let config = FormflowConfig::load(home)?;
            let (engine, worker) = FormEngine::from_config(&config)
                .await
                .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
            let notifications = worker.spawn();

            let result = run_engine_command(&engine, command).await;

            // Closing the last dispatcher handle lets the worker drain and stop
            drop(engine);
            if tokio::time::timeout(Duration::from_secs(NOTIFICATION_DRAIN_SECS), notifications)
                .await
                .is_err()
            {
                warn!("Pending notifications not delivered before exit");
            }
            result
        }
    }
}

async fn run_engine_command(engine: &FormEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Form { action } => match action {
            FormAction::Apply { path, json } => cli::form::apply(engine, &path, json).await,
            FormAction::List { json } => cli::form::list(engine, json).await,
            FormAction::Show { slug, json } => cli::form::show(engine, &slug, json).await,
        },
        Commands::Submit {
            slug,
            values,
            files,
            json,
        } => cli::submission::submit(engine, &slug, values, files, json).await,
        Commands::Submission { action } => match action {
            SubmissionAction::Show { id, json } => cli::submission::show(engine, &id, json).await,
            SubmissionAction::List { slug, json } => cli::submission::list(engine, &slug, json).await,
        },
        Commands::Init | Commands::Config { .. } => Ok(()),
    }
}
