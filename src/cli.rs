//! CLI definition and dispatch.
//!
//! Every command reads the INI file given with `--config`, opens the store it
//! names and prints its result as JSON on stdout. Diagnostics go to stderr.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::alerts::process_alerts;
use crate::domain::catalog;
use crate::domain::constituents::{BatchStatus, IndexUpload, MatchPolicy, load_batch};
use crate::domain::error::IndexwatchError;
use crate::domain::overlap::analyze_overlap;
use crate::domain::reconcile::{parse_master_config, reconcile_config};
use crate::domain::settings::Settings;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::IndexStore;

#[derive(Parser, Debug)]
#[command(name = "indexwatch", about = "Stock index membership tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Reconcile a master configuration file into the store
    LoadConfig {
        #[arg(short, long)]
        config: PathBuf,
        file: PathBuf,
    },
    /// Replace index constituents from one or more files
    Upload {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        index_id: Option<i64>,
        #[arg(long)]
        category: Option<String>,
        /// Create an index for files no existing index claims
        #[arg(long)]
        auto_create: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Stock overlap across indices
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,
    },
    /// Map an alert export onto known indices
    Alerts {
        #[arg(short, long)]
        config: PathBuf,
        file: PathBuf,
    },
    /// List all indices
    List {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Delete an index and its constituents
    Delete {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        id: i64,
    },
    /// Find indices holding a ticker
    Search {
        #[arg(short, long)]
        config: PathBuf,
        query: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitDb { config } => run_init_db(&config),
        Command::LoadConfig { config, file } => run_load_config(&config, &file),
        Command::Upload {
            config,
            index_id,
            category,
            auto_create,
            files,
        } => {
            let policy = if auto_create {
                MatchPolicy::AutoCreate
            } else {
                MatchPolicy::Strict
            };
            run_upload(&config, &files, index_id, category, policy)
        }
        Command::Analyze { config, ids } => with_store(&config, |store, _| {
            print_json(&analyze_overlap(store, &ids)?)
        }),
        Command::Alerts { config, file } => with_store(&config, |store, settings| {
            let (filename, bytes) = read_upload(&file)?;
            let report = process_alerts(store, &bytes, &filename, settings.alerts.signal_match)?;
            print_json(&report)
        }),
        Command::List { config } => {
            with_store(&config, |store, _| print_json(&catalog::list_indices(store)?))
        }
        Command::Delete { config, id } => {
            with_store(&config, |store, _| print_json(&catalog::delete_index(store, id)?))
        }
        Command::Search { config, query } => with_store(&config, |store, _| {
            print_json(&catalog::search_indices(store, &query)?)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

fn fail(err: IndexwatchError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

#[cfg(feature = "sqlite")]
fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn IndexStore>, ExitCode> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config).map_err(fail)?;
    adapter.initialize_schema().map_err(fail)?;
    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &dyn ConfigPort) -> Result<Arc<dyn IndexStore>, ExitCode> {
    eprintln!("error: sqlite feature is required");
    Err(ExitCode::from(1))
}

/// Load config, settings and store, then run `op` against them.
fn with_store<F>(config_path: &Path, op: F) -> Result<(), ExitCode>
where
    F: FnOnce(&dyn IndexStore, &Settings) -> Result<(), IndexwatchError>,
{
    let config = load_config(config_path)?;
    let settings = Settings::from_config(&config).map_err(fail)?;
    let store = open_store(&config)?;
    op(&*store, &settings).map_err(fail)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), IndexwatchError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| IndexwatchError::Io(std::io::Error::other(e)))?;
    println!("{}", text);
    Ok(())
}

/// File name (without directories) and contents.
fn read_upload(path: &Path) -> Result<(String, Vec<u8>), IndexwatchError> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((filename, bytes))
}

fn run_init_db(config_path: &Path) -> Result<(), ExitCode> {
    with_store(config_path, |store, _| {
        print_json(&catalog::health(store)?)
    })
}

fn run_load_config(config_path: &Path, file: &Path) -> Result<(), ExitCode> {
    with_store(config_path, |store, _| {
        let (filename, bytes) = read_upload(file)?;
        let rows = parse_master_config(&bytes, &filename)?;
        let report = reconcile_config(store, &rows)?;
        info!(
            filename = %filename,
            processed = report.processed,
            created = report.created,
            "master configuration loaded"
        );
        print_json(&report)
    })
}

fn run_upload(
    config_path: &Path,
    files: &[PathBuf],
    index_id: Option<i64>,
    category: Option<String>,
    policy: MatchPolicy,
) -> Result<(), ExitCode> {
    let mut all_failed = false;
    with_store(config_path, |store, settings| {
        let mut uploads = Vec::with_capacity(files.len());
        for path in files {
            let (filename, bytes) = read_upload(path)?;
            uploads.push(IndexUpload {
                filename,
                bytes,
                index_id,
                category: category.clone(),
            });
        }
        let report = load_batch(store, &uploads, policy, &settings.upload);
        all_failed = report.status == BatchStatus::AllFailed;
        print_json(&report)
    })?;

    if all_failed {
        eprintln!("error: no file was loaded");
        return Err(ExitCode::from(4));
    }
    Ok(())
}

fn run_serve(config_path: &Path) -> Result<(), ExitCode> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, build_router};

        eprintln!("Loading config from {}", config_path.display());
        let config = load_config(config_path)?;
        let settings = Settings::from_config(&config).map_err(fail)?;
        let store = open_store(&config)?;

        let addr = settings.web.listen;
        let router = build_router(AppState { store, settings });

        let runtime = tokio::runtime::Runtime::new().map_err(|e| fail(e.into()))?;
        runtime
            .block_on(async {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!(%addr, "web server listening");
                axum::serve(listener, router).await
            })
            .map_err(|e| fail(e.into()))
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        Err(ExitCode::from(1))
    }
}
