use crate::input::latest_input_file;
use crate::types::{ClientConfig, IngestConfig, IngestError, Result, StoreConfig, DEFAULT_DATABASE_URL, DEFAULT_HOST};
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "feed-posts", about = "Fetch feed generator posts and store the new ones in Postgres")]
pub struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// JSON file with `username` and `password`
    #[arg(long, env = "FEED_POSTS_CREDENTIALS", default_value = "../config.json")]
    pub credentials: PathBuf,

    /// CSV of (repository, record) pairs
    #[arg(long, conflicts_with = "input_dir")]
    pub input: Option<PathBuf>,

    /// Directory of dids_and_paths_<YYYYMMDD>.csv files; the latest is used
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long, env = "FEED_POSTS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = 10)]
    pub workers: usize,

    /// Feeds dispatched per second
    #[arg(long, default_value_t = 10)]
    pub rate_per_second: u32,

    /// Posts requested per page
    #[arg(long, default_value_t = 100)]
    pub page_limit: u32,

    #[arg(long, default_value_t = 90)]
    pub max_connections: u32,

    /// Work queue capacity, defaults to the worker count
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    #[arg(long, default_value_t = 118)]
    pub refresh_minutes: u64,

    /// Cursors containing this text end pagination; empty disables the check
    #[arg(long, default_value = "null")]
    pub invalid_cursor_pattern: String,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Keep state in memory instead of Postgres
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            workers: self.workers,
            rate_per_second: self.rate_per_second,
            queue_capacity: self.queue_capacity.unwrap_or(self.workers),
            page_limit: self.page_limit,
            invalid_cursor_pattern: Some(self.invalid_cursor_pattern.clone()).filter(|p| !p.is_empty()),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            refresh_interval_minutes: self.refresh_minutes,
            ..ClientConfig::default()
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
        }
    }

    /// The explicit `--input` file, else the latest file in `--input-dir`.
    pub fn resolve_input(&self) -> Result<PathBuf> {
        if let Some(path) = &self.input {
            return Ok(path.clone());
        }
        let Some(dir) = &self.input_dir else {
            return Err(IngestError::Configuration("either --input or --input-dir is required".to_string()));
        };
        latest_input_file(dir)?.ok_or_else(|| {
            IngestError::Configuration(format!("no dids_and_paths file found in {}", dir.display()))
        })
    }
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "username")]
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            IngestError::Configuration(format!("cannot open credentials file {}: {}", path.display(), e))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            IngestError::Configuration(format!("cannot decode credentials file {}: {}", path.display(), e))
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"***")
            .finish()
    }
}
