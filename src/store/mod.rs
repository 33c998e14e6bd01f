mod file;
mod memory;
mod sqlite;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use async_trait::async_trait;
use log::info;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::{ ConfigError, ServeArgs };

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Single-record persistence for the simulation state. `put` replaces the
/// whole document; concurrent writers resolve as last-write-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self) -> Result<Option<Value>, StoreError>;

    async fn put(&self, state: &Value) -> Result<(), StoreError>;

    fn describe(&self) -> String;
}

pub fn create_state_store(args: &ServeArgs) -> Result<Arc<dyn StateStore>, ConfigError> {
    match args.state_backend.to_lowercase().as_str() {
        "file" => Ok(Arc::new(FileStateStore::new(&args.state_path))),
        "sqlite" => {
            let store = SqliteStateStore::open(&args.sqlite_path).map_err(|e| {
                ConfigError::StoreUnavailable(format!("{}: {}", args.sqlite_path, e))
            })?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryStateStore::default())),
        other => Err(ConfigError::UnsupportedBackend(other.to_string())),
    }
}

pub fn initialize_state_store(args: &ServeArgs) -> Result<Arc<dyn StateStore>, ConfigError> {
    let store = create_state_store(args)?;
    info!("Simulation state will be stored in: {}", store.describe());
    Ok(store)
}
