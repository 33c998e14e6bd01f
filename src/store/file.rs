use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use tokio::fs;
use uuid::Uuid;

use super::{ StateStore, StoreError };

/// Keeps the state as a pretty-printed JSON file. Writes go to a sibling
/// temp file which is then renamed over the target, so readers see either
/// the old document or the new one.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "memory.json".to_string());
        self.path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => {
                return Err(e.into());
            }
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn put(&self, state: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        if let Err(e) = fs::write(&tmp, body.as_bytes()).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote {} bytes of state to {}", body.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file at {}", self.path.display())
    }
}
