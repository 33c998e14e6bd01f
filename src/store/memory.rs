use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ StateStore, StoreError };

/// Process-local store. Contents vanish on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<Value>>,
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.state.read().await.clone())
    }

    async fn put(&self, state: &Value) -> Result<(), StoreError> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory (not persisted)".to_string()
    }
}
