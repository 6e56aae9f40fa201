use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ PersistedState, StateStore, StoreError };

#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<PersistedState>,
}

impl MemoryStateStore {
    pub fn new(state: PersistedState) -> Self {
        Self { state: Mutex::new(state) }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.state.lock().await = state.clone();
        Ok(())
    }
}
