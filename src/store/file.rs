use async_trait::async_trait;
use log::info;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use super::{ PersistedState, StateStore, StoreError };

/// One JSON document on disk, replaced whole on every save.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => PersistedState::from_json_str(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", self.path.display());
                Ok(PersistedState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
