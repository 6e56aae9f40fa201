use async_trait::async_trait;
use log::{ debug, info };
use redis::{ AsyncCommands, Client };

use super::{ PersistedState, StateStore, StoreError };

/// The whole state document as one JSON string under a single key.
pub struct RedisStateStore {
    client: Client,
    key: String,
}

impl RedisStateStore {
    pub fn new(url: &str, key: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            key: key.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self) -> Result<PersistedState, StoreError> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn.get(&self.key).await?;
        match raw {
            Some(raw) => PersistedState::from_json_str(&raw),
            None => {
                info!("No state under redis key {}, starting empty", self.key);
                Ok(PersistedState::default())
            }
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(state)?;
        debug!("Saving {} bytes of state to redis key {}", json.len(), self.key);
        let _: () = conn.set(&self.key, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(RedisStateStore::new("not a url", "k"), Err(StoreError::Redis(_))));
    }
}
