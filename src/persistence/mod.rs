use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{timeout, Duration};

use crate::error::BotError;
use crate::Result;

// Named keys of the persisted run state, scoped per trading pair.
pub const KEY_POSITIONS: &str = "positions";
pub const KEY_BALANCES: &str = "balances";
pub const KEY_CUMULATIVE_PROFIT: &str = "cumulative_profit";
pub const KEY_LAST_PRICE: &str = "last_price";
pub const KEY_START_TIME: &str = "start_time";

/// Durable key-value store for one trading pair's run state.
///
/// Values are JSON strings; a `put` must be durable before the caller's next
/// suspension point so a crash mid-tick never exposes a partial update.
#[async_trait]
pub trait StateStore: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;
    async fn put(&mut self, key: &str, value: String) -> Result<()>;
}

pub async fn read_json<S, T>(store: &mut S, key: &str) -> Result<Option<T>>
where
    S: StateStore,
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn write_json<S, T>(store: &mut S, key: &str, value: &T) -> Result<()>
where
    S: StateStore,
    T: Serialize + ?Sized,
{
    store.put(key, serde_json::to_string(value)?).await
}

/// Redis-backed store, one namespace per trading pair
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    /// Connect to Redis and scope all keys to `symbol`.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `symbol` - Trading pair the namespace is scoped to
    pub async fn connect(redis_url: &str, symbol: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| BotError::Store(e.to_string()))?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| BotError::Store("Redis connection timeout after 5 seconds".to_string()))?
            .map_err(|e| BotError::Store(e.to_string()))?;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            namespace: format!("spotbot:{}", symbol),
        })
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let key = self.scoped(key);
        self.conn
            .get(key)
            .await
            .map_err(|e| BotError::Store(e.to_string()))
    }

    async fn put(&mut self, key: &str, value: String) -> Result<()> {
        let key = self.scoped(key);
        self.conn
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| BotError::Store(e.to_string()))
    }
}

/// In-memory store for tests and dry runs. Clones share the same entries,
/// so a "restarted" session can reopen the store it wrote to.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: std::sync::Arc<std::sync::Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();

        assert_eq!(store.get(KEY_POSITIONS).await.unwrap(), None);

        store
            .put(KEY_CUMULATIVE_PROFIT, "12.5".to_string())
            .await
            .unwrap();
        assert_eq!(
            store.get(KEY_CUMULATIVE_PROFIT).await.unwrap(),
            Some("12.5".to_string())
        );
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let mut store = MemoryStore::new();

        write_json(&mut store, KEY_LAST_PRICE, &94.5f64).await.unwrap();
        let price: Option<f64> = read_json(&mut store, KEY_LAST_PRICE).await.unwrap();
        assert_eq!(price, Some(94.5));

        let missing: Option<f64> = read_json(&mut store, KEY_BALANCES).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_an_error() {
        let mut store = MemoryStore::new();
        store
            .put(KEY_LAST_PRICE, "not json {".to_string())
            .await
            .unwrap();

        let result: Result<Option<f64>> = read_json(&mut store, KEY_LAST_PRICE).await;
        assert!(matches!(result.unwrap_err(), BotError::Serialization(_)));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_redis_round_trip() {
        let mut store = RedisStore::connect("redis://127.0.0.1:6379", "TESTPAIR")
            .await
            .expect("Failed to connect to Redis");

        store
            .put(KEY_LAST_PRICE, "100.0".to_string())
            .await
            .unwrap();
        assert_eq!(
            store.get(KEY_LAST_PRICE).await.unwrap(),
            Some("100.0".to_string())
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_redis_namespaces_do_not_collide() {
        let mut store_a = RedisStore::connect("redis://127.0.0.1:6379", "PAIR_A")
            .await
            .expect("Failed to connect to Redis");
        let mut store_b = RedisStore::connect("redis://127.0.0.1:6379", "PAIR_B")
            .await
            .expect("Failed to connect to Redis");

        store_a.put(KEY_LAST_PRICE, "1.0".to_string()).await.unwrap();
        store_b.put(KEY_LAST_PRICE, "2.0".to_string()).await.unwrap();

        assert_eq!(
            store_a.get(KEY_LAST_PRICE).await.unwrap(),
            Some("1.0".to_string())
        );
        assert_eq!(
            store_b.get(KEY_LAST_PRICE).await.unwrap(),
            Some("2.0".to_string())
        );
    }

    #[tokio::test]
    #[ignore] // Requires network (verifies the timeout path)
    async fn test_connection_timeout() {
        let result = RedisStore::connect("redis://192.0.2.1:6379", "TESTPAIR").await;
        assert!(result.is_err());
    }
}
