use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::error::Result;

/// Key/value store shared by the ingestion writer and the read API.
#[async_trait]
pub trait HotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes every entry with the same expiry. Whether a concurrent reader can
    /// observe a partly applied batch depends on the implementation.
    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> Result<()>;
}

// =================================================================
// Redis
// =================================================================

pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("Connected to Redis at {redis_url}");
        Ok(Self { conn })
    }
}

#[async_trait]
impl HotCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// `MULTI`/`EXEC`: readers see either all of the old values or all of the new ones.
    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set_ex(key, value, ttl_secs.max(1)).ignore();
        }
        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        debug!(keys = entries.len(), ttl_secs, "Cache entries written");
        Ok(())
    }
}

// =================================================================
// In-memory
// =================================================================

/// DashMap-backed cache honouring expiry; used in tests and local runs without Redis.
/// Entries of one batch share an expiry but are inserted key by key, so a reader
/// racing `set_many` may see a mix of old and new values.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HotCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.1 => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        for (key, value) in entries {
            self.entries.insert(key.clone(), (value.clone(), expires_at));
        }
        Ok(())
    }
}
