//! Redis key-value adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, KvError, KvStats, KvStore, PushDirection, StoredValue,
};

/// Configuration for the Redis adapter.
#[derive(Debug, Clone)]
pub struct RedisKvConfig {
    /// Per-command timeout.
    pub command_timeout: Duration,
    /// Extra attempts for idempotent reads. Writes never retry.
    pub read_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RedisKvConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            read_retries: 2,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Redis-backed [`KvStore`] over a shared connection manager.
pub struct RedisKvStore {
    conn: ConnectionManager,
    config: RedisKvConfig,
}

impl RedisKvStore {
    /// Connect with custom configuration.
    pub async fn connect(url: &str, config: RedisKvConfig) -> Result<Self, AppError> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Kv(KvError::Connection(e.to_string())))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::Kv(KvError::Connection(e.to_string())))?;
        info!("Connected to Redis");
        Ok(Self { conn, config })
    }

    /// Connect with default configuration.
    pub async fn with_defaults(url: &str) -> Result<Self, AppError> {
        Self::connect(url, RedisKvConfig::default()).await
    }

    /// Execute a single command under the configured timeout.
    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, AppError> {
        let mut conn = self.conn.clone();
        let call = cmd.query_async(&mut conn);
        match tokio::time::timeout(self.config.command_timeout, call).await {
            Ok(result) => {
                let value: T = result.map_err(AppError::from)?;
                Ok(value)
            }
            Err(_) => Err(AppError::Kv(KvError::Timeout(format!(
                "command exceeded {:?}",
                self.config.command_timeout
            )))),
        }
    }

    /// Execute an idempotent read, retrying with a fixed delay.
    async fn query_with_retry<T: redis::FromRedisValue>(
        &self,
        cmd: &redis::Cmd,
    ) -> Result<T, AppError> {
        let mut last_error = None;
        for attempt in 0..=self.config.read_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.query::<T>(cmd).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt = attempt, error = ?e, "Redis read failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::Kv(KvError::Command("Unknown error".to_string()))))
    }

    fn serialize(value: &serde_json::Value) -> Result<String, AppError> {
        serde_json::to_string(value).map_err(AppError::from)
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let pong: String = self.query(&redis::cmd("PING")).await?;
        if pong != "PONG" {
            return Err(AppError::Kv(KvError::Connection(format!(
                "unexpected ping reply: {pong}"
            ))));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, AppError> {
        let raw: Option<String> = self
            .query_with_retry(redis::cmd("GET").arg(key))
            .await?;
        Ok(raw.map(StoredValue::from_wire))
    }

    #[instrument(skip(self, value))]
    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Option<u64>,
    ) -> Result<(), AppError> {
        let serialized = Self::serialize(value)?;
        match ttl {
            Some(seconds) => {
                self.query::<()>(redis::cmd("SETEX").arg(key).arg(seconds).arg(serialized))
                    .await
            }
            None => self.query::<()>(redis::cmd("SET").arg(key).arg(serialized)).await,
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, value))]
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<(), AppError> {
        let serialized = Self::serialize(value)?;
        self.query::<i64>(redis::cmd("HSET").arg(key).arg(field).arg(serialized))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<StoredValue>, AppError> {
        let raw: Option<String> = self
            .query_with_retry(redis::cmd("HGET").arg(key).arg(field))
            .await?;
        Ok(raw.map(StoredValue::from_wire))
    }

    #[instrument(skip(self))]
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, StoredValue>, AppError> {
        let raw: HashMap<String, String> = self
            .query_with_retry(redis::cmd("HGETALL").arg(key))
            .await?;
        Ok(raw
            .into_iter()
            .map(|(field, value)| (field, StoredValue::from_wire(value)))
            .collect())
    }

    #[instrument(skip(self, values))]
    async fn list_push(
        &self,
        key: &str,
        values: &[serde_json::Value],
        direction: PushDirection,
    ) -> Result<i64, AppError> {
        let serialized = values
            .iter()
            .map(Self::serialize)
            .collect::<Result<Vec<_>, _>>()?;
        let command = match direction {
            PushDirection::Left => "LPUSH",
            PushDirection::Right => "RPUSH",
        };
        self.query(redis::cmd(command).arg(key).arg(serialized)).await
    }

    #[instrument(skip(self))]
    async fn list_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<StoredValue>, AppError> {
        let raw: Vec<String> = self
            .query_with_retry(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
            .await?;
        Ok(raw.into_iter().map(StoredValue::from_wire).collect())
    }

    #[instrument(skip(self, members))]
    async fn set_add(
        &self,
        key: &str,
        members: &[serde_json::Value],
    ) -> Result<i64, AppError> {
        let serialized = members
            .iter()
            .map(Self::serialize)
            .collect::<Result<Vec<_>, _>>()?;
        self.query(redis::cmd("SADD").arg(key).arg(serialized)).await
    }

    #[instrument(skip(self))]
    async fn set_members(&self, key: &str) -> Result<Vec<StoredValue>, AppError> {
        let raw: Vec<String> = self
            .query_with_retry(redis::cmd("SMEMBERS").arg(key))
            .await?;
        Ok(raw.into_iter().map(StoredValue::from_wire).collect())
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<KvStats, AppError> {
        let db_size: i64 = self.query_with_retry(&redis::cmd("DBSIZE")).await?;
        let info_raw: String = self.query_with_retry(&redis::cmd("INFO")).await?;

        let info = info_raw
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| {
                line.split_once(':')
                    .map(|(k, v)| (k.to_string(), v.trim_end_matches('\r').to_string()))
            })
            .collect();

        Ok(KvStats { db_size, info })
    }
}
