//! Redis store provider.
//!
//! Ordering indexes are Redis sorted sets and values are Redis strings.
//! Atomic batches are sent as `MULTI`/`EXEC` pipelines over one shared
//! multiplexed connection; `flush_all` is scoped to the selected database.

use crate::error::StoreError;
use crate::provider::{ProviderType, RedisConfig};
use crate::store::{BatchOp, Reply, Score, Store};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue};
use tracing::{debug, info};

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;

/// Redis store provider implementation
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server described by `config`
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let client = redis::Client::open(config.connection_info())?;
        let connection = ConnectionManager::new(client).await?;

        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            "Connected to Redis"
        );

        Ok(Self { connection })
    }

    fn connection(&self) -> ConnectionManager {
        // ConnectionManager clones share one multiplexed connection
        self.connection.clone()
    }
}

/// Append one batch sub-command to a pipeline
fn push_command(pipe: &mut redis::Pipeline, op: &BatchOp) {
    match op {
        BatchOp::OrderedInsert { key, score, member } => {
            pipe.cmd("ZADD").arg(key).arg("NX").arg(*score).arg(member);
        }
        BatchOp::OrderedRemove { key, member } => {
            pipe.cmd("ZREM").arg(key).arg(member);
        }
        BatchOp::ValueSet { key, value } => {
            pipe.cmd("SET").arg(key).arg(value);
        }
        BatchOp::ValueDelete { keys } => {
            pipe.cmd("DEL").arg(keys);
        }
    }
}

/// Convert the raw reply of one sub-command according to its kind
fn convert_reply(op: &BatchOp, value: &redis::Value) -> Result<Reply, StoreError> {
    match op {
        BatchOp::ValueSet { .. } => Ok(Reply::Status(String::from_redis_value(value)?)),
        _ => Ok(Reply::Integer(i64::from_redis_value(value)?)),
    }
}

fn convert_replies(ops: &[BatchOp], values: &[redis::Value]) -> Result<Vec<Reply>, StoreError> {
    if ops.len() != values.len() {
        return Err(StoreError::CommandFailed {
            code: "EXECABORT".to_string(),
            message: format!(
                "expected {} replies from transaction, received {}",
                ops.len(),
                values.len()
            ),
        });
    }

    ops.iter()
        .zip(values)
        .map(|(op, value)| convert_reply(op, value))
        .collect()
}

#[async_trait]
impl Store for RedisStore {
    async fn ordered_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<i64, StoreError> {
        let added: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score)
            .arg(member)
            .query_async(&mut self.connection())
            .await?;
        Ok(added)
    }

    async fn ordered_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<String>, StoreError> {
        let members: Vec<String> = self
            .connection()
            .zrange(key, start as isize, end as isize)
            .await?;
        Ok(members)
    }

    async fn ordered_cardinality(&self, key: &str) -> Result<u64, StoreError> {
        let count: u64 = self.connection().zcard(key).await?;
        Ok(count)
    }

    async fn ordered_remove(&self, key: &str, member: &str) -> Result<i64, StoreError> {
        let removed: i64 = self.connection().zrem(key, member).await?;
        Ok(removed)
    }

    async fn value_set(&self, key: &str, value: &str) -> Result<Reply, StoreError> {
        let status: String = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.connection())
            .await?;
        Ok(Reply::Status(status))
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self.connection().get(key).await?;
        Ok(value)
    }

    async fn value_multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.connection())
            .await?;
        Ok(values)
    }

    async fn value_delete(&self, keys: &[String]) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: i64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut self.connection())
            .await?;
        Ok(deleted)
    }

    async fn execute_atomic(&self, ops: Vec<BatchOp>) -> Result<Vec<Reply>, StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            push_command(&mut pipe, op);
        }

        let values: Vec<redis::Value> = pipe.query_async(&mut self.connection()).await?;

        debug!(
            commands = ops.len(),
            keys = ?ops.iter().flat_map(BatchOp::keys).collect::<Vec<_>>(),
            "Executed atomic batch"
        );

        convert_replies(&ops, &values)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut self.connection())
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.connection())
            .await?;
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Redis
    }
}
