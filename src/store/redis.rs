//! Redis-backed [`KeyedStore`] (feature `redis-store`).
//!
//! Records are stored as a single JSON envelope `{"v": <version>, "d": <data>}`
//! so that a value and its version travel together. Version bumps happen inside
//! small Lua scripts, which run atomically on the server and preserve any TTL
//! already stamped on the key (`SET ... KEEPTTL`). Counter keys bypass the
//! envelope entirely and use plain `INCRBY`.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};

use super::{CasOutcome, KeyedStore, StoreError, StoreResult, VersionedValue};

const PUT_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
local version = 1
if cur then
  local ok, obj = pcall(cjson.decode, cur)
  if ok and type(obj) == 'table' and obj.v then
    version = obj.v + 1
  end
end
redis.call('SET', KEYS[1], cjson.encode({v = version, d = ARGV[1]}), 'KEEPTTL')
return version
"#;

const CAS_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then return -1 end
local obj = cjson.decode(cur)
if obj.v ~= tonumber(ARGV[1]) then return -2 end
local next_version = obj.v + 1
redis.call('SET', KEYS[1], cjson.encode({v = next_version, d = ARGV[2]}), 'KEEPTTL')
return next_version
"#;

#[derive(Debug, Serialize, Deserialize)]
struct RedisRecord {
    v: u64,
    d: String,
}

/// Shared-nothing store client; safe to clone across workers. Each operation
/// rides the client's multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    put_script: Script,
    cas_script: Script,
}

impl RedisStore {
    /// Connect to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client =
            Client::open(redis_url).map_err(|e| StoreError::connection(e.to_string()))?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client, e.g. one shared with other subsystems.
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            put_script: Script::new(PUT_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        }
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn op_err(operation: &'static str) -> impl Fn(redis::RedisError) -> StoreError {
    move |e| StoreError::operation(operation, e.to_string())
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedValue>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key).await.map_err(op_err("get"))?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let record: RedisRecord = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::operation("get", format!("malformed record: {e}")))?;
                Ok(Some(VersionedValue {
                    value: record.d,
                    version: record.v,
                }))
            }
        }
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let version: i64 = self
            .put_script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(op_err("put"))?;
        Ok(version as u64)
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let record = RedisRecord {
            v: 1,
            d: value.to_string(),
        };
        let encoded = serde_json::to_string(&record)
            .map_err(|e| StoreError::operation("put_if_absent", e.to_string()))?;

        let mut conn = self.connection().await?;
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(encoded)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(op_err("put_if_absent"))?;
        Ok(created.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        value: &str,
    ) -> StoreResult<CasOutcome> {
        let mut conn = self.connection().await?;
        let result: i64 = self
            .cas_script
            .key(key)
            .arg(expected_version)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(op_err("compare_and_swap"))?;
        match result {
            -1 => Ok(CasOutcome::Missing),
            -2 => Ok(CasOutcome::Conflict),
            version => Ok(CasOutcome::Swapped(version as u64)),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        conn.incr(key, delta).await.map_err(|e| {
            if e.to_string().contains("not an integer") {
                StoreError::NotAnInteger {
                    key: key.to_string(),
                }
            } else {
                op_err("incr")(e)
            }
        })
    }

    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key).await.map_err(op_err("get_counter"))?;
        match raw {
            None => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                StoreError::NotAnInteger {
                    key: key.to_string(),
                }
            }),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let set: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(op_err("expire"))?;
        Ok(set == 1)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(keys).await.map_err(op_err("delete"))?;
        Ok(removed)
    }
}
