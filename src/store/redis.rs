//! Redis-backed derivative store.
//!
//! Each image is one Redis hash. Payloads are stored as standard base64 text,
//! matching records already written by existing deployments.
//!
//! A record is replaced with a `MULTI`/`EXEC` transaction that deletes the
//! key and writes every field in a single `HSET`, so labels dropped from the
//! ladder never linger next to fresh ones.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bb8_redis::redis::{self, AsyncCommands};
use bb8_redis::{bb8, RedisConnectionManager};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::derive::DerivativeSet;
use crate::error::StoreError;
use crate::ladder::Label;

use super::{record_key, DerivativeStore};

/// Connection pool size used when none is configured.
pub const DEFAULT_POOL_SIZE: u32 = 16;

/// How long an operation waits for a pooled connection.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

type Pool = bb8::Pool<RedisConnectionManager>;
type Connection<'a> = bb8::PooledConnection<'a, RedisConnectionManager>;

/// [`DerivativeStore`] over Redis hashes.
///
/// Cloning is cheap and shares the underlying pool.
///
/// # Example
///
/// ```ignore
/// use image_ladder::store::{DerivativeStore, RedisStore};
///
/// let store = RedisStore::new("redis://127.0.0.1:6379", 16)?;
/// store.ping().await?;
/// ```
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Create a store with a lazily connecting pool of `pool_size` connections.
    ///
    /// No connection is attempted here; an unreachable server shows up on the
    /// first operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if `url` is not a valid Redis URL.
    pub fn new(url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let manager =
            RedisConnectionManager::new(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = bb8::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build_unchecked(manager);

        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection<'_>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl DerivativeStore for RedisStore {
    async fn put(&self, identifier: &str, set: &DerivativeSet) -> Result<(), StoreError> {
        let key = record_key(identifier);
        let fields: Vec<(String, String)> = set
            .iter()
            .map(|(label, payload)| (label.to_string(), encode_payload(payload)))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, &fields)
            .ignore();

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        debug!(key = %key, fields = fields.len(), "Replaced derivative record");
        Ok(())
    }

    async fn get(&self, identifier: &str, label: Label) -> Result<Option<Bytes>, StoreError> {
        let key = record_key(identifier);
        let field = label.to_string();

        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .hget(&key, &field)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        value
            .map(|text| decode_payload(&key, &field, &text))
            .transpose()
    }

    async fn labels(&self, identifier: &str) -> Result<Vec<Label>, StoreError> {
        let key = record_key(identifier);

        let mut conn = self.connection().await?;
        let fields: Vec<String> = conn
            .hkeys(&key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        let mut labels: Vec<Label> = fields
            .iter()
            .filter_map(|field| match field.parse() {
                Ok(label) => Some(label),
                Err(e) => {
                    warn!(key = %key, field = %field, error = %e, "Ignoring unknown record field");
                    None
                }
            })
            .collect();
        labels.sort();

        Ok(labels)
    }

    async fn record(&self, identifier: &str) -> Result<BTreeMap<Label, Bytes>, StoreError> {
        let key = record_key(identifier);

        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        let mut record = BTreeMap::new();
        for (field, text) in &fields {
            match field.parse::<Label>() {
                Ok(label) => {
                    record.insert(label, decode_payload(&key, field, text)?);
                }
                Err(e) => {
                    warn!(key = %key, field = %field, error = %e, "Ignoring unknown record field");
                }
            }
        }

        Ok(record)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        Ok(())
    }
}

fn encode_payload(payload: &[u8]) -> String {
    STANDARD.encode(payload)
}

fn decode_payload(key: &str, field: &str, text: &str) -> Result<Bytes, StoreError> {
    STANDARD
        .decode(text)
        .map(Bytes::from)
        .map_err(|e| StoreError::Payload {
            key: key.to_string(),
            field: field.to_string(),
            message: e.to_string(),
        })
}

// =============================================================================
// Tests
// =============================================================================
