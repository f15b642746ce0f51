//! Derivative storage.
//!
//! One record per image, keyed `image:<identifier>`, holding one field per
//! resolution label:
//!
//! ```text
//! image:cat
//! ├── original  ──► AVIF bytes
//! ├── 32x32     ──► AVIF bytes
//! ├── 64x64     ──► AVIF bytes
//! ├── 128x128   ──► (same bytes as original)
//! └── ...
//! ```
//!
//! Records are only ever written whole. A reader sees either the previous set
//! or the new one for an identifier, never fields from both.
//!
//! # Components
//!
//! - [`DerivativeStore`]: Storage trait shared by the scheduler and the HTTP layer
//! - [`RedisStore`]: Redis hashes behind a `bb8` connection pool
//! - [`MemoryStore`]: In-process store for tests and local runs

mod memory;
mod redis;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::derive::DerivativeSet;
use crate::error::StoreError;
use crate::ladder::Label;

pub use memory::MemoryStore;
pub use redis::{RedisStore, DEFAULT_POOL_SIZE};

/// Prefix of every record key.
pub const RECORD_PREFIX: &str = "image:";

/// Store key of the record for `identifier`.
pub fn record_key(identifier: &str) -> String {
    format!("{}{}", RECORD_PREFIX, identifier)
}

// =============================================================================
// DerivativeStore Trait
// =============================================================================

/// Persistent mapping from image identifier to its derivative set.
#[async_trait]
pub trait DerivativeStore: Send + Sync {
    /// Replace the whole record for `identifier` with `set`.
    ///
    /// Either every field of `set` becomes visible at once or the record is
    /// left untouched.
    async fn put(&self, identifier: &str, set: &DerivativeSet) -> Result<(), StoreError>;

    /// Payload stored for an exact label, `None` if the record or field is absent.
    async fn get(&self, identifier: &str, label: Label) -> Result<Option<Bytes>, StoreError>;

    /// Labels present in the record, in ascending order. Empty if absent.
    async fn labels(&self, identifier: &str) -> Result<Vec<Label>, StoreError>;

    /// Every field of the record, read in one operation. Empty if absent.
    async fn record(&self, identifier: &str) -> Result<BTreeMap<Label, Bytes>, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
