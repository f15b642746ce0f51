//! In-process derivative store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::derive::DerivativeSet;
use crate::error::StoreError;
use crate::ladder::Label;

use super::DerivativeStore;

type Record = BTreeMap<Label, Bytes>;

/// [`DerivativeStore`] held in memory.
///
/// Records are swapped under a write lock, giving the same whole-record
/// visibility as the Redis transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Stored identifiers in ascending order.
    pub async fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.records.read().await.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Copy of every record, for comparing store contents across operations.
    pub async fn snapshot(&self) -> BTreeMap<String, Record> {
        self.records
            .read()
            .await
            .iter()
            .map(|(identifier, record)| (identifier.clone(), record.clone()))
            .collect()
    }
}

#[async_trait]
impl DerivativeStore for MemoryStore {
    async fn put(&self, identifier: &str, set: &DerivativeSet) -> Result<(), StoreError> {
        let record: Record = set
            .iter()
            .map(|(label, payload)| (*label, payload.clone()))
            .collect();

        self.records
            .write()
            .await
            .insert(identifier.to_string(), record);

        Ok(())
    }

    async fn get(&self, identifier: &str, label: Label) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(identifier)
            .and_then(|record| record.get(&label))
            .cloned())
    }

    async fn labels(&self, identifier: &str) -> Result<Vec<Label>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(identifier)
            .map(|record| record.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn record(&self, identifier: &str) -> Result<Record, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(identifier)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
