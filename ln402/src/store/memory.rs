use std::future;
use std::sync::Arc;

use dashmap::DashMap;

use super::{RecordStore, StoreError};
use crate::BoxFuture;
use crate::metadata::InvoiceMetadata;
use crate::preimage::PaymentHash;

/// In-memory record store backed by `DashMap`. Fast but lost on restart.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<PaymentHash, InvoiceMetadata>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no invoice has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn put<'a>(
        &'a self,
        key: &'a PaymentHash,
        value: &'a InvoiceMetadata,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        self.records.insert(*key, value.clone());
        Box::pin(future::ready(Ok(())))
    }

    fn get<'a>(
        &'a self,
        key: &'a PaymentHash,
    ) -> BoxFuture<'a, Result<Option<InvoiceMetadata>, StoreError>> {
        let record = self.records.get(key).map(|r| r.value().clone());
        Box::pin(future::ready(Ok(record)))
    }

    fn mark_used<'a>(&'a self, key: &'a PaymentHash) -> BoxFuture<'a, Result<bool, StoreError>> {
        // The shard write lock held by `get_mut` makes check-and-set atomic.
        let claimed = match self.records.get_mut(key) {
            Some(mut record) if !record.used => {
                record.used = true;
                true
            }
            _ => false,
        };
        Box::pin(future::ready(Ok(claimed)))
    }
}
