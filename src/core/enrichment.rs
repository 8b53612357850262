//! Bounded-concurrency enrichment of linked-account transactions
//!
//! This module provides `EnrichmentFetcher`, which resolves the extended
//! details of newly synced linked-account records through one detail lookup
//! per record and writes the results back in a single store transaction.
//!
//! # Design
//!
//! Lookups are spawned onto a `JoinSet` and gated by a semaphore, so at most
//! `concurrency` of them are in flight. Successful results accumulate in a
//! shared, mutex-guarded buffer.
//!
//! # Failure semantics
//!
//! The batch is all-or-nothing. The first failed lookup aborts every
//! outstanding task and the accumulated results are discarded, so no
//! record of the batch is marked as fetched. Unenriched records stay visible
//! to [`TransactionStore::records_needing_enrichment`] for a later retry.
//!
//! # Architecture
//!
//! ```text
//! EnrichmentFetcher
//!     ├── Arc<F: TransactionFeed>   (detail lookups)
//!     ├── Arc<S: TransactionStore>  (batch write-back)
//!     └── concurrency               (max lookups in flight)
//! ```

use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::traits::{TransactionFeed, TransactionStore};
use crate::types::{ExtendedInfo, SyncError, TxnKey};

/// Fetches and persists extended info for a batch of linked-account records
#[derive(Debug)]
pub struct EnrichmentFetcher<F, S> {
    feed: Arc<F>,
    store: Arc<S>,
    concurrency: usize,
}

impl<F, S> Clone for EnrichmentFetcher<F, S> {
    fn clone(&self) -> Self {
        Self {
            feed: Arc::clone(&self.feed),
            store: Arc::clone(&self.store),
            concurrency: self.concurrency,
        }
    }
}

impl<F, S> EnrichmentFetcher<F, S>
where
    F: TransactionFeed + 'static,
    S: TransactionStore + 'static,
{
    /// Create a new EnrichmentFetcher
    ///
    /// # Arguments
    ///
    /// * `feed` - Feed adapter used for detail lookups
    /// * `store` - Store the results are written to
    /// * `concurrency` - Maximum lookups in flight; 0 is treated as 1
    pub fn new(feed: Arc<F>, store: Arc<S>, concurrency: usize) -> Self {
        Self {
            feed,
            store,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Enrich one batch of linked-account records
    ///
    /// # Arguments
    ///
    /// * `product_id` - Product the records belong to
    /// * `keys` - Composite keys of the records to enrich
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Every lookup succeeded and `n` records were marked fetched
    /// * `Err(SyncError)` - A lookup or the write-back failed; nothing from
    ///   this batch was persisted
    pub async fn enrich(&self, product_id: &str, keys: Vec<TxnKey>) -> Result<usize, SyncError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let requested = keys.len();
        debug!(
            product = %product_id,
            records = requested,
            concurrency = self.concurrency,
            "Starting enrichment batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let results: Arc<Mutex<Vec<(TxnKey, ExtendedInfo)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(requested)));

        let mut tasks = JoinSet::new();
        for key in keys {
            let feed = Arc::clone(&self.feed);
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::detail_lookup(&key.id, &e.to_string()))?;

                let detail = feed
                    .fetch_transaction_detail(&key.id)
                    .await
                    .map_err(|e| match e {
                        SyncError::DetailLookup { .. } => e,
                        other => SyncError::detail_lookup(&key.id, &other.to_string()),
                    })?;
                let info = ExtendedInfo::from_detail(&key.id, detail)?;

                results.lock().await.push((key, info));
                Ok::<(), SyncError>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| SyncError::feed("transaction detail", &e.to_string()))
                .and_then(|result| result);

            if let Err(error) = outcome {
                tasks.abort_all();
                warn!(
                    product = %product_id,
                    records = requested,
                    error = %error,
                    "Enrichment batch aborted, nothing written"
                );
                return Err(error);
            }
        }

        let mut entries = std::mem::take(&mut *results.lock().await);
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let written = self.store.update_extended_info_batch(product_id, &entries)?;
        info!(product = %product_id, enriched = written, "Enrichment batch written");
        Ok(written)
    }
}
