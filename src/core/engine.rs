//! Sync orchestration
//!
//! This module provides the `SyncEngine` that drives the fetch, dedup and
//! insert loop for each product against the appropriate feeds, decides when
//! pagination stops, and hands newly discovered linked-account records to the
//! [`EnrichmentFetcher`].
//!
//! The engine enforces rules such as:
//! - A re-run against identical remote output inserts nothing
//! - Each page's new records are inserted as one all-or-nothing batch
//! - Paginated feeds stop on a short page, an empty page, or a page whose
//!   records were all known before it was fetched
//! - Products are synced one at a time and a failure in one product does not
//!   stop the others

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::enrichment::EnrichmentFetcher;
use super::pagination::KnownKeys;
use super::traits::{TransactionFamily, TransactionFeed, TransactionStore};
use crate::config::SyncConfig;
use crate::types::{
    AccountTransactionRecord, Product, ProductType, SyncError, TransactionRecord, TxnKey,
};

/// What happened to the enrichment step of a card sync
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Nothing to enrich (no linked account, or no candidate records)
    Skipped,
    /// All lookups succeeded; the number of records marked fetched
    Completed(usize),
    /// The batch was aborted and nothing was written
    Failed(String),
}

/// Result of syncing a single product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSyncReport {
    pub product_id: String,
    pub card_inserted: usize,
    pub linked_inserted: usize,
    pub account_inserted: usize,
    /// Pages requested from the paginated feeds
    pub pages_fetched: usize,
    pub enrichment: EnrichmentOutcome,
}

impl ProductSyncReport {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            card_inserted: 0,
            linked_inserted: 0,
            account_inserted: 0,
            pages_fetched: 0,
            enrichment: EnrichmentOutcome::Skipped,
        }
    }

    pub fn total_inserted(&self) -> usize {
        self.card_inserted + self.linked_inserted + self.account_inserted
    }
}

/// Result of walking the linked-account feed for one card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedAccountSync {
    /// Keys inserted by this run, in feed order
    pub inserted: Vec<TxnKey>,
    /// Rows the store reported as written
    pub rows_inserted: usize,
    pub pages_fetched: usize,
}

/// Result of a multi-product run
///
/// Failures are isolated per product and collected here rather than
/// aborting the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    pub reports: Vec<ProductSyncReport>,
    /// One [`SyncError::ProductSync`] per failed product
    pub failures: Vec<SyncError>,
}

impl SyncSummary {
    pub fn total_inserted(&self) -> usize {
        self.reports.iter().map(ProductSyncReport::total_inserted).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sync orchestrator
///
/// Coordinates the feed adapter, the store and the enrichment fetcher. Holds
/// no state between runs beyond what the store persists.
pub struct SyncEngine<F, S> {
    feed: Arc<F>,
    store: Arc<S>,
    config: SyncConfig,
    enrichment: EnrichmentFetcher<F, S>,
}

impl<F, S> SyncEngine<F, S>
where
    F: TransactionFeed + 'static,
    S: TransactionStore + 'static,
{
    /// Create a new SyncEngine
    ///
    /// # Arguments
    ///
    /// * `feed` - Feed adapter for the remote institution
    /// * `store` - Durable transaction store
    /// * `config` - Page size, enrichment fan-out and backfill policy
    pub fn new(feed: Arc<F>, store: Arc<S>, config: SyncConfig) -> Self {
        let enrichment = EnrichmentFetcher::new(
            Arc::clone(&feed),
            Arc::clone(&store),
            config.enrichment_concurrency,
        );
        Self {
            feed,
            store,
            config,
            enrichment,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Discover products, persist them, and sync each in turn
    ///
    /// # Returns
    ///
    /// * `Ok(SyncSummary)` - With per-product reports and isolated failures
    /// * `Err(SyncError)` - If product discovery or the product upsert failed,
    ///   in which case no product was synced
    pub async fn sync_all(&self) -> Result<SyncSummary, SyncError> {
        let products = self.feed.fetch_products().await?;
        self.store.upsert_products(&products)?;
        info!(products = products.len(), "Discovered products");

        let summary = self.sync_products(&products).await;
        info!(
            synced = summary.reports.len(),
            failed = summary.failures.len(),
            inserted = summary.total_inserted(),
            "Sync run finished"
        );
        Ok(summary)
    }

    /// Sync products sequentially, isolating failures per product
    pub async fn sync_products(&self, products: &[Product]) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for product in products {
            match self.sync_product(product).await {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    warn!(
                        product = %product.id,
                        product_type = %product.product_type,
                        error = %error,
                        "Product sync failed"
                    );
                    summary
                        .failures
                        .push(SyncError::product_sync(&product.id, error));
                }
            }
        }

        summary
    }

    /// Sync one product with the feeds its type calls for
    pub async fn sync_product(&self, product: &Product) -> Result<ProductSyncReport, SyncError> {
        match product.product_type {
            ProductType::Card => {
                let linked_account_id = product
                    .linked_account_id
                    .as_deref()
                    .filter(|id| !id.is_empty());
                self.sync_card(&product.id, linked_account_id).await
            }
            ProductType::Account => self.sync_account(&product.id).await,
        }
    }

    /// Sync the card feed and, when present, the linked-account feed
    ///
    /// The card feed is fetched in one call. New linked-account records are
    /// then enriched; with `backfill_enrichment` set, every record still
    /// missing extended info is enriched instead.
    ///
    /// # Errors
    ///
    /// Feed and store failures abort the product. Enrichment failures do not:
    /// they are reported in [`ProductSyncReport::enrichment`].
    pub async fn sync_card(
        &self,
        product_id: &str,
        linked_account_id: Option<&str>,
    ) -> Result<ProductSyncReport, SyncError> {
        let mut report = ProductSyncReport::new(product_id);

        let fetched = self.feed.fetch_card_transactions(product_id).await?;
        let fetched_count = fetched.len();
        let mut known = KnownKeys::new(
            self.store
                .existing_keys(TransactionFamily::Card, product_id)?,
        );
        let scan = known.scan(fetched, TransactionRecord::key);

        if !scan.new_records.is_empty() {
            report.card_inserted = self.store.insert_transactions(
                TransactionFamily::Card,
                product_id,
                &scan.new_records,
            )?;
        }
        if report.card_inserted > 0 {
            info!(
                product = %product_id,
                fetched = fetched_count,
                inserted = report.card_inserted,
                "Synced card transactions"
            );
        } else {
            debug!(product = %product_id, fetched = fetched_count, "Card transactions up to date");
        }

        let Some(account_id) = linked_account_id else {
            return Ok(report);
        };

        let linked = self.sync_linked_account(product_id, account_id).await?;
        report.linked_inserted = linked.rows_inserted;
        report.pages_fetched = linked.pages_fetched;

        let candidates = if self.config.backfill_enrichment {
            match self.store.records_needing_enrichment(product_id) {
                Ok(keys) => keys,
                Err(error) => {
                    warn!(product = %product_id, error = %error, "Needs-enrichment scan failed");
                    report.enrichment = EnrichmentOutcome::Failed(error.to_string());
                    return Ok(report);
                }
            }
        } else {
            linked.inserted
        };
        report.enrichment = self.run_enrichment(product_id, candidates).await;

        Ok(report)
    }

    /// Walk the linked-account feed until it is exhausted or caught up
    ///
    /// Records are stored under `product_id` (the card), the feed is
    /// addressed by `account_id`.
    ///
    /// # Returns
    ///
    /// The keys inserted by this run and the number of pages requested.
    pub async fn sync_linked_account(
        &self,
        product_id: &str,
        account_id: &str,
    ) -> Result<LinkedAccountSync, SyncError> {
        let page_size = self.config.page_size;
        let mut known = KnownKeys::new(
            self.store
                .existing_keys(TransactionFamily::LinkedAccount, product_id)?,
        );
        let mut result = LinkedAccountSync::default();
        let mut page_index = 0;

        loop {
            let page = self
                .feed
                .fetch_linked_account_page(account_id, page_size, page_index)
                .await?;
            result.pages_fetched += 1;

            let scan = known.scan(page, TransactionRecord::key);
            let more = scan.should_continue(page_size);
            debug!(
                product = %product_id,
                page = page_index,
                records = scan.page_len,
                new = scan.new_records.len(),
                all_known = scan.all_known,
                "Fetched linked account page"
            );

            if !scan.new_records.is_empty() {
                result.rows_inserted += self.store.insert_transactions(
                    TransactionFamily::LinkedAccount,
                    product_id,
                    &scan.new_records,
                )?;
                result
                    .inserted
                    .extend(scan.new_records.iter().map(TransactionRecord::key));
            }

            if !more {
                break;
            }
            page_index += 1;
        }

        if result.rows_inserted > 0 {
            info!(
                product = %product_id,
                pages = result.pages_fetched,
                inserted = result.rows_inserted,
                "Synced linked account transactions"
            );
        } else {
            debug!(
                product = %product_id,
                pages = result.pages_fetched,
                "Linked account transactions up to date"
            );
        }
        Ok(result)
    }

    /// Walk the account-history feed until `has_next` is false or caught up
    pub async fn sync_account(&self, product_id: &str) -> Result<ProductSyncReport, SyncError> {
        let page_size = self.config.page_size;
        let mut report = ProductSyncReport::new(product_id);
        let mut known = KnownKeys::new(self.store.existing_account_ids(product_id)?);
        let mut page_index = 0;

        loop {
            let page = self
                .feed
                .fetch_account_page(product_id, page_size, page_index)
                .await?;
            report.pages_fetched += 1;

            let has_next = page.has_next;
            let scan = known.scan(page.transactions, |r: &AccountTransactionRecord| {
                r.id.clone()
            });
            debug!(
                product = %product_id,
                page = page_index,
                records = scan.page_len,
                new = scan.new_records.len(),
                has_next,
                "Fetched account page"
            );

            if !scan.new_records.is_empty() {
                report.account_inserted += self
                    .store
                    .insert_account_transactions(product_id, &scan.new_records)?;
            }

            if !has_next || scan.page_len == 0 || scan.all_known {
                break;
            }
            page_index += 1;
        }

        if report.account_inserted > 0 {
            info!(
                product = %product_id,
                pages = report.pages_fetched,
                inserted = report.account_inserted,
                "Synced account transactions"
            );
        } else {
            debug!(
                product = %product_id,
                pages = report.pages_fetched,
                "Account transactions up to date"
            );
        }
        Ok(report)
    }

    /// Enrich every linked-account record of a product still missing details
    ///
    /// # Returns
    ///
    /// The number of records enriched, or the error that aborted the batch.
    pub async fn enrich_pending(&self, product_id: &str) -> Result<usize, SyncError> {
        let pending = self.store.records_needing_enrichment(product_id)?;
        if pending.is_empty() {
            debug!(product = %product_id, "No records need enrichment");
            return Ok(0);
        }
        self.enrichment.enrich(product_id, pending).await
    }

    async fn run_enrichment(&self, product_id: &str, keys: Vec<TxnKey>) -> EnrichmentOutcome {
        if keys.is_empty() {
            return EnrichmentOutcome::Skipped;
        }

        match self.enrichment.enrich(product_id, keys).await {
            Ok(written) => EnrichmentOutcome::Completed(written),
            Err(error) => {
                warn!(
                    product = %product_id,
                    error = %error,
                    "Enrichment failed, records left for retry"
                );
                EnrichmentOutcome::Failed(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_totals() {
        let mut report = ProductSyncReport::new("card1");
        report.card_inserted = 2;
        report.linked_inserted = 3;
        assert_eq!(report.total_inserted(), 5);
        assert_eq!(report.enrichment, EnrichmentOutcome::Skipped);

        let summary = SyncSummary {
            reports: vec![report, ProductSyncReport::new("acc1")],
            failures: Vec::new(),
        };
        assert_eq!(summary.total_inserted(), 5);
        assert!(summary.is_success());
    }

    #[test]
    fn test_summary_with_failure_is_not_success() {
        let summary = SyncSummary {
            reports: Vec::new(),
            failures: vec![SyncError::product_sync(
                "card1",
                SyncError::feed("card transactions", "timeout"),
            )],
        };
        assert!(!summary.is_success());
    }
}
