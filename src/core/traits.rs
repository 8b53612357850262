//! Core traits for the remote feeds and the local transaction store
//!
//! These are the two seams of the engine: the feed adapter is consumed (its
//! transport, authentication and base URLs live outside this crate) and the
//! store is implemented by [`crate::core::SqliteTransactionStore`]. Tests
//! substitute either side.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::types::{
    AccountPage, AccountTransactionRecord, ExtendedInfo, Product, SyncError, TransactionDetail,
    TransactionRecord, TxnKey,
};

/// Which of the two identically-shaped transaction families a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionFamily {
    /// Records from the (unpaginated) card feed
    Card,
    /// Records from the card's linked-account event feed
    LinkedAccount,
}

impl TransactionFamily {
    pub fn table(&self) -> &'static str {
        match self {
            TransactionFamily::Card => "card_transactions",
            TransactionFamily::LinkedAccount => "linked_account_transactions",
        }
    }
}

/// Paging, ordering and extended-info options for a read
///
/// Used both by per-family store listings and by the combined view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Records per page; 0 returns everything
    pub page_size: usize,
    /// Zero-based page index
    pub page: usize,
    pub include_extended: bool,
    pub ascending: bool,
}

impl ViewOptions {
    pub fn new(page_size: usize, page: usize) -> Self {
        Self {
            page_size,
            page,
            ..Default::default()
        }
    }

    pub fn with_extended(mut self, include_extended: bool) -> Self {
        self.include_extended = include_extended;
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }
}

/// Remote read operations the sync engine consumes
///
/// Implementations are expected to hold a valid credential and refresh it
/// transparently. None of these calls carry an explicit timeout at this
/// layer.
#[async_trait]
pub trait TransactionFeed: Send + Sync {
    /// List the cards and accounts available to the current user
    async fn fetch_products(&self) -> Result<Vec<Product>, SyncError>;

    /// Fetch the full card feed for a card (unpaginated)
    async fn fetch_card_transactions(
        &self,
        product_id: &str,
    ) -> Result<Vec<TransactionRecord>, SyncError>;

    /// Fetch one page of the linked-account event feed
    async fn fetch_linked_account_page(
        &self,
        account_id: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<Vec<TransactionRecord>, SyncError>;

    /// Fetch one page of account history
    async fn fetch_account_page(
        &self,
        account_id: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<AccountPage, SyncError>;

    /// Look up the details of a single linked-account transaction
    async fn fetch_transaction_detail(&self, id: &str) -> Result<TransactionDetail, SyncError>;
}

/// Durable keyed storage for products and the three transaction families
///
/// Every call that writes more than one row runs in a single transaction:
/// either all rows are written or none are.
pub trait TransactionStore: Send + Sync {
    /// Insert or refresh product metadata
    fn upsert_products(&self, products: &[Product]) -> Result<(), SyncError>;

    /// All known products in the order they were last reported
    fn products(&self) -> Result<Vec<Product>, SyncError>;

    /// Composite keys already stored for a product
    fn existing_keys(
        &self,
        family: TransactionFamily,
        product_id: &str,
    ) -> Result<HashSet<TxnKey>, SyncError>;

    /// Account-history ids already stored for a product
    fn existing_account_ids(&self, product_id: &str) -> Result<HashSet<String>, SyncError>;

    /// Insert records whose key is not yet stored; returns the number inserted
    fn insert_transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
        records: &[TransactionRecord],
    ) -> Result<usize, SyncError>;

    /// Insert account-history records whose id is not yet stored
    fn insert_account_transactions(
        &self,
        product_id: &str,
        records: &[AccountTransactionRecord],
    ) -> Result<usize, SyncError>;

    /// Attach extended info to one linked-account record and mark it fetched
    fn update_extended_info(
        &self,
        product_id: &str,
        key: &TxnKey,
        info: &ExtendedInfo,
    ) -> Result<(), SyncError>;

    /// Attach extended info to many records in one transaction
    fn update_extended_info_batch(
        &self,
        product_id: &str,
        entries: &[(TxnKey, ExtendedInfo)],
    ) -> Result<usize, SyncError>;

    /// Keys of linked-account records never marked as fetched
    fn records_needing_enrichment(&self, product_id: &str) -> Result<Vec<TxnKey>, SyncError>;

    /// One page of a family's records for a product, ordered by operation date
    ///
    /// Descending unless `options.ascending` is set, ties broken by id. A
    /// `page_size` of 0 returns every record. Extended info is loaded only
    /// when `options.include_extended` is set; otherwise every record reports
    /// [`crate::types::Enrichment::NotFetched`].
    fn transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
        options: ViewOptions,
    ) -> Result<Vec<TransactionRecord>, SyncError>;

    /// All account-history records for a product ordered by transaction date
    fn account_transactions(
        &self,
        product_id: &str,
        ascending: bool,
    ) -> Result<Vec<AccountTransactionRecord>, SyncError>;

    fn count_transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
    ) -> Result<usize, SyncError>;

    fn count_account_transactions(&self, product_id: &str) -> Result<usize, SyncError>;
}
