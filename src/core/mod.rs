//! Core sync and reconciliation module
//!
//! This module contains the core components:
//! - `traits` - The feed adapter and store seams
//! - `transaction_store` - SQLite implementation of the store
//! - `pagination` - Known-key working set shared by the paginated feeds
//! - `engine` - Per-product sync orchestration
//! - `enrichment` - Bounded-concurrency detail lookups with batch write-back
//! - `reconcile` - Card / linked-account merge and the combined view

pub mod engine;
pub mod enrichment;
pub mod pagination;
pub mod reconcile;
pub mod traits;
pub mod transaction_store;

pub use engine::{EnrichmentOutcome, LinkedAccountSync, ProductSyncReport, SyncEngine, SyncSummary};
pub use enrichment::EnrichmentFetcher;
pub use pagination::{KnownKeys, PageScan};
pub use reconcile::{
    paginate, sort_by_operation_date, CombinedTransaction, CombinedView, Reconciler,
    TransactionSource,
};
pub use traits::{TransactionFamily, TransactionFeed, TransactionStore, ViewOptions};
pub use transaction_store::SqliteTransactionStore;
