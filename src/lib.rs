//! Transaction Sync Library
//! # Overview
//!
//! This library incrementally synchronizes transaction history from a remote
//! institution into a local SQLite store and reconciles the card feed with the
//! card's linked-account feed into one timeline.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (records, products, composite keys, errors)
//! - [`config`] - Engine configuration, loadable from TOML
//! - [`core`] - Business logic components:
//!   - [`core::traits`] - The feed adapter and store seams
//!   - [`core::transaction_store`] - SQLite-backed store
//!   - [`core::engine`] - Per-product sync orchestration
//!   - [`core::enrichment`] - Bounded-concurrency detail lookups
//!   - [`core::reconcile`] - Feed merge, sort and pagination
//!
//! # Feeds
//!
//! The engine consumes three feeds through [`TransactionFeed`]:
//!
//! - **Card feed**: unpaginated, one full fetch per card
//! - **Linked-account feed**: paginated by size, stops on a short page or a
//!   page of already-known records
//! - **Account feed**: paginated with an explicit continuation flag
//!
//! Card and linked-account records are identified by `(id, operation_date)`;
//! account records by `id` alone.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use txn_sync::{EngineConfig, Reconciler, SqliteTransactionStore, SyncEngine, TransactionFeed, ViewOptions};
//!
//! async fn run<F: TransactionFeed + 'static>(feed: F) -> Result<(), txn_sync::SyncError> {
//!     let config = EngineConfig::default();
//!     let store = Arc::new(SqliteTransactionStore::open(std::path::Path::new("txns.db"))?);
//!     let engine = SyncEngine::new(Arc::new(feed), Arc::clone(&store), config.sync.clone());
//!
//!     let summary = engine.sync_all().await?;
//!     for report in &summary.reports {
//!         let view = Reconciler::new(config.reconcile.clone())
//!             .combined_view(store.as_ref(), &report.product_id, ViewOptions::new(50, 0))?;
//!         println!("{}: {} transactions", report.product_id, view.total_count);
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod core;
pub mod types;

pub use config::{EngineConfig, ReconcileConfig, SyncConfig};
pub use core::{
    CombinedTransaction, CombinedView, EnrichmentFetcher, EnrichmentOutcome, ProductSyncReport,
    Reconciler, SqliteTransactionStore, SyncEngine, SyncSummary, TransactionFamily,
    TransactionFeed, TransactionSource, TransactionStore, ViewOptions,
};
pub use types::{
    AccountPage, AccountTransactionRecord, Amount, Enrichment, ExtendedInfo, FlowDirection,
    Product, ProductType, SyncError, TransactionDetail, TransactionKind, TransactionRecord,
    TxnKey,
};
