//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `product`: Cards and accounts
//! - `transaction`: Feed records, composite keys and enrichment payloads
//! - `error`: Error types for the sync engine

pub mod error;
pub mod product;
pub mod transaction;

pub use error::SyncError;
pub use product::{Product, ProductType};
pub use transaction::{
    AccountPage, AccountTransactionRecord, AdditionalInfo, Amount, Enrichment, ExtendedInfo,
    FlowDirection, TransactionDetail, TransactionKind, TransactionRecord, TxnKey,
};
