//! Error types for the sync engine
//!
//! This module defines all error types that can occur while synchronizing and
//! reconciling transaction history. Errors carry the operation and identifiers
//! needed to report a failure with product context.
//!
//! # Error Categories
//!
//! - **Feed Errors**: a remote read or detail lookup failed
//! - **Store Errors**: a statement or transaction against the local store failed
//! - **Data Errors**: unknown product types, unencodable detail payloads
//! - **Configuration Errors**: malformed or unreadable configuration

use thiserror::Error;

/// Main error type for the sync engine
///
/// Variants hold owned strings rather than source errors so that the type
/// stays `Clone + PartialEq` and can be collected into per-product reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// A feed adapter call failed
    ///
    /// Aborts the current product's sync; other products are unaffected.
    #[error("Feed request '{operation}' failed: {message}")]
    Feed {
        /// Feed operation that failed (e.g. "linked account page 3")
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// A store statement or transaction failed
    ///
    /// Insert batches are all-or-nothing, so nothing from the failing batch
    /// is persisted.
    #[error("Store error during {operation}: {message}")]
    Store {
        /// Store operation that failed
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// A detail lookup for one transaction failed
    ///
    /// Aborts the enrichment batch it belongs to.
    #[error("Detail lookup failed for transaction {id}: {message}")]
    DetailLookup {
        /// Transaction id whose lookup failed
        id: String,
        /// Description of the failure
        message: String,
    },

    /// A detail payload could not be serialized for persistence
    #[error("Failed to encode details for transaction {id}: {message}")]
    Encode {
        /// Transaction id whose payload failed to encode
        id: String,
        /// Description of the failure
        message: String,
    },

    /// Unknown product type string
    #[error("Invalid product type '{value}'")]
    InvalidProductType {
        /// The unrecognized value
        value: String,
    },

    /// Configuration could not be read or parsed
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem
        message: String,
    },

    /// Failure of a single product's sync, reported at the run boundary
    #[error("Sync of product {product} failed: {source}")]
    ProductSync {
        /// Product whose sync failed
        product: String,
        /// Underlying failure
        source: Box<SyncError>,
    },
}

// Helper functions for creating common errors

impl SyncError {
    /// Create a Feed error
    pub fn feed(operation: &str, message: &str) -> Self {
        SyncError::Feed {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Store error from any displayable cause
    pub fn store(operation: &str, cause: impl std::fmt::Display) -> Self {
        SyncError::Store {
            operation: operation.to_string(),
            message: cause.to_string(),
        }
    }

    /// Create a DetailLookup error
    pub fn detail_lookup(id: &str, message: &str) -> Self {
        SyncError::DetailLookup {
            id: id.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an Encode error
    pub fn encode(id: &str, message: &str) -> Self {
        SyncError::Encode {
            id: id.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an InvalidProductType error
    pub fn invalid_product_type(value: &str) -> Self {
        SyncError::InvalidProductType {
            value: value.to_string(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl std::fmt::Display) -> Self {
        SyncError::InvalidConfig {
            message: message.to_string(),
        }
    }

    /// Wrap an error with the product it occurred in
    pub fn product_sync(product: &str, source: SyncError) -> Self {
        SyncError::ProductSync {
            product: product.to_string(),
            source: Box::new(source),
        }
    }
}
