//! Engine configuration
//!
//! Controls feed page size, enrichment fan-out and the reconciliation
//! heuristic. All fields have defaults, so an empty TOML document is a valid
//! configuration.
//!
//! ```toml
//! [sync]
//! page_size = 1000
//! enrichment_concurrency = 5
//! backfill_enrichment = false
//!
//! [reconcile]
//! tolerance_secs = 60
//! real_time_kinds = ["transfer:to-card", "transfer:local", "exchange"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use crate::types::{SyncError, TransactionKind};

/// Configuration for the sync loop and enrichment fan-out
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per page from the paginated feeds
    pub page_size: usize,
    /// Maximum number of detail lookups in flight at once
    pub enrichment_concurrency: usize,
    /// Enrich every not-yet-enriched record after a card sync instead of
    /// only the records inserted by this run
    pub backfill_enrichment: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            enrichment_concurrency: 5,
            backfill_enrichment: false,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(page_size: usize, enrichment_concurrency: usize) -> Self {
        Self {
            page_size,
            enrichment_concurrency,
            backfill_enrichment: false,
        }
        .validated()
    }

    pub fn with_backfill(mut self, backfill_enrichment: bool) -> Self {
        self.backfill_enrichment = backfill_enrichment;
        self
    }

    fn validated(self) -> Self {
        let default = Self::default();

        let page_size = if self.page_size == 0 {
            warn!(
                page_size = self.page_size,
                default = default.page_size,
                "Invalid page_size, using default"
            );
            default.page_size
        } else {
            self.page_size
        };

        let enrichment_concurrency = if self.enrichment_concurrency == 0 {
            warn!(
                enrichment_concurrency = self.enrichment_concurrency,
                default = default.enrichment_concurrency,
                "Invalid enrichment_concurrency, using default"
            );
            default.enrichment_concurrency
        } else {
            self.enrichment_concurrency
        };

        Self {
            page_size,
            enrichment_concurrency,
            backfill_enrichment: self.backfill_enrichment,
        }
    }
}

/// Configuration for merging the card and linked-account feeds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Maximum distance, in seconds, between a card record and the linked
    /// record it is matched to
    pub tolerance_secs: i64,

    /// Linked-account kinds whose timestamps are trusted when they have no
    /// card counterpart
    pub real_time_kinds: HashSet<TransactionKind>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 60,
            real_time_kinds: [
                TransactionKind::TransferToCard,
                TransactionKind::TransferLocal,
                TransactionKind::Exchange,
                TransactionKind::CashOut,
                TransactionKind::TransferBetweenOwnAccounts,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl ReconcileConfig {
    pub fn is_real_time(&self, kind: &TransactionKind) -> bool {
        self.real_time_kinds.contains(kind)
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sync: SyncConfig,
    pub reconcile: ReconcileConfig,
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        let mut config: EngineConfig = toml::from_str(text).map_err(SyncError::invalid_config)?;
        config.sync = config.sync.validated();
        if config.reconcile.tolerance_secs < 0 {
            return Err(SyncError::invalid_config(format!(
                "tolerance_secs must not be negative, got {}",
                config.reconcile.tolerance_secs
            )));
        }
        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::invalid_config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.page_size, 1000);
        assert_eq!(config.sync.enrichment_concurrency, 5);
        assert!(!config.sync.backfill_enrichment);
        assert_eq!(config.reconcile.tolerance_secs, 60);
        assert_eq!(config.reconcile.real_time_kinds.len(), 5);
        assert!(config.reconcile.is_real_time(&TransactionKind::Exchange));
        assert!(!config.reconcile.is_real_time(&TransactionKind::Card));
    }

    #[rstest]
    #[case::zero_page_size(0, 5, 1000, 5)]
    #[case::zero_concurrency(200, 0, 200, 5)]
    #[case::custom(200, 8, 200, 8)]
    fn test_sync_config_zero_values_fallback(
        #[case] page_size: usize,
        #[case] concurrency: usize,
        #[case] expected_page_size: usize,
        #[case] expected_concurrency: usize,
    ) {
        let config = SyncConfig::new(page_size, concurrency);
        assert_eq!(config.page_size, expected_page_size);
        assert_eq!(config.enrichment_concurrency, expected_concurrency);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let text = r#"
            [sync]
            page_size = 250
            backfill_enrichment = true

            [reconcile]
            tolerance_secs = 30
            real_time_kinds = ["exchange", "payment:utility"]
        "#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.sync.page_size, 250);
        assert_eq!(config.sync.enrichment_concurrency, 5);
        assert!(config.sync.backfill_enrichment);
        assert_eq!(config.reconcile.tolerance_secs, 30);
        assert!(config.reconcile.is_real_time(&TransactionKind::Exchange));
        assert!(config
            .reconcile
            .is_real_time(&TransactionKind::Other("payment:utility".to_string())));
        assert!(!config.reconcile.is_real_time(&TransactionKind::CashOut));
    }

    #[rstest]
    #[case::wrong_type("[sync]\npage_size = \"big\"\n")]
    #[case::negative_tolerance("[reconcile]\ntolerance_secs = -1\n")]
    fn test_invalid_toml(#[case] text: &str) {
        let result = EngineConfig::from_toml_str(text);
        assert!(matches!(result, Err(SyncError::InvalidConfig { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(b"[sync]\nenrichment_concurrency = 2\n")
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.sync.enrichment_concurrency, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(Path::new("does-not-exist.toml"));
        assert!(matches!(result, Err(SyncError::InvalidConfig { .. })));
    }
}
