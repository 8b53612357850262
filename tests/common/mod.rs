//! Shared helpers for integration tests
//!
//! `ScriptedFeed` is an in-memory feed adapter. Its script holds the full
//! remote history per product; paginated calls slice it the way the remote
//! feeds do, and every page request is recorded so tests can assert on
//! pagination behavior.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use txn_sync::types::AdditionalInfo;
use txn_sync::{
    AccountPage, AccountTransactionRecord, Amount, FlowDirection, Product, SqliteTransactionStore,
    SyncConfig, SyncEngine, SyncError, TransactionDetail, TransactionFeed, TransactionRecord,
};

/// Remote state served by [`ScriptedFeed`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedScript {
    pub products: Vec<Product>,
    /// Card feed per card id
    pub card: HashMap<String, Vec<TransactionRecord>>,
    /// Linked-account feed per account id, newest first
    pub linked: HashMap<String, Vec<TransactionRecord>>,
    /// Account-history feed per account id, newest first
    pub accounts: HashMap<String, Vec<AccountTransactionRecord>>,
    /// Transaction ids whose detail lookup fails
    pub failing_details: HashSet<String>,
    /// Card ids whose card feed fails
    pub failing_cards: HashSet<String>,
    /// Report `has_next = true` on every account page
    pub sticky_has_next: bool,
}

pub struct ScriptedFeed {
    script: Mutex<FeedScript>,
    linked_requests: Mutex<Vec<(String, usize)>>,
    account_requests: Mutex<Vec<(String, usize)>>,
    detail_calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(script: FeedScript) -> Self {
        Self {
            script: Mutex::new(script),
            linked_requests: Mutex::new(Vec::new()),
            account_requests: Mutex::new(Vec::new()),
            detail_calls: AtomicUsize::new(0),
        }
    }

    /// Load `feed.json` from a fixture directory
    pub fn from_fixture(dir: &Path) -> Self {
        let path = dir.join("feed.json");
        let text = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
        let script: FeedScript = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path.display(), e));
        Self::new(script)
    }

    /// Mutate the remote state between runs
    pub fn update(&self, change: impl FnOnce(&mut FeedScript)) {
        change(&mut *self.script.lock().unwrap());
    }

    /// Page indices requested from the linked-account feed, then cleared
    pub fn take_linked_requests(&self, account_id: &str) -> Vec<usize> {
        let mut requests = self.linked_requests.lock().unwrap();
        let pages = requests
            .iter()
            .filter(|(id, _)| id == account_id)
            .map(|(_, page)| *page)
            .collect();
        requests.clear();
        pages
    }

    /// Page indices requested from the account feed, then cleared
    pub fn take_account_requests(&self, account_id: &str) -> Vec<usize> {
        let mut requests = self.account_requests.lock().unwrap();
        let pages = requests
            .iter()
            .filter(|(id, _)| id == account_id)
            .map(|(_, page)| *page)
            .collect();
        requests.clear();
        pages
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

fn page_bounds(len: usize, page_size: usize, page_index: usize) -> (usize, usize) {
    let start = page_index.saturating_mul(page_size).min(len);
    let end = start.saturating_add(page_size).min(len);
    (start, end)
}

#[async_trait]
impl TransactionFeed for ScriptedFeed {
    async fn fetch_products(&self) -> Result<Vec<Product>, SyncError> {
        Ok(self.script.lock().unwrap().products.clone())
    }

    async fn fetch_card_transactions(
        &self,
        product_id: &str,
    ) -> Result<Vec<TransactionRecord>, SyncError> {
        let script = self.script.lock().unwrap();
        if script.failing_cards.contains(product_id) {
            return Err(SyncError::feed("card transactions", "502 Bad Gateway"));
        }
        Ok(script.card.get(product_id).cloned().unwrap_or_default())
    }

    async fn fetch_linked_account_page(
        &self,
        account_id: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<Vec<TransactionRecord>, SyncError> {
        self.linked_requests
            .lock()
            .unwrap()
            .push((account_id.to_string(), page_index));

        let script = self.script.lock().unwrap();
        let records = script.linked.get(account_id).cloned().unwrap_or_default();
        let (start, end) = page_bounds(records.len(), page_size, page_index);
        Ok(records[start..end].to_vec())
    }

    async fn fetch_account_page(
        &self,
        account_id: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<AccountPage, SyncError> {
        self.account_requests
            .lock()
            .unwrap()
            .push((account_id.to_string(), page_index));

        let script = self.script.lock().unwrap();
        let records = script.accounts.get(account_id).cloned().unwrap_or_default();
        let (start, end) = page_bounds(records.len(), page_size, page_index);
        Ok(AccountPage {
            transactions: records[start..end].to_vec(),
            has_next: script.sticky_has_next || end < records.len(),
        })
    }

    async fn fetch_transaction_detail(&self, id: &str) -> Result<TransactionDetail, SyncError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.lock().unwrap().failing_details.contains(id) {
            return Err(SyncError::feed("transaction detail", "503 Service Unavailable"));
        }
        Ok(TransactionDetail {
            beneficiary_name: format!("Beneficiary {}", id),
            beneficiary_address: "Yerevan".to_string(),
            credit_account_number: "1570000000000".to_string(),
            additional_info: Some(AdditionalInfo {
                card_masked_number: Some("4111********1111".to_string()),
                processed_operation_id: Some(format!("op-{}", id)),
            }),
            transaction_swift_details: None,
        })
    }
}

/// Card or linked-account record with an AMD amount
pub fn record(id: &str, operation_date: &str, amount: i64, kind: &str) -> TransactionRecord {
    TransactionRecord {
        id: id.to_string(),
        operation_date: operation_date.to_string(),
        amount: Amount::new("AMD", Decimal::new(amount, 0)),
        transaction_type: kind.to_string(),
        details: format!("Transaction {}", id),
        ..Default::default()
    }
}

/// `count` distinct linked records, newest first, ids `{prefix}{n}`
pub fn linked_history(prefix: &str, count: usize) -> Vec<TransactionRecord> {
    (0..count)
        .rev()
        .map(|n| {
            let minutes = n as i64;
            let date = chrono::DateTime::from_timestamp(1_704_067_200 + minutes * 60, 0)
                .unwrap()
                .to_rfc3339();
            record(&format!("{}{}", prefix, n), &date, 100 + minutes, "transfer:local")
        })
        .collect()
}

/// `count` distinct account records, newest first, ids `{prefix}{n}`
pub fn account_history(prefix: &str, count: usize) -> Vec<AccountTransactionRecord> {
    (0..count)
        .rev()
        .map(|n| {
            let mut record = AccountTransactionRecord::new(
                format!("{}{}", prefix, n),
                if n % 2 == 0 {
                    FlowDirection::Inbound
                } else {
                    FlowDirection::Outbound
                },
                1_704_067_200_000 + n as i64 * 60_000,
            );
            record.transaction_amount = Amount::new("AMD", Decimal::new(1000 + n as i64, 0));
            record
        })
        .collect()
}

pub type TestEngine = SyncEngine<ScriptedFeed, SqliteTransactionStore>;

/// Engine over an in-memory store
pub fn engine(feed: &Arc<ScriptedFeed>, config: SyncConfig) -> TestEngine {
    let store = Arc::new(SqliteTransactionStore::open_in_memory().unwrap());
    SyncEngine::new(Arc::clone(feed), store, config)
}
