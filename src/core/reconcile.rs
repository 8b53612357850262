//! Reconciliation of the card feed with the linked-account feed
//!
//! The same real-world activity shows up in both feeds with no shared
//! identifier. This module merges the two into one timeline with a
//! time/amount similarity heuristic, then sorts and paginates the result.
//!
//! # Algorithm
//!
//! 1. Linked-account records are bucketed by amount (currency and exact
//!    decimal value).
//! 2. Each card record, in the order given, claims the closest unclaimed
//!    linked record of its bucket within the tolerance window. A claimed
//!    linked record replaces the card record in the output. A card record
//!    whose date does not parse is passed through unmatched.
//! 3. Unclaimed linked records of kind `card` are dropped. The remaining
//!    unclaimed ones are kept only if their kind is in the real-time set.
//! 4. The merged set is sorted by operation date; dates that do not parse
//!    sort as the earliest instant.
//! 5. The total count is taken before the requested page is sliced out.
//!
//! Matching is greedy: when two card records are close to the same linked
//! record, the first one processed wins it.

use chrono::{DateTime, FixedOffset, TimeDelta};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::traits::{TransactionFamily, TransactionStore, ViewOptions};
use crate::config::ReconcileConfig;
use crate::types::{SyncError, TransactionKind, TransactionRecord};

/// Feed a combined record was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    CardFeed,
    LinkedAccountFeed,
}

/// One entry of the merged timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedTransaction {
    pub source: TransactionSource,
    #[serde(flatten)]
    pub record: TransactionRecord,
}

impl CombinedTransaction {
    pub fn card(record: TransactionRecord) -> Self {
        Self {
            source: TransactionSource::CardFeed,
            record,
        }
    }

    pub fn linked(record: TransactionRecord) -> Self {
        Self {
            source: TransactionSource::LinkedAccountFeed,
            record,
        }
    }
}

/// A page of the merged timeline plus the pre-pagination total
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedView {
    pub records: Vec<CombinedTransaction>,
    pub total_count: usize,
}

/// Card-feed / linked-account-feed reconciler
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Merge the two feeds of one product into a single unsorted timeline
    ///
    /// # Arguments
    ///
    /// * `card` - Card-feed records, in the order matching should claim
    /// * `linked` - Linked-account-feed records
    ///
    /// # Returns
    ///
    /// Matched and unmatched card positions in card order, followed by the
    /// surviving unclaimed linked records in linked order.
    pub fn merge(
        &self,
        card: Vec<TransactionRecord>,
        linked: Vec<TransactionRecord>,
    ) -> Vec<CombinedTransaction> {
        let tolerance =
            TimeDelta::try_seconds(self.config.tolerance_secs).unwrap_or(TimeDelta::MAX);

        let linked_dates: Vec<Option<DateTime<FixedOffset>>> = linked
            .iter()
            .map(TransactionRecord::parsed_operation_date)
            .collect();

        let mut buckets: HashMap<(String, Decimal), Vec<usize>> = HashMap::new();
        for (index, record) in linked.iter().enumerate() {
            buckets
                .entry(record.amount.bucket_key())
                .or_default()
                .push(index);
        }

        // A taken slot is a claimed linked record
        let mut slots: Vec<Option<TransactionRecord>> = linked.into_iter().map(Some).collect();
        let mut merged = Vec::with_capacity(card.len() + slots.len());
        let mut matched = 0usize;

        for record in card {
            let Some(card_at) = record.parsed_operation_date() else {
                warn!(
                    id = %record.id,
                    operation_date = %record.operation_date,
                    "Unparseable card operation date, passing record through"
                );
                merged.push(CombinedTransaction::card(record));
                continue;
            };

            let mut best: Option<(usize, TimeDelta)> = None;
            if let Some(candidates) = buckets.get(&record.amount.bucket_key()) {
                for &index in candidates {
                    if slots[index].is_none() {
                        continue;
                    }
                    let Some(linked_at) = linked_dates[index] else {
                        continue;
                    };
                    let diff = (linked_at - card_at).abs();
                    if diff > tolerance {
                        continue;
                    }
                    if best.map_or(true, |(_, best_diff)| diff < best_diff) {
                        best = Some((index, diff));
                    }
                }
            }

            match best.and_then(|(index, _)| slots[index].take()) {
                Some(linked_record) => {
                    matched += 1;
                    merged.push(CombinedTransaction::linked(linked_record));
                }
                None => merged.push(CombinedTransaction::card(record)),
            }
        }

        let mut kept = 0usize;
        let mut dropped = 0usize;
        for record in slots.into_iter().flatten() {
            let kind = record.kind();
            if kind != TransactionKind::Card && self.config.is_real_time(&kind) {
                kept += 1;
                merged.push(CombinedTransaction::linked(record));
            } else {
                dropped += 1;
            }
        }

        debug!(matched, unmatched_kept = kept, unmatched_dropped = dropped, "Merged feeds");
        merged
    }

    /// Merge, sort and paginate a product's persisted transactions
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding the product's card and linked records
    /// * `product_id` - The product to read
    /// * `options` - Page, ordering and extended-info options
    ///
    /// # Returns
    ///
    /// * `Ok(CombinedView)` - The requested page and the total merged count
    /// * `Err(SyncError)` - If either bulk read failed
    pub fn combined_view<S>(
        &self,
        store: &S,
        product_id: &str,
        options: ViewOptions,
    ) -> Result<CombinedView, SyncError>
    where
        S: TransactionStore + ?Sized,
    {
        // Card records are read newest first; that is the order matching claims in
        let card =
            store.transactions(TransactionFamily::Card, product_id, ViewOptions::default())?;
        let linked = store.transactions(
            TransactionFamily::LinkedAccount,
            product_id,
            ViewOptions::default().with_extended(options.include_extended),
        )?;

        let mut merged = self.merge(card, linked);
        sort_by_operation_date(&mut merged, options.ascending);
        Ok(paginate(merged, options.page_size, options.page))
    }
}

/// Stable sort by parsed operation date; unparseable dates come first when ascending
pub fn sort_by_operation_date(records: &mut [CombinedTransaction], ascending: bool) {
    if ascending {
        records.sort_by_cached_key(|r| r.record.parsed_operation_date());
    } else {
        records.sort_by_cached_key(|r| Reverse(r.record.parsed_operation_date()));
    }
}

/// Slice one page out of a sorted timeline
///
/// A `page_size` of 0 returns everything. Pages past the end are empty.
pub fn paginate(records: Vec<CombinedTransaction>, page_size: usize, page: usize) -> CombinedView {
    let total_count = records.len();
    if page_size == 0 {
        return CombinedView {
            records,
            total_count,
        };
    }

    let start = page.saturating_mul(page_size);
    if start >= total_count {
        return CombinedView {
            records: Vec::new(),
            total_count,
        };
    }
    let end = start.saturating_add(page_size).min(total_count);

    CombinedView {
        records: records.into_iter().skip(start).take(end - start).collect(),
        total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction_store::SqliteTransactionStore;
    use crate::types::{Amount, Enrichment, ExtendedInfo, TxnKey};
    use rstest::rstest;

    fn txn(id: &str, date: &str, amount: i64, kind: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            operation_date: date.to_string(),
            amount: Amount::new("AMD", Decimal::new(amount, 0)),
            transaction_type: kind.to_string(),
            ..Default::default()
        }
    }

    fn ids(records: &[CombinedTransaction]) -> Vec<&str> {
        records.iter().map(|r| r.record.id.as_str()).collect()
    }

    #[test]
    fn test_close_pair_merges_into_linked_record() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", "2024-01-01T10:00:20Z", 500, "transfer:to-card")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, TransactionSource::LinkedAccountFeed);
        assert_eq!(merged[0].record.id, "l1");
    }

    #[rstest]
    #[case::real_time_kind_kept("transfer:to-card", 2)]
    #[case::other_kind_dropped("payment:utility", 1)]
    #[case::card_kind_dropped("card", 1)]
    fn test_ninety_second_gap_does_not_match(#[case] kind: &str, #[case] expected: usize) {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", "2024-01-01T10:01:30Z", 500, kind)];

        let merged = reconciler.merge(card, linked);

        assert_eq!(merged.len(), expected);
        assert_eq!(merged[0].source, TransactionSource::CardFeed);
        assert_eq!(merged[0].record.id, "c1");
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", "2024-01-01T10:01:00Z", 500, "card")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(ids(&merged), vec!["l1"]);
    }

    #[rstest]
    #[case::sub_millisecond_over("2024-01-01T10:01:00.0009Z", "c1")]
    #[case::one_nanosecond_over("2024-01-01T10:01:00.000000001Z", "c1")]
    #[case::fraction_under("2024-01-01T10:00:59.999Z", "l1")]
    #[case::fraction_under_before("2024-01-01T09:59:00.5Z", "l1")]
    fn test_tolerance_uses_full_precision(#[case] linked_date: &str, #[case] expected: &str) {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", linked_date, 500, "card")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(ids(&merged), vec![expected]);
    }

    #[test]
    fn test_amount_mismatch_never_matches() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", "2024-01-01T10:00:01Z", 501, "card")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(ids(&merged), vec!["c1"]);
    }

    #[test]
    fn test_amount_scale_does_not_split_bucket() {
        let reconciler = Reconciler::default();
        let mut card = txn("c1", "2024-01-01T10:00:00Z", 0, "card");
        card.amount = Amount::new("AMD", Decimal::new(50000, 2));
        let linked = vec![txn("l1", "2024-01-01T10:00:05Z", 500, "card")];

        let merged = reconciler.merge(vec![card], linked);

        assert_eq!(ids(&merged), vec!["l1"]);
    }

    #[test]
    fn test_closest_candidate_wins() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![
            txn("far", "2024-01-01T10:00:50Z", 500, "card"),
            txn("near", "2024-01-01T09:59:55Z", 500, "card"),
        ];

        let merged = reconciler.merge(card, linked);

        // "far" is left unclaimed and dropped as a card-kind record
        assert_eq!(ids(&merged), vec!["near"]);
    }

    #[test]
    fn test_claimed_record_is_not_reused() {
        let reconciler = Reconciler::default();
        let card = vec![
            txn("c1", "2024-01-01T10:00:00Z", 500, "card"),
            txn("c2", "2024-01-01T10:00:10Z", 500, "card"),
        ];
        let linked = vec![txn("l1", "2024-01-01T10:00:05Z", 500, "card")];

        let merged = reconciler.merge(card, linked);

        // Greedy: the first card record processed claims the only candidate
        assert_eq!(ids(&merged), vec!["l1", "c2"]);
    }

    #[test]
    fn test_unparseable_card_date_passes_through() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "not a date", 500, "card")];
        let linked = vec![txn("l1", "2024-01-01T10:00:00Z", 500, "exchange")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(ids(&merged), vec!["c1", "l1"]);
        assert_eq!(merged[0].source, TransactionSource::CardFeed);
    }

    #[test]
    fn test_unparseable_linked_date_is_never_a_candidate() {
        let reconciler = Reconciler::default();
        let card = vec![txn("c1", "2024-01-01T10:00:00Z", 500, "card")];
        let linked = vec![txn("l1", "garbage", 500, "exchange")];

        let merged = reconciler.merge(card, linked);

        assert_eq!(ids(&merged), vec!["c1", "l1"]);
    }

    #[test]
    fn test_custom_real_time_kinds() {
        let mut config = ReconcileConfig::default();
        config.real_time_kinds = [TransactionKind::Other("payment:utility".to_string())]
            .into_iter()
            .collect();
        let reconciler = Reconciler::new(config);
        let linked = vec![
            txn("l1", "2024-01-01T10:00:00Z", 100, "payment:utility"),
            txn("l2", "2024-01-01T11:00:00Z", 100, "exchange"),
        ];

        let merged = reconciler.merge(Vec::new(), linked);

        assert_eq!(ids(&merged), vec!["l1"]);
    }

    #[rstest]
    #[case::ascending(true, vec!["bad", "a", "b", "c"])]
    #[case::descending(false, vec!["c", "b", "a", "bad"])]
    fn test_sort_by_operation_date(#[case] ascending: bool, #[case] expected: Vec<&str>) {
        let mut records = vec![
            CombinedTransaction::card(txn("b", "2024-01-02T00:00:00Z", 1, "card")),
            CombinedTransaction::card(txn("bad", "??", 1, "card")),
            CombinedTransaction::card(txn("c", "2024-01-03T00:00:00+04:00", 1, "card")),
            CombinedTransaction::card(txn("a", "2024-01-01T00:00:00Z", 1, "card")),
        ];

        sort_by_operation_date(&mut records, ascending);

        assert_eq!(ids(&records), expected);
    }

    #[test]
    fn test_sort_is_stable_for_equal_dates() {
        let mut records = vec![
            CombinedTransaction::card(txn("first", "2024-01-01T10:00:00Z", 1, "card")),
            CombinedTransaction::card(txn("second", "2024-01-01T14:00:00+04:00", 1, "card")),
        ];

        sort_by_operation_date(&mut records, false);

        assert_eq!(ids(&records), vec!["first", "second"]);
    }

    #[rstest]
    #[case::first_page(10, 3, 0, vec![0, 1, 2])]
    #[case::middle_page(10, 3, 1, vec![3, 4, 5])]
    #[case::last_partial_page(10, 3, 3, vec![9])]
    #[case::past_the_end(10, 3, 4, vec![])]
    #[case::zero_size_returns_all(4, 0, 7, vec![0, 1, 2, 3])]
    fn test_paginate(
        #[case] total: usize,
        #[case] page_size: usize,
        #[case] page: usize,
        #[case] expected: Vec<usize>,
    ) {
        let records: Vec<CombinedTransaction> = (0..total)
            .map(|i| CombinedTransaction::card(txn(&i.to_string(), "", 1, "card")))
            .collect();

        let view = paginate(records, page_size, page);

        assert_eq!(view.total_count, total);
        let expected: Vec<String> = expected.iter().map(|i| i.to_string()).collect();
        assert_eq!(ids(&view.records), expected);
    }

    #[test]
    fn test_combined_view_counts_before_paging() {
        let store = SqliteTransactionStore::open_in_memory().unwrap();
        // Three card records with linked twins, two card-only, two linked-only
        let card = vec![
            txn("c1", "2024-01-01T10:00:00Z", 100, "card"),
            txn("c2", "2024-01-02T10:00:00Z", 200, "card"),
            txn("c3", "2024-01-03T10:00:00Z", 300, "card"),
            txn("c4", "2024-01-04T10:00:00Z", 400, "card"),
            txn("c5", "2024-01-05T10:00:00Z", 500, "card"),
        ];
        let linked = vec![
            txn("l1", "2024-01-01T10:00:10Z", 100, "card"),
            txn("l2", "2024-01-02T10:00:10Z", 200, "card"),
            txn("l3", "2024-01-03T10:00:10Z", 300, "transfer:to-card"),
            txn("l6", "2024-01-06T10:00:00Z", 600, "exchange"),
            txn("l7", "2024-01-07T10:00:00Z", 700, "cash-out"),
        ];
        store
            .insert_transactions(TransactionFamily::Card, "card1", &card)
            .unwrap();
        store
            .insert_transactions(TransactionFamily::LinkedAccount, "card1", &linked)
            .unwrap();

        let reconciler = Reconciler::default();
        let view = reconciler
            .combined_view(&store, "card1", ViewOptions::new(3, 1).ascending(true))
            .unwrap();

        assert_eq!(view.total_count, 7);
        assert_eq!(ids(&view.records), vec!["c4", "c5", "l6"]);
    }

    #[test]
    fn test_combined_view_extended_info_is_opt_in() {
        let store = SqliteTransactionStore::open_in_memory().unwrap();
        store
            .insert_transactions(
                TransactionFamily::LinkedAccount,
                "card1",
                &[txn("l1", "2024-01-01T10:00:00Z", 100, "exchange")],
            )
            .unwrap();
        let info = ExtendedInfo {
            beneficiary_name: "Jane".to_string(),
            ..Default::default()
        };
        store
            .update_extended_info("card1", &TxnKey::new("l1", "2024-01-01T10:00:00Z"), &info)
            .unwrap();

        let reconciler = Reconciler::default();
        let without = reconciler
            .combined_view(&store, "card1", ViewOptions::default())
            .unwrap();
        let with = reconciler
            .combined_view(&store, "card1", ViewOptions::default().with_extended(true))
            .unwrap();

        assert!(without.records[0].record.extended.is_not_fetched());
        assert_eq!(with.records[0].record.extended, Enrichment::Fetched(info));
    }

    #[test]
    fn test_combined_view_serializes_flat() {
        let view = CombinedView {
            records: vec![CombinedTransaction::linked(txn(
                "l1",
                "2024-01-01T10:00:00Z",
                100,
                "exchange",
            ))],
            total_count: 1,
        };

        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["totalCount"], 1);
        assert_eq!(value["records"][0]["source"], "linked_account_feed");
        assert_eq!(value["records"][0]["id"], "l1");
        assert_eq!(value["records"][0]["operationDate"], "2024-01-01T10:00:00Z");
    }
}
