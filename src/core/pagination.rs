//! Known-key working set for the paginated feeds
//!
//! The remote feeds offer no resumption cursor, so a sync run walks pages
//! from index 0 and relies on the keys it already holds to decide which
//! records are new and when to stop. `KnownKeys` is seeded from the store and
//! grows as pages are scanned, which also catches duplicates that shift across
//! page boundaries within one run.

use std::collections::HashSet;
use std::hash::Hash;

/// Outcome of scanning one page against the known-key set
#[derive(Debug, Clone, PartialEq)]
pub struct PageScan<T> {
    /// Records whose key was not known before this page, in page order
    pub new_records: Vec<T>,
    /// Number of records the page contained
    pub page_len: usize,
    /// Every record on a non-empty page was already known
    pub all_known: bool,
}

impl<T> PageScan<T> {
    /// Whether the paginated loop should fetch the next page
    ///
    /// # Arguments
    ///
    /// * `page_size` - The page size the page was requested with
    ///
    /// # Returns
    ///
    /// `false` when the feed is exhausted (short or empty page) or when the
    /// run has caught up with previously synced history.
    pub fn should_continue(&self, page_size: usize) -> bool {
        self.page_len > 0 && self.page_len >= page_size && !self.all_known
    }
}

/// In-memory set of keys already persisted or seen during this run
#[derive(Debug, Clone, Default)]
pub struct KnownKeys<K> {
    keys: HashSet<K>,
}

impl<K: Eq + Hash> KnownKeys<K> {
    /// Seed the working set from the keys the store already holds
    pub fn new(keys: HashSet<K>) -> Self {
        Self { keys }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Split a page into unseen records and mark every key on it as known
    ///
    /// # Arguments
    ///
    /// * `page` - Records exactly as the feed returned them
    /// * `key_of` - Extracts the dedup key of a record
    ///
    /// # Returns
    ///
    /// A [`PageScan`] with the new records in page order. A key repeated
    /// within the page is only returned once.
    pub fn scan<T, F>(&mut self, page: Vec<T>, key_of: F) -> PageScan<T>
    where
        F: Fn(&T) -> K,
    {
        let page_len = page.len();
        let mut new_records = Vec::new();

        for record in page {
            // insert returns false when the key was already present
            if self.keys.insert(key_of(&record)) {
                new_records.push(record);
            }
        }

        PageScan {
            all_known: page_len > 0 && new_records.is_empty(),
            new_records,
            page_len,
        }
    }
}
