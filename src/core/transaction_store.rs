//! SQLite-backed transaction store
//!
//! This module provides `SqliteTransactionStore`, the durable implementation of
//! [`TransactionStore`]. It keeps products and the three transaction families
//! in separate tables and enforces record identity with primary keys.
//!
//! # Layout
//!
//! - `card_transactions` / `linked_account_transactions`: primary key
//!   `(product_id, id, operation_date)`. The same `id` with a different
//!   operation date is a distinct, expected row.
//! - `linked_account_transactions` additionally carries nullable extended
//!   columns gated by `extended_fetched`. The flag, never the null-ness of
//!   the columns, decides whether a record has been enriched.
//! - `account_transactions`: primary key `(product_id, id)`.
//!
//! # Atomicity
//!
//! Every multi-row write runs in one SQLite transaction. A failing row rolls
//! back the whole batch. Rows whose key already exists are skipped, not
//! treated as failures.

use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::traits::{TransactionFamily, TransactionStore, ViewOptions};
use crate::types::{
    AccountTransactionRecord, Amount, Enrichment, ExtendedInfo, FlowDirection, Product,
    ProductType, SyncError, TransactionRecord, TxnKey,
};

/// Schema migrations, applied in order; index + 1 is the version number
const MIGRATIONS: &[&str] = &[
    // Version 1: products and the three transaction families
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        product_type TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        account_id TEXT,
        currency TEXT NOT NULL DEFAULT '',
        order_index INTEGER NOT NULL DEFAULT 0,
        synced_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS card_transactions (
        id TEXT NOT NULL CHECK (id <> ''),
        product_id TEXT NOT NULL,
        transaction_type TEXT NOT NULL DEFAULT '',
        accounting_type TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL DEFAULT '',
        amount_currency TEXT NOT NULL DEFAULT '',
        amount_value TEXT NOT NULL,
        correspondent_account_number TEXT NOT NULL DEFAULT '',
        correspondent_account_name TEXT NOT NULL DEFAULT '',
        details TEXT NOT NULL DEFAULT '',
        operation_date TEXT NOT NULL,
        workflow_code TEXT NOT NULL DEFAULT '',
        date TEXT NOT NULL DEFAULT '',
        year TEXT NOT NULL DEFAULT '',
        month TEXT NOT NULL DEFAULT '',
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (product_id, id, operation_date)
    );
    CREATE INDEX IF NOT EXISTS idx_card_txn_product_date
        ON card_transactions(product_id, operation_date);

    CREATE TABLE IF NOT EXISTS linked_account_transactions (
        id TEXT NOT NULL CHECK (id <> ''),
        product_id TEXT NOT NULL,
        transaction_type TEXT NOT NULL DEFAULT '',
        accounting_type TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL DEFAULT '',
        amount_currency TEXT NOT NULL DEFAULT '',
        amount_value TEXT NOT NULL,
        correspondent_account_number TEXT NOT NULL DEFAULT '',
        correspondent_account_name TEXT NOT NULL DEFAULT '',
        details TEXT NOT NULL DEFAULT '',
        operation_date TEXT NOT NULL,
        workflow_code TEXT NOT NULL DEFAULT '',
        date TEXT NOT NULL DEFAULT '',
        year TEXT NOT NULL DEFAULT '',
        month TEXT NOT NULL DEFAULT '',
        synced_at INTEGER NOT NULL,
        beneficiary_name TEXT,
        beneficiary_address TEXT,
        credit_account_number TEXT,
        card_masked_number TEXT,
        ext_operation_id TEXT,
        swift_details TEXT,
        extended_fetched INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (product_id, id, operation_date)
    );
    CREATE INDEX IF NOT EXISTS idx_linked_txn_product_date
        ON linked_account_transactions(product_id, operation_date);
    CREATE INDEX IF NOT EXISTS idx_linked_txn_pending
        ON linked_account_transactions(product_id, extended_fetched);

    CREATE TABLE IF NOT EXISTS account_transactions (
        id TEXT NOT NULL CHECK (id <> ''),
        product_id TEXT NOT NULL,
        transaction_id TEXT NOT NULL DEFAULT '',
        operation_id TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT '',
        transaction_type TEXT NOT NULL DEFAULT '',
        workflow_code TEXT NOT NULL DEFAULT '',
        flow_direction TEXT NOT NULL,
        transaction_date INTEGER NOT NULL,
        settled_date INTEGER NOT NULL,
        date TEXT NOT NULL DEFAULT '',
        month TEXT NOT NULL DEFAULT '',
        year TEXT NOT NULL DEFAULT '',
        debit_account_number TEXT NOT NULL DEFAULT '',
        credit_account_number TEXT NOT NULL DEFAULT '',
        beneficiary_name TEXT NOT NULL DEFAULT '',
        details TEXT NOT NULL DEFAULT '',
        source_system TEXT NOT NULL DEFAULT '',
        transaction_amount_currency TEXT NOT NULL DEFAULT '',
        transaction_amount_value TEXT NOT NULL,
        settled_amount_currency TEXT NOT NULL DEFAULT '',
        settled_amount_value TEXT NOT NULL,
        domestic_amount_currency TEXT NOT NULL DEFAULT '',
        domestic_amount_value TEXT NOT NULL,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (product_id, id)
    );
    CREATE INDEX IF NOT EXISTS idx_acct_txn_product_date
        ON account_transactions(product_id, transaction_date);
    "#,
];

const BASE_COLUMNS: &str = "id, transaction_type, accounting_type, state, \
     amount_currency, amount_value, correspondent_account_number, \
     correspondent_account_name, details, operation_date, \
     workflow_code, date, year, month";

const EXTENDED_COLUMNS: &str = "beneficiary_name, beneficiary_address, credit_account_number, \
     card_masked_number, ext_operation_id, swift_details, extended_fetched";

const ACCOUNT_COLUMNS: &str = "id, transaction_id, operation_id, status, \
     transaction_type, workflow_code, flow_direction, \
     transaction_date, settled_date, date, month, year, \
     debit_account_number, credit_account_number, \
     beneficiary_name, details, source_system, \
     transaction_amount_currency, transaction_amount_value, \
     settled_amount_currency, settled_amount_value, \
     domestic_amount_currency, domestic_amount_value";

/// Transaction store backed by a single SQLite connection
///
/// The connection sits behind a mutex so the store can be shared between the
/// orchestrator and enrichment tasks.
#[derive(Debug)]
pub struct SqliteTransactionStore {
    conn: Mutex<Connection>,
}

impl SqliteTransactionStore {
    /// Open (or create) a store at `path` and apply pending migrations
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| SyncError::store("open", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| SyncError::store("configure", e))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| SyncError::store("open", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Highest applied schema version
    pub fn schema_version(&self) -> Result<usize, SyncError> {
        let conn = self.lock()?;
        current_version(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::store("lock", "connection mutex poisoned"))
    }
}

fn current_version(conn: &Connection) -> Result<usize, SyncError> {
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| SyncError::store("read schema version", e))?;
    Ok(version as usize)
}

fn migrate(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")
        .map_err(|e| SyncError::store("create schema_version", e))?;

    let current = current_version(conn)?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        conn.execute_batch(sql)
            .map_err(|e| SyncError::store(&format!("migration {}", version), e))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version as i64],
        )
        .map_err(|e| SyncError::store(&format!("record migration {}", version), e))?;
        debug!(version, "Applied schema migration");
    }
    Ok(())
}

fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

fn parse_decimal(text: &str) -> Result<Decimal, SyncError> {
    Decimal::from_str(text).map_err(|e| SyncError::store("decode amount", e))
}

/// Decode the base columns (and optionally the extended columns) of a row
///
/// Amounts are carried as text and decoded after the row is read.
struct RawTransaction {
    record: TransactionRecord,
    amount_value: String,
}

fn read_transaction_row(row: &Row<'_>, include_extended: bool) -> rusqlite::Result<RawTransaction> {
    let extended = if include_extended {
        let fetched: i64 = row.get(20)?;
        if fetched != 0 {
            Enrichment::Fetched(ExtendedInfo {
                beneficiary_name: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                beneficiary_address: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
                credit_account_number: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
                card_masked_number: row.get(17)?,
                operation_id: row.get(18)?,
                swift_details: row.get(19)?,
            })
        } else {
            Enrichment::NotFetched
        }
    } else {
        Enrichment::NotFetched
    };

    Ok(RawTransaction {
        record: TransactionRecord {
            id: row.get(0)?,
            transaction_type: row.get(1)?,
            accounting_type: row.get(2)?,
            state: row.get(3)?,
            amount: Amount::new(row.get::<_, String>(4)?, Decimal::ZERO),
            correspondent_account_number: row.get(6)?,
            correspondent_account_name: row.get(7)?,
            details: row.get(8)?,
            operation_date: row.get(9)?,
            workflow_code: row.get(10)?,
            date: row.get(11)?,
            year: row.get(12)?,
            month: row.get(13)?,
            extended,
        },
        amount_value: row.get(5)?,
    })
}

struct RawAccountTransaction {
    record: AccountTransactionRecord,
    flow_direction: String,
    amounts: [(String, String); 3],
}

fn read_account_row(row: &Row<'_>) -> rusqlite::Result<RawAccountTransaction> {
    let mut record = AccountTransactionRecord::new(
        row.get::<_, String>(0)?,
        FlowDirection::Outbound,
        row.get(7)?,
    );
    record.transaction_id = row.get(1)?;
    record.operation_id = row.get(2)?;
    record.status = row.get(3)?;
    record.transaction_type = row.get(4)?;
    record.workflow_code = row.get(5)?;
    record.settled_date = row.get(8)?;
    record.date = row.get(9)?;
    record.month = row.get(10)?;
    record.year = row.get(11)?;
    record.debit_account_number = row.get(12)?;
    record.credit_account_number = row.get(13)?;
    record.beneficiary_name = row.get(14)?;
    record.details = row.get(15)?;
    record.source_system = row.get(16)?;

    Ok(RawAccountTransaction {
        record,
        flow_direction: row.get(6)?,
        amounts: [
            (row.get(17)?, row.get(18)?),
            (row.get(19)?, row.get(20)?),
            (row.get(21)?, row.get(22)?),
        ],
    })
}

fn decode_account(raw: RawAccountTransaction) -> Result<AccountTransactionRecord, SyncError> {
    let RawAccountTransaction {
        mut record,
        flow_direction,
        amounts,
    } = raw;

    record.flow_direction = FlowDirection::parse(&flow_direction).ok_or_else(|| {
        SyncError::store(
            "decode flow direction",
            format!("unknown flow direction '{}' for {}", flow_direction, record.id),
        )
    })?;

    let [transaction, settled, domestic] = amounts;
    record.transaction_amount = Amount::new(transaction.0, parse_decimal(&transaction.1)?);
    record.settled_amount = Amount::new(settled.0, parse_decimal(&settled.1)?);
    record.domestic_amount = Amount::new(domestic.0, parse_decimal(&domestic.1)?);
    Ok(record)
}

impl TransactionStore for SqliteTransactionStore {
    fn upsert_products(&self, products: &[Product]) -> Result<(), SyncError> {
        let synced_at = now_epoch_seconds();
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::store("begin upsert products", e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO products (
                        id, product_type, name, account_id, currency, order_index, synced_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        product_type = excluded.product_type,
                        name = excluded.name,
                        account_id = excluded.account_id,
                        currency = excluded.currency,
                        order_index = excluded.order_index,
                        synced_at = excluded.synced_at",
                )
                .map_err(|e| SyncError::store("prepare upsert products", e))?;

            for (index, product) in products.iter().enumerate() {
                stmt.execute(params![
                    product.id,
                    product.product_type.as_str(),
                    product.name,
                    product.linked_account_id,
                    product.currency,
                    index as i64,
                    synced_at,
                ])
                .map_err(|e| SyncError::store(&format!("upsert product {}", product.id), e))?;
            }
        }
        tx.commit()
            .map_err(|e| SyncError::store("commit upsert products", e))
    }

    fn products(&self) -> Result<Vec<Product>, SyncError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, product_type, name, account_id, currency
                 FROM products ORDER BY order_index, id",
            )
            .map_err(|e| SyncError::store("prepare products", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| SyncError::store("query products", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::store("read products", e))?;

        rows.into_iter()
            .map(|(id, product_type, name, linked_account_id, currency)| {
                Ok(Product {
                    id,
                    product_type: ProductType::from_str(&product_type)?,
                    name,
                    linked_account_id,
                    currency,
                })
            })
            .collect()
    }

    fn existing_keys(
        &self,
        family: TransactionFamily,
        product_id: &str,
    ) -> Result<HashSet<TxnKey>, SyncError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, operation_date FROM {} WHERE product_id = ?1",
                family.table()
            ))
            .map_err(|e| SyncError::store("prepare existing keys", e))?;

        let keys = stmt
            .query_map(params![product_id], |row| {
                Ok(TxnKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SyncError::store("query existing keys", e))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| SyncError::store("read existing keys", e))?;
        Ok(keys)
    }

    fn existing_account_ids(&self, product_id: &str) -> Result<HashSet<String>, SyncError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM account_transactions WHERE product_id = ?1")
            .map_err(|e| SyncError::store("prepare existing ids", e))?;

        let ids = stmt
            .query_map(params![product_id], |row| row.get::<_, String>(0))
            .map_err(|e| SyncError::store("query existing ids", e))?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(|e| SyncError::store("read existing ids", e))?;
        Ok(ids)
    }

    fn insert_transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
        records: &[TransactionRecord],
    ) -> Result<usize, SyncError> {
        let synced_at = now_epoch_seconds();
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::store("begin insert", e))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} (
                        product_id, {}, synced_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT(product_id, id, operation_date) DO NOTHING",
                    family.table(),
                    BASE_COLUMNS
                ))
                .map_err(|e| SyncError::store("prepare insert", e))?;

            for record in records {
                inserted += stmt
                    .execute(params![
                        product_id,
                        record.id,
                        record.transaction_type,
                        record.accounting_type,
                        record.state,
                        record.amount.currency,
                        record.amount.value.to_string(),
                        record.correspondent_account_number,
                        record.correspondent_account_name,
                        record.details,
                        record.operation_date,
                        record.workflow_code,
                        record.date,
                        record.year,
                        record.month,
                        synced_at,
                    ])
                    .map_err(|e| {
                        SyncError::store(&format!("insert transaction {}", record.key()), e)
                    })?;
            }
        }

        // Dropping `tx` on any error above rolls the batch back
        tx.commit()
            .map_err(|e| SyncError::store("commit insert", e))?;
        Ok(inserted)
    }

    fn insert_account_transactions(
        &self,
        product_id: &str,
        records: &[AccountTransactionRecord],
    ) -> Result<usize, SyncError> {
        let synced_at = now_epoch_seconds();
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::store("begin insert", e))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO account_transactions (
                        product_id, {}, synced_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                               ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
                     ON CONFLICT(product_id, id) DO NOTHING",
                    ACCOUNT_COLUMNS
                ))
                .map_err(|e| SyncError::store("prepare insert", e))?;

            for record in records {
                inserted += stmt
                    .execute(params![
                        product_id,
                        record.id,
                        record.transaction_id,
                        record.operation_id,
                        record.status,
                        record.transaction_type,
                        record.workflow_code,
                        record.flow_direction.as_str(),
                        record.transaction_date,
                        record.settled_date,
                        record.date,
                        record.month,
                        record.year,
                        record.debit_account_number,
                        record.credit_account_number,
                        record.beneficiary_name,
                        record.details,
                        record.source_system,
                        record.transaction_amount.currency,
                        record.transaction_amount.value.to_string(),
                        record.settled_amount.currency,
                        record.settled_amount.value.to_string(),
                        record.domestic_amount.currency,
                        record.domestic_amount.value.to_string(),
                        synced_at,
                    ])
                    .map_err(|e| {
                        SyncError::store(&format!("insert account transaction {}", record.id), e)
                    })?;
            }
        }

        tx.commit()
            .map_err(|e| SyncError::store("commit insert", e))?;
        Ok(inserted)
    }

    fn update_extended_info(
        &self,
        product_id: &str,
        key: &TxnKey,
        info: &ExtendedInfo,
    ) -> Result<(), SyncError> {
        let conn = self.lock()?;
        let updated = apply_extended_info(&conn, product_id, key, info)?;
        if updated == 0 {
            return Err(SyncError::store(
                "update extended info",
                format!("no unenriched linked transaction {} for {}", key, product_id),
            ));
        }
        Ok(())
    }

    fn update_extended_info_batch(
        &self,
        product_id: &str,
        entries: &[(TxnKey, ExtendedInfo)],
    ) -> Result<usize, SyncError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::store("begin extended info batch", e))?;

        let mut updated = 0;
        for (key, info) in entries {
            updated += apply_extended_info(&tx, product_id, key, info)?;
        }

        tx.commit()
            .map_err(|e| SyncError::store("commit extended info batch", e))?;
        Ok(updated)
    }

    fn records_needing_enrichment(&self, product_id: &str) -> Result<Vec<TxnKey>, SyncError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, operation_date FROM linked_account_transactions
                 WHERE product_id = ?1 AND extended_fetched = 0
                 ORDER BY operation_date, id",
            )
            .map_err(|e| SyncError::store("prepare needing enrichment", e))?;

        let keys = stmt
            .query_map(params![product_id], |row| {
                Ok(TxnKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SyncError::store("query needing enrichment", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::store("read needing enrichment", e))?;
        Ok(keys)
    }

    fn transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
        options: ViewOptions,
    ) -> Result<Vec<TransactionRecord>, SyncError> {
        // Only the linked-account table has extended columns
        let include_extended =
            options.include_extended && family == TransactionFamily::LinkedAccount;
        let order = if options.ascending { "ASC" } else { "DESC" };
        // SQLite treats a negative LIMIT as unbounded
        let (limit, offset) = if options.page_size == 0 {
            (-1, 0)
        } else {
            (
                i64::try_from(options.page_size).unwrap_or(i64::MAX),
                i64::try_from(options.page.saturating_mul(options.page_size)).unwrap_or(i64::MAX),
            )
        };
        let columns = if include_extended {
            format!("{}, {}", BASE_COLUMNS, EXTENDED_COLUMNS)
        } else {
            BASE_COLUMNS.to_string()
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {} WHERE product_id = ?1
                 ORDER BY operation_date {}, id
                 LIMIT ?2 OFFSET ?3",
                columns,
                family.table(),
                order
            ))
            .map_err(|e| SyncError::store("prepare transactions", e))?;

        let raw = stmt
            .query_map(params![product_id, limit, offset], |row| {
                read_transaction_row(row, include_extended)
            })
            .map_err(|e| SyncError::store("query transactions", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::store("read transactions", e))?;

        raw.into_iter()
            .map(|RawTransaction { mut record, amount_value }| {
                record.amount.value = parse_decimal(&amount_value)?;
                Ok(record)
            })
            .collect()
    }

    fn account_transactions(
        &self,
        product_id: &str,
        ascending: bool,
    ) -> Result<Vec<AccountTransactionRecord>, SyncError> {
        let order = if ascending { "ASC" } else { "DESC" };
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM account_transactions WHERE product_id = ?1
                 ORDER BY transaction_date {}, id",
                ACCOUNT_COLUMNS, order
            ))
            .map_err(|e| SyncError::store("prepare account transactions", e))?;

        let raw = stmt
            .query_map(params![product_id], read_account_row)
            .map_err(|e| SyncError::store("query account transactions", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::store("read account transactions", e))?;

        raw.into_iter().map(decode_account).collect()
    }

    fn count_transactions(
        &self,
        family: TransactionFamily,
        product_id: &str,
    ) -> Result<usize, SyncError> {
        let conn = self.lock()?;
        count(
            &conn,
            &format!("SELECT COUNT(*) FROM {} WHERE product_id = ?1", family.table()),
            product_id,
        )
    }

    fn count_account_transactions(&self, product_id: &str) -> Result<usize, SyncError> {
        let conn = self.lock()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM account_transactions WHERE product_id = ?1",
            product_id,
        )
    }
}

fn count(conn: &Connection, sql: &str, product_id: &str) -> Result<usize, SyncError> {
    let n: i64 = conn
        .query_row(sql, params![product_id], |row| row.get(0))
        .map_err(|e| SyncError::store("count", e))?;
    Ok(n as usize)
}

/// Write extended info for one record, only if it was never enriched
///
/// Returns the number of rows changed (0 or 1).
fn apply_extended_info(
    conn: &Connection,
    product_id: &str,
    key: &TxnKey,
    info: &ExtendedInfo,
) -> Result<usize, SyncError> {
    conn.execute(
        "UPDATE linked_account_transactions
         SET beneficiary_name = ?1,
             beneficiary_address = ?2,
             credit_account_number = ?3,
             card_masked_number = ?4,
             ext_operation_id = ?5,
             swift_details = ?6,
             extended_fetched = 1
         WHERE product_id = ?7 AND id = ?8 AND operation_date = ?9 AND extended_fetched = 0",
        params![
            info.beneficiary_name,
            info.beneficiary_address,
            info.credit_account_number,
            info.card_masked_number,
            info.operation_id,
            info.swift_details,
            product_id,
            key.id,
            key.operation_date,
        ],
    )
    .map_err(|e| SyncError::store(&format!("update extended info {}", key), e))
}
