//! Transaction-related types for the sync engine
//!
//! This module defines the records delivered by the three remote feeds, the
//! composite key that identifies card and linked-account records, and the
//! extended (enrichment) payload that linked-account records may carry.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::SyncError;

/// Monetary amount with its currency code
///
/// The card and linked-account feeds name the numeric field `amount`, the
/// account-history feed names it `value`; both deserialize into this type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// ISO currency code as reported by the remote system
    #[serde(default)]
    pub currency: String,

    /// Exact decimal value (never a float)
    #[serde(alias = "amount")]
    pub value: Decimal,
}

impl Amount {
    pub fn new(currency: impl Into<String>, value: Decimal) -> Self {
        Self {
            currency: currency.into(),
            value,
        }
    }

    /// Key used to bucket records of equal amount
    ///
    /// The decimal is normalized so that `500` and `500.00` share a bucket.
    pub fn bucket_key(&self) -> (String, Decimal) {
        (self.currency.clone(), self.value.normalize())
    }
}

/// Composite identity of a card or linked-account transaction
///
/// The remote system reuses an `id` across lifecycle states (a pending hold
/// and its settlement, for example) with different operation dates, so the
/// pair is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnKey {
    pub id: String,
    pub operation_date: String,
}

impl TxnKey {
    pub fn new(id: impl Into<String>, operation_date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation_date: operation_date.into(),
        }
    }
}

impl fmt::Display for TxnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.id, self.operation_date)
    }
}

/// Classification of a card or linked-account transaction
///
/// Parsed from the free-form `transactionType` string. Strings that do not
/// name a known classification are kept verbatim in [`TransactionKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionKind {
    /// Card settlement mirrored into the linked account (delayed timestamp)
    Card,
    TransferToCard,
    TransferLocal,
    Exchange,
    CashOut,
    TransferBetweenOwnAccounts,
    Other(String),
}

impl TransactionKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "card" => Self::Card,
            "transfer:to-card" => Self::TransferToCard,
            "transfer:local" => Self::TransferLocal,
            "exchange" => Self::Exchange,
            "cash-out" => Self::CashOut,
            "transfer:between-own-accounts" => Self::TransferBetweenOwnAccounts,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Card => "card",
            Self::TransferToCard => "transfer:to-card",
            Self::TransferLocal => "transfer:local",
            Self::Exchange => "exchange",
            Self::CashOut => "cash-out",
            Self::TransferBetweenOwnAccounts => "transfer:between-own-accounts",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for TransactionKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TransactionKind> for String {
    fn from(kind: TransactionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Resolved details of a linked-account transaction
///
/// Populated by the enrichment step from a per-transaction detail lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedInfo {
    pub beneficiary_name: String,
    pub beneficiary_address: String,
    pub credit_account_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_masked_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Nested SWIFT-style detail object, serialized as JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift_details: Option<String>,
}

impl ExtendedInfo {
    /// Build the persisted form of a detail lookup result
    ///
    /// # Arguments
    ///
    /// * `id` - Transaction id the detail belongs to (used for error context)
    /// * `detail` - The raw payload returned by the feed
    ///
    /// # Returns
    ///
    /// * `Ok(ExtendedInfo)` - With empty optional fields mapped to `None`
    /// * `Err(SyncError::Encode)` - If the nested detail object cannot be serialized
    pub fn from_detail(id: &str, detail: TransactionDetail) -> Result<Self, SyncError> {
        let (card_masked_number, operation_id) = match detail.additional_info {
            Some(info) => (
                info.card_masked_number.filter(|s| !s.is_empty()),
                info.processed_operation_id.filter(|s| !s.is_empty()),
            ),
            None => (None, None),
        };

        let swift_details = detail
            .transaction_swift_details
            .map(|value| serde_json::to_string(&value))
            .transpose()
            .map_err(|e| SyncError::encode(id, &e.to_string()))?;

        Ok(Self {
            beneficiary_name: detail.beneficiary_name,
            beneficiary_address: detail.beneficiary_address,
            credit_account_number: detail.credit_account_number,
            card_masked_number,
            operation_id,
            swift_details,
        })
    }
}

/// Enrichment state of a linked-account transaction
///
/// A record moves from `NotFetched` to `Fetched` at most once. A fetched
/// record with an empty beneficiary name is still distinguishable from one
/// that was never enriched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ExtendedInfo>", into = "Option<ExtendedInfo>")]
pub enum Enrichment {
    #[default]
    NotFetched,
    Fetched(ExtendedInfo),
}

impl Enrichment {
    pub fn is_not_fetched(&self) -> bool {
        matches!(self, Enrichment::NotFetched)
    }

    pub fn info(&self) -> Option<&ExtendedInfo> {
        match self {
            Enrichment::Fetched(info) => Some(info),
            Enrichment::NotFetched => None,
        }
    }
}

impl From<Option<ExtendedInfo>> for Enrichment {
    fn from(value: Option<ExtendedInfo>) -> Self {
        match value {
            Some(info) => Enrichment::Fetched(info),
            None => Enrichment::NotFetched,
        }
    }
}

impl From<Enrichment> for Option<ExtendedInfo> {
    fn from(value: Enrichment) -> Self {
        match value {
            Enrichment::Fetched(info) => Some(info),
            Enrichment::NotFetched => None,
        }
    }
}

/// Card-feed or linked-account-feed transaction
///
/// Both feeds share this shape. Everything except `extended` is immutable
/// once the record is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionRecord {
    /// Remote-assigned id (not unique on its own, see [`TxnKey`])
    pub id: String,

    /// Free-form classification string, see [`TransactionKind`]
    pub transaction_type: String,

    pub accounting_type: String,
    pub state: String,
    pub amount: Amount,
    pub correspondent_account_number: String,
    pub correspondent_account_name: String,
    pub details: String,

    /// ISO-8601 timestamp on the remote clock
    pub operation_date: String,

    pub workflow_code: String,
    pub date: String,
    pub year: String,
    pub month: String,

    #[serde(skip_serializing_if = "Enrichment::is_not_fetched")]
    pub extended: Enrichment,
}

impl TransactionRecord {
    pub fn key(&self) -> TxnKey {
        TxnKey::new(self.id.clone(), self.operation_date.clone())
    }

    pub fn kind(&self) -> TransactionKind {
        TransactionKind::parse(&self.transaction_type)
    }

    /// Parse `operation_date` as RFC 3339
    ///
    /// Returns `None` for anything that does not parse; callers decide how
    /// to degrade.
    pub fn parsed_operation_date(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.operation_date).ok()
    }
}

/// Optional sub-object of a detail lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalInfo {
    pub card_masked_number: Option<String>,
    pub processed_operation_id: Option<String>,
}

/// Raw result of a per-transaction detail lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionDetail {
    pub beneficiary_name: String,
    pub beneficiary_address: String,
    pub credit_account_number: String,
    pub additional_info: Option<AdditionalInfo>,
    pub transaction_swift_details: Option<serde_json::Value>,
}

/// Direction of money flow for an account-history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowDirection {
    Inbound,
    Outbound,
}

impl FlowDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowDirection::Inbound => "INBOUND",
            FlowDirection::Outbound => "OUTBOUND",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INBOUND" => Some(FlowDirection::Inbound),
            "OUTBOUND" => Some(FlowDirection::Outbound),
            _ => None,
        }
    }
}

/// Account-history transaction
///
/// Unlike card records, `id` is unique per product so no composite key is
/// needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransactionRecord {
    pub id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub workflow_code: String,
    pub flow_direction: FlowDirection,

    /// Epoch milliseconds
    #[serde(default)]
    pub transaction_date: i64,
    /// Epoch milliseconds
    #[serde(default)]
    pub settled_date: i64,

    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub debit_account_number: String,
    #[serde(default)]
    pub credit_account_number: String,
    #[serde(default)]
    pub beneficiary_name: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub source_system: String,

    /// Amount as transacted
    #[serde(default)]
    pub transaction_amount: Amount,
    /// Amount as settled
    #[serde(default)]
    pub settled_amount: Amount,
    /// Amount in domestic currency
    #[serde(default)]
    pub domestic_amount: Amount,
}

impl AccountTransactionRecord {
    /// Minimal record with the given id, direction and timestamp
    pub fn new(
        id: impl Into<String>,
        flow_direction: FlowDirection,
        transaction_date: i64,
    ) -> Self {
        Self {
            id: id.into(),
            transaction_id: String::new(),
            operation_id: String::new(),
            status: String::new(),
            transaction_type: String::new(),
            workflow_code: String::new(),
            flow_direction,
            transaction_date,
            settled_date: 0,
            date: String::new(),
            month: String::new(),
            year: String::new(),
            debit_account_number: String::new(),
            credit_account_number: String::new(),
            beneficiary_name: String::new(),
            details: String::new(),
            source_system: String::new(),
            transaction_amount: Amount::default(),
            settled_amount: Amount::default(),
            domestic_amount: Amount::default(),
        }
    }
}

/// One page of the account-history feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPage {
    pub transactions: Vec<AccountTransactionRecord>,
    /// Continuation flag reported by the feed
    pub has_next: bool,
}
