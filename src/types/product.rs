//! Product types for the sync engine
//!
//! A product is either a card or an account. Cards may reference a linked
//! account whose event feed mirrors (and extends) the card's own feed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SyncError;

/// Kind of product the remote institution exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    /// Payment card, synced from the card feed and optionally its linked account
    Card,
    /// Current or savings account, synced from the account-history feed
    Account,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Card => "CARD",
            ProductType::Account => "ACCOUNT",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(ProductType::Card),
            "ACCOUNT" => Ok(ProductType::Account),
            other => Err(SyncError::invalid_product_type(other)),
        }
    }
}

/// A card or account known to the remote institution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Remote product identifier
    pub id: String,

    /// Whether this is a card or an account
    #[serde(rename = "productType")]
    pub product_type: ProductType,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// For cards: the account whose event feed carries the linked-account view
    #[serde(rename = "accountId", default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<String>,

    #[serde(default)]
    pub currency: String,
}

impl Product {
    /// Create a card product
    ///
    /// An empty `linked_account_id` is treated as absent.
    pub fn card(id: impl Into<String>, linked_account_id: Option<&str>) -> Self {
        Product {
            id: id.into(),
            product_type: ProductType::Card,
            name: String::new(),
            linked_account_id: linked_account_id
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            currency: String::new(),
        }
    }

    /// Create an account product
    pub fn account(id: impl Into<String>) -> Self {
        Product {
            id: id.into(),
            product_type: ProductType::Account,
            name: String::new(),
            linked_account_id: None,
            currency: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
