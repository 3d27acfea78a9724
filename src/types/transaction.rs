//! Ledger transaction records produced by finalization

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::draft::TransactionType;
use super::ids::{CategoryId, PoolId, TransactionId, UserId};

/// Input accepted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub user_id: UserId,
    pub pool_id: PoolId,
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category_id: CategoryId,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub date: NaiveDate,
}

/// A persisted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub pool_id: PoolId,
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub category_id: CategoryId,
    pub purpose: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}
