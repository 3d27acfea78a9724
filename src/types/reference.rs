//! User-owned reference data the agent resolves hints against

use serde::{Deserialize, Serialize};

use super::draft::TransactionType;
use super::ids::{CategoryId, PoolId, UserId};

/// A cash pool (wallet, bank account, ...) money moves in and out of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashPool {
    pub id: PoolId,
    pub user_id: UserId,
    pub name: String,
    pub currency: String,
    pub balance: f64,
    pub is_active: bool,
}

impl CashPool {
    /// Option label shown when asking which pool to use
    pub fn display_label(&self) -> String {
        format!("{} ({} {:.2})", self.name, self.currency, self.balance)
    }
}

/// A transaction category, scoped to one transaction type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub user_id: UserId,
    pub key: String,
    #[serde(rename = "type")]
    pub category_type: TransactionType,
    pub icon: String,
    pub color: String,
}

impl Category {
    pub fn display_label(&self) -> String {
        format!("{} {}", self.icon, self.key)
    }
}
