//! Confirmation payload shown before a draft is confirmed

use chrono::NaiveDate;
use serde::Serialize;

use crate::constants::display::{UNKNOWN_CATEGORY, UNKNOWN_POOL};
use crate::types::{
    CashPool, Category, DraftId, TransactionDraft, TransactionType, format_amount,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationAction {
    Confirm,
    Edit,
    Cancel,
}

impl ConfirmationAction {
    pub const ALL: [ConfirmationAction; 3] = [Self::Confirm, Self::Edit, Self::Cancel];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPayload {
    pub draft_id: DraftId,
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub pool_name: String,
    pub currency: Option<String>,
    pub category_name: String,
    pub purpose: Option<String>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub actions: Vec<ConfirmationAction>,
}

impl ConfirmationPayload {
    /// Build from a draft. Ids that no longer resolve fall back to placeholder
    /// names; this never fails.
    pub fn build(draft: &TransactionDraft, pools: &[CashPool], categories: &[Category]) -> Self {
        let fields = &draft.extracted_fields;
        let pool = fields
            .pool_id
            .as_ref()
            .and_then(|id| pools.iter().find(|pool| &pool.id == id));
        let category_name = fields
            .category_id
            .as_ref()
            .and_then(|id| categories.iter().find(|category| &category.id == id))
            .map(|category| category.key.clone())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

        Self {
            draft_id: draft.id.clone(),
            amount: fields.amount,
            transaction_type: fields.transaction_type,
            pool_name: pool
                .map(|pool| pool.name.clone())
                .unwrap_or_else(|| UNKNOWN_POOL.to_string()),
            currency: pool.map(|pool| pool.currency.clone()),
            category_name,
            purpose: fields.purpose.clone(),
            date: fields.date,
            notes: fields.notes.clone(),
            tags: fields.tags.clone().unwrap_or_default(),
            actions: ConfirmationAction::ALL.to_vec(),
        }
    }

    /// One-line summary used in the reply text
    pub fn summary(&self) -> String {
        let kind = match self.transaction_type {
            Some(TransactionType::Income) => "income",
            Some(TransactionType::Expense) => "expense",
            None => "transaction",
        };
        let amount = self.amount.map(format_amount).unwrap_or_else(|| "?".into());
        let amount = match &self.currency {
            Some(currency) => format!("{} {}", currency, amount),
            None => amount,
        };
        let date = self
            .date
            .map(|date| date.to_string())
            .unwrap_or_else(|| "?".into());

        format!(
            "{} of {} for \"{}\" ({}) from {} on {}",
            kind,
            amount,
            self.purpose.as_deref().unwrap_or_default(),
            self.category_name,
            self.pool_name,
            date
        )
    }
}
