//! Transaction draft: the mutable hypothesis assembled over several turns

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::{Result, TallyError};
use super::ids::{CategoryId, ConversationId, DraftId, PoolId, TransactionId, UserId};
use super::utils::ParseWithDefault;

// =============================================================================
// Transaction Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INCOME" => Ok(Self::Income),
            "EXPENSE" => Ok(Self::Expense),
            _ => Err(format!(
                "Unknown transaction type: {}. Valid values: INCOME, EXPENSE",
                s
            )),
        }
    }
}

// =============================================================================
// Draft Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    #[default]
    Active,
    Confirmed,
    Cancelled,
    Finalized,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Finalized => "FINALIZED",
        }
    }

    /// Fields can no longer change once the draft leaves ACTIVE
    pub fn is_immutable(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParseWithDefault for DraftStatus {
    fn type_name() -> &'static str {
        "DraftStatus"
    }

    fn default_value() -> Self {
        DraftStatus::Active
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            "FINALIZED" => Some(Self::Finalized),
            _ => None,
        }
    }
}

// =============================================================================
// Draft Fields
// =============================================================================

/// Field names of a draft, as they appear in the persisted field map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftField {
    PoolId,
    Amount,
    Type,
    CategoryId,
    Purpose,
    Date,
    Notes,
    Tags,
}

impl DraftField {
    /// Required fields, in clarification priority order
    pub const REQUIRED: [DraftField; 6] = [
        Self::PoolId,
        Self::Amount,
        Self::Type,
        Self::CategoryId,
        Self::Purpose,
        Self::Date,
    ];

    pub const ALL: [DraftField; 8] = [
        Self::PoolId,
        Self::Amount,
        Self::Type,
        Self::CategoryId,
        Self::Purpose,
        Self::Date,
        Self::Notes,
        Self::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoolId => "poolId",
            Self::Amount => "amount",
            Self::Type => "type",
            Self::CategoryId => "categoryId",
            Self::Purpose => "purpose",
            Self::Date => "date",
            Self::Notes => "notes",
            Self::Tags => "tags",
        }
    }

    /// Human wording used in replies
    pub fn label(&self) -> &'static str {
        match self {
            Self::PoolId => "cash pool",
            Self::Amount => "amount",
            Self::Type => "transaction type",
            Self::CategoryId => "category",
            Self::Purpose => "description",
            Self::Date => "date",
            Self::Notes => "notes",
            Self::Tags => "tags",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("Unknown draft field: {}", s))
    }
}

/// A typed value for a single draft field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Type(TransactionType),
    Amount(f64),
    /// Pool/category ids, purpose and notes
    Text(String),
    Date(NaiveDate),
    Tags(Vec<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => write!(f, "{}", t),
            Self::Amount(a) => write!(f, "{}", a),
            Self::Text(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d),
            Self::Tags(tags) => write!(f, "{}", tags.join(", ")),
        }
    }
}

/// Partial transaction data. Every field stays optional until filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftFields {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<PoolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DraftFields {
    pub fn get(&self, field: DraftField) -> Option<FieldValue> {
        match field {
            DraftField::PoolId => self
                .pool_id
                .as_ref()
                .map(|id| FieldValue::Text(id.to_string())),
            DraftField::Amount => self.amount.map(FieldValue::Amount),
            DraftField::Type => self.transaction_type.map(FieldValue::Type),
            DraftField::CategoryId => self
                .category_id
                .as_ref()
                .map(|id| FieldValue::Text(id.to_string())),
            DraftField::Purpose => self.purpose.clone().map(FieldValue::Text),
            DraftField::Date => self.date.map(FieldValue::Date),
            DraftField::Notes => self.notes.clone().map(FieldValue::Text),
            DraftField::Tags => self.tags.clone().map(FieldValue::Tags),
        }
    }

    pub fn is_set(&self, field: DraftField) -> bool {
        match field {
            DraftField::PoolId => self.pool_id.is_some(),
            DraftField::Amount => self.amount.is_some(),
            DraftField::Type => self.transaction_type.is_some(),
            DraftField::CategoryId => self.category_id.is_some(),
            DraftField::Purpose => self.purpose.is_some(),
            DraftField::Date => self.date.is_some(),
            DraftField::Notes => self.notes.is_some(),
            DraftField::Tags => self.tags.is_some(),
        }
    }

    /// Set one field. A value of the wrong shape is a caller bug.
    pub fn set(&mut self, field: DraftField, value: FieldValue) -> Result<()> {
        match (field, value) {
            (DraftField::PoolId, FieldValue::Text(id)) => self.pool_id = Some(PoolId::new(id)),
            (DraftField::Amount, FieldValue::Amount(amount)) => self.amount = Some(amount),
            (DraftField::Type, FieldValue::Type(t)) => self.transaction_type = Some(t),
            (DraftField::CategoryId, FieldValue::Text(id)) => {
                self.category_id = Some(CategoryId::new(id))
            }
            (DraftField::Purpose, FieldValue::Text(text)) => self.purpose = Some(text),
            (DraftField::Date, FieldValue::Date(date)) => self.date = Some(date),
            (DraftField::Notes, FieldValue::Text(text)) => self.notes = Some(text),
            (DraftField::Tags, FieldValue::Tags(tags)) => self.tags = Some(tags),
            (field, value) => {
                return Err(TallyError::invariant(format!(
                    "value {:?} does not fit draft field '{}'",
                    value, field
                )));
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, field: DraftField) {
        match field {
            DraftField::PoolId => self.pool_id = None,
            DraftField::Amount => self.amount = None,
            DraftField::Type => self.transaction_type = None,
            DraftField::CategoryId => self.category_id = None,
            DraftField::Purpose => self.purpose = None,
            DraftField::Date => self.date = None,
            DraftField::Notes => self.notes = None,
            DraftField::Tags => self.tags = None,
        }
    }

    /// Shallow merge: fields set in `other` overwrite, unset ones are kept
    pub fn merge(&mut self, other: &DraftFields) {
        for field in DraftField::ALL {
            if let Some(value) = other.get(field) {
                // Shapes always line up when copying between DraftFields.
                let _ = self.set(field, value);
            }
        }
    }

    /// Fields that carry a value
    pub fn set_fields(&self) -> Vec<DraftField> {
        DraftField::ALL
            .into_iter()
            .filter(|field| self.is_set(*field))
            .collect()
    }
}

/// Field name -> confidence in [0, 1]
pub type ConfidenceMap = BTreeMap<DraftField, f64>;

/// Confidence reserved for values the user typed or confirmed
pub const USER_PROVIDED_CONFIDENCE: f64 = 1.0;

/// Whether a confidence score is a legal value
pub fn is_valid_confidence(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

// =============================================================================
// Transaction Draft
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    pub id: DraftId,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub status: DraftStatus,
    pub extracted_fields: DraftFields,
    pub confidence_map: ConfidenceMap,
    /// Derived by the validator, never set by hand
    pub missing_fields: Vec<DraftField>,
    pub is_deleted: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionDraft {
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    pub fn is_immutable(&self) -> bool {
        self.status.is_immutable()
    }
}

/// Partial update applied by the draft store in one write
#[derive(Debug, Clone, Default)]
pub struct DraftPatch {
    pub extracted_fields: Option<DraftFields>,
    pub confidence_map: Option<ConfidenceMap>,
    pub missing_fields: Option<Vec<DraftField>>,
}
