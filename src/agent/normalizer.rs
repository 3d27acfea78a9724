//! Extraction normalizer
//!
//! Validates the raw extraction reply and turns it into typed candidate
//! fields. The reply is adversarial input: every key and value is checked
//! and the first failure wins.
//!
//! Check order:
//! 1. JSON syntax ............................ MALFORMED_JSON
//! 2. top level is an object ................. INVALID_SCHEMA
//! 3. every required key present ............. INVALID_SCHEMA
//! 4. no key outside the allowed set ......... UNKNOWN_KEY
//! 5. transactionType in {INCOME, EXPENSE} ... HALLUCINATED_ENUM
//! 6. amount is a number ..................... INVALID_TYPE
//! 7. hint/description values are strings .... INVALID_TYPE
//! 8. confidence object shape / levels ....... INVALID_SCHEMA / UNKNOWN_KEY / HALLUCINATED_ENUM

use serde_json::{Map, Value};

use crate::constants::confidence;
use crate::types::{
    ConfidenceMap, DraftField, DraftFields, ExtractionError, ExtractionErrorKind, TransactionType,
    non_empty_trimmed,
};

pub const KEY_TRANSACTION_TYPE: &str = "transactionType";
pub const KEY_AMOUNT: &str = "amount";
pub const KEY_CASH_POOL_HINT: &str = "cashPoolHint";
pub const KEY_CATEGORY_HINT: &str = "categoryHint";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_DATE_HINT: &str = "dateHint";
pub const KEY_CONFIDENCE: &str = "confidence";

/// Keys that carry a value and a confidence level
const VALUE_KEYS: [&str; 6] = [
    KEY_TRANSACTION_TYPE,
    KEY_AMOUNT,
    KEY_CASH_POOL_HINT,
    KEY_CATEGORY_HINT,
    KEY_DESCRIPTION,
    KEY_DATE_HINT,
];

/// Every top-level key; all are required
const ALLOWED_KEYS: [&str; 7] = [
    KEY_TRANSACTION_TYPE,
    KEY_AMOUNT,
    KEY_CASH_POOL_HINT,
    KEY_CATEGORY_HINT,
    KEY_DESCRIPTION,
    KEY_DATE_HINT,
    KEY_CONFIDENCE,
];

const STRING_KEYS: [&str; 4] = [
    KEY_CASH_POOL_HINT,
    KEY_CATEGORY_HINT,
    KEY_DESCRIPTION,
    KEY_DATE_HINT,
];

/// Confidence level as reported by the extraction service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Self::High => confidence::HIGH,
            Self::Medium => confidence::MEDIUM,
            Self::Low => confidence::LOW,
        }
    }
}

/// Raw hints. Never written to the draft without resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    pub cash_pool: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
}

/// Scores for the three hints, taken from the confidence object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HintConfidence {
    pub cash_pool: f64,
    pub category: f64,
    pub date: f64,
}

impl Default for HintConfidence {
    fn default() -> Self {
        Self {
            cash_pool: confidence::LOW,
            category: confidence::LOW,
            date: confidence::LOW,
        }
    }
}

/// Validated extraction for one turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedExtraction {
    /// Only `type`, `amount` and `purpose` are ever set here
    pub fields: DraftFields,
    /// Scores for the set entries of `fields`
    pub confidence: ConfidenceMap,
    pub hints: Hints,
    pub hint_confidence: HintConfidence,
}

fn error(kind: ExtractionErrorKind, key: &str, message: impl Into<String>) -> ExtractionError {
    ExtractionError::new(kind, message).with_field(key)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_confidence(value: &Value) -> Result<[f64; 6], ExtractionError> {
    let Some(object) = value.as_object() else {
        return Err(error(
            ExtractionErrorKind::InvalidSchema,
            KEY_CONFIDENCE,
            format!("expected object, got {}", json_type_name(value)),
        ));
    };

    if let Some(key) = VALUE_KEYS.iter().find(|key| !object.contains_key(**key)) {
        return Err(error(
            ExtractionErrorKind::InvalidSchema,
            KEY_CONFIDENCE,
            format!("missing confidence for '{}'", key),
        ));
    }

    if let Some(key) = object.keys().find(|key| !VALUE_KEYS.contains(&key.as_str())) {
        return Err(error(
            ExtractionErrorKind::UnknownKey,
            KEY_CONFIDENCE,
            format!("unexpected confidence key '{}'", key),
        ));
    }

    let mut scores = [0.0; 6];
    for (slot, key) in scores.iter_mut().zip(VALUE_KEYS) {
        let level = object
            .get(key)
            .and_then(Value::as_str)
            .and_then(ConfidenceLevel::parse)
            .ok_or_else(|| {
                error(
                    ExtractionErrorKind::HallucinatedEnum,
                    KEY_CONFIDENCE,
                    format!("confidence for '{}' must be HIGH, MEDIUM or LOW", key),
                )
            })?;
        *slot = level.score();
    }
    Ok(scores)
}

fn parse_transaction_type(value: &Value) -> Result<Option<TransactionType>, ExtractionError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s == "INCOME" => Ok(Some(TransactionType::Income)),
        Value::String(s) if s == "EXPENSE" => Ok(Some(TransactionType::Expense)),
        other => Err(error(
            ExtractionErrorKind::HallucinatedEnum,
            KEY_TRANSACTION_TYPE,
            format!("expected INCOME, EXPENSE or null, got {}", other),
        )),
    }
}

fn parse_amount(value: &Value) -> Result<Option<f64>, ExtractionError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| {
            error(
                ExtractionErrorKind::InvalidType,
                KEY_AMOUNT,
                "number out of range",
            )
        }),
        other => Err(error(
            ExtractionErrorKind::InvalidType,
            KEY_AMOUNT,
            format!("expected number or null, got {}", json_type_name(other)),
        )),
    }
}

fn parse_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>, ExtractionError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(non_empty_trimmed(s)),
        Some(other) => Err(error(
            ExtractionErrorKind::InvalidType,
            key,
            format!("expected string or null, got {}", json_type_name(other)),
        )),
    }
}

/// Validate and normalize one raw extraction reply
pub fn normalize(raw: &str) -> Result<NormalizedExtraction, ExtractionError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        ExtractionError::new(
            ExtractionErrorKind::MalformedJson,
            format!("response is not valid JSON: {}", e),
        )
    })?;

    let Some(object) = value.as_object() else {
        return Err(ExtractionError::new(
            ExtractionErrorKind::InvalidSchema,
            format!("expected a JSON object, got {}", json_type_name(&value)),
        ));
    };

    for key in ALLOWED_KEYS {
        if !object.contains_key(key) {
            return Err(error(
                ExtractionErrorKind::InvalidSchema,
                key,
                "required key is missing",
            ));
        }
    }

    if let Some(key) = object
        .keys()
        .find(|key| !ALLOWED_KEYS.contains(&key.as_str()))
    {
        return Err(error(
            ExtractionErrorKind::UnknownKey,
            key,
            "key is not part of the extraction schema",
        ));
    }

    let transaction_type = parse_transaction_type(&object[KEY_TRANSACTION_TYPE])?;
    let amount = parse_amount(&object[KEY_AMOUNT])?;

    let mut strings = [None, None, None, None];
    for (slot, key) in strings.iter_mut().zip(STRING_KEYS) {
        *slot = parse_string(object, key)?;
    }
    let [cash_pool, category, description, date] = strings;

    let [type_score, amount_score, pool_score, category_score, description_score, date_score] =
        parse_confidence(&object[KEY_CONFIDENCE])?;

    let fields = DraftFields {
        transaction_type,
        amount,
        purpose: description,
        ..Default::default()
    };

    let mut confidence = ConfidenceMap::new();
    for (field, score) in [
        (DraftField::Type, type_score),
        (DraftField::Amount, amount_score),
        (DraftField::Purpose, description_score),
    ] {
        if fields.is_set(field) {
            confidence.insert(field, score);
        }
    }

    Ok(NormalizedExtraction {
        fields,
        confidence,
        hints: Hints {
            cash_pool,
            category,
            date,
        },
        hint_confidence: HintConfidence {
            cash_pool: pool_score,
            category: category_score,
            date: date_score,
        },
    })
}
