//! Reply parser for a single pending field
//!
//! `None` means "could not parse"; the caller re-asks instead of storing
//! anything.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

use crate::types::{DraftField, FieldValue, TransactionType, non_empty_trimmed};

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?").expect("valid regex")
});

static INCOME_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:income|received|receive|earned|earn|got paid|salary)\b")
        .expect("valid regex")
});

static EXPENSE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:expense|spent|spend|paid|pay|bought)\b").expect("valid regex")
});

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// First numeric token, thousands separators allowed. Sign is kept so the
/// validator can reject negatives with a proper message.
pub fn parse_amount(text: &str) -> Option<f64> {
    let token = AMOUNT.find(text)?.as_str().replace(',', "");
    token.parse::<f64>().ok().filter(|amount| amount.is_finite())
}

/// Income keywords win when both families appear
pub fn parse_type(text: &str) -> Option<TransactionType> {
    if INCOME_WORDS.is_match(text) {
        Some(TransactionType::Income)
    } else if EXPENSE_WORDS.is_match(text) {
        Some(TransactionType::Expense)
    } else {
        None
    }
}

/// Relative words, then a handful of calendar formats
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim().trim_end_matches('.');
    match text.to_lowercase().as_str() {
        "today" => return Some(today),
        "yesterday" => return Some(today - Duration::days(1)),
        "tomorrow" => return Some(today + Duration::days(1)),
        "last week" => return Some(today - Duration::weeks(1)),
        _ => {}
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Comma separated, blanks dropped
pub fn parse_tags(text: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = text.split(',').filter_map(non_empty_trimmed).collect();
    (!tags.is_empty()).then_some(tags)
}

/// Typed value for `field` out of a direct answer.
///
/// Pool and category replies come back as trimmed text; turning them into
/// identifiers is the caller's job.
pub fn parse_reply(field: DraftField, reply: &str, today: NaiveDate) -> Option<FieldValue> {
    match field {
        DraftField::Amount => parse_amount(reply).map(FieldValue::Amount),
        DraftField::Type => parse_type(reply).map(FieldValue::Type),
        DraftField::Date => parse_date(reply, today).map(FieldValue::Date),
        DraftField::Tags => parse_tags(reply).map(FieldValue::Tags),
        DraftField::PoolId | DraftField::CategoryId | DraftField::Purpose | DraftField::Notes => {
            non_empty_trimmed(reply).map(FieldValue::Text)
        }
    }
}
