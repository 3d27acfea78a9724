//! Edit intent detection for corrections during confirmation
//!
//! Each field family has a trigger and an extraction pattern. Families are
//! tried in a fixed order; the first whose trigger and pattern both match
//! wins. No match means the intent is unclear and nothing is guessed.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::types::DraftField;

/// Target field plus the raw replacement text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditIntent {
    pub field: DraftField,
    pub new_value: String,
}

struct Family {
    field: DraftField,
    trigger: Regex,
    /// Capture group 1 holds the value
    pattern: Regex,
}

impl Family {
    fn new(field: DraftField, trigger: &str, pattern: &str) -> Self {
        Self {
            field,
            trigger: Regex::new(trigger).expect("valid trigger regex"),
            pattern: Regex::new(pattern).expect("valid pattern regex"),
        }
    }

    fn extract(&self, text: &str) -> Option<String> {
        if !self.trigger.is_match(text) {
            return None;
        }
        let captured = self.pattern.captures(text)?.get(1)?.as_str();
        let value = captured
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '.' | '!' | '?' | ','))
            .trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

static FAMILIES: LazyLock<Vec<Family>> = LazyLock::new(|| {
    vec![
        Family::new(
            DraftField::Notes,
            r"(?i)\b(?:notes?|add\s+note)\b",
            r"(?i)\b(?:add\s+(?:a\s+)?note|notes?)\b\s*:?\s*(.+)$",
        ),
        Family::new(
            DraftField::Date,
            r"(?i)\b(?:today|yesterday|tomorrow|last\s+week|date)\b|\b\d{4}-\d{2}-\d{2}\b",
            r"(?i)\b(today|yesterday|tomorrow|last\s+week|\d{4}-\d{2}-\d{2})\b",
        ),
        Family::new(
            DraftField::Amount,
            r"(?i)\b(?:amount|it\s+was|change\s+(?:it\s+)?to|should\s+be|make\s+it|actually)\b|[$€£₹]",
            r"[$€£₹]?\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)",
        ),
        Family::new(
            DraftField::CategoryId,
            r"(?i)\bcategory\b",
            r"(?i)\bcategory\b\s*(?:(?:is|to|should\s+be|was)\s+|:\s*)?(.+)$",
        ),
        Family::new(
            DraftField::PoolId,
            r"(?i)\b(?:cash\s+pool|pool|wallet|account|from)\b",
            r"(?i)(?:\b(?:cash\s+pool|pool|from|use)\b\s*(?:(?:is|to|should\s+be|was)\s+)?|\b(?:wallet|account)\s+(?:is|to|should\s+be|was)\s+)(?:my\s+|the\s+)?(.+?)(?:\s+(?:wallet|account)\b.*|\s+not\b.*)?$",
        ),
        Family::new(
            DraftField::Type,
            r"(?i)\b(?:income|expense)\b",
            r"(?i)\b(income|expense)\b",
        ),
        Family::new(
            DraftField::Purpose,
            r"(?i)\b(?:description|purpose|for)\b",
            r"(?i)\b(?:description|purpose|for)\b\s*(?:(?:is|to|should\s+be|was)\s+|:\s*)?(.+)$",
        ),
    ]
});

/// Detect which field a free-text correction targets
pub fn detect(message: &str) -> Option<EditIntent> {
    let message = message.trim();
    let intent = FAMILIES.iter().find_map(|family| {
        family.extract(message).map(|new_value| EditIntent {
            field: family.field,
            new_value,
        })
    });
    match &intent {
        Some(intent) => debug!(field = %intent.field, "edit intent detected"),
        None => debug!("edit intent unclear"),
    }
    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(field: DraftField, value: &str) -> Option<EditIntent> {
        Some(EditIntent {
            field,
            new_value: value.into(),
        })
    }

    #[test]
    fn test_amount_corrections() {
        assert_eq!(detect("actually it was 650"), intent(DraftField::Amount, "650"));
        assert_eq!(
            detect("the amount is $1,200.50"),
            intent(DraftField::Amount, "1,200.50")
        );
        assert_eq!(detect("make it 20"), intent(DraftField::Amount, "20"));
    }

    #[test]
    fn test_pool_corrections() {
        assert_eq!(
            detect("it should come from my savings account"),
            intent(DraftField::PoolId, "savings")
        );
        assert_eq!(
            detect("use the travel wallet not the main one"),
            intent(DraftField::PoolId, "travel")
        );
        assert_eq!(
            detect("change cash pool to Bank"),
            intent(DraftField::PoolId, "Bank")
        );
        assert_eq!(
            detect("change the wallet to Bank"),
            intent(DraftField::PoolId, "Bank")
        );
        assert_eq!(
            detect("the account should be my Savings account"),
            intent(DraftField::PoolId, "Savings")
        );
    }

    #[test]
    fn test_category_and_purpose() {
        assert_eq!(
            detect("change the category to dining out"),
            intent(DraftField::CategoryId, "dining out")
        );
        assert_eq!(
            detect("description: weekly groceries"),
            intent(DraftField::Purpose, "weekly groceries")
        );
        assert_eq!(
            detect("it was for dinner with friends"),
            intent(DraftField::Purpose, "dinner with friends")
        );
    }

    #[test]
    fn test_date_type_notes() {
        assert_eq!(detect("it was yesterday"), intent(DraftField::Date, "yesterday"));
        assert_eq!(
            detect("change the date to 2024-01-05"),
            intent(DraftField::Date, "2024-01-05")
        );
        assert_eq!(detect("it's income"), intent(DraftField::Type, "income"));
        assert_eq!(
            detect("add note: paid by card"),
            intent(DraftField::Notes, "paid by card")
        );
    }

    #[test]
    fn test_trigger_without_value_falls_through() {
        // "actually" triggers amount but carries no number
        assert_eq!(
            detect("actually the category is travel"),
            intent(DraftField::CategoryId, "travel")
        );
        assert_eq!(detect("the date is wrong"), None);
    }

    #[test]
    fn test_unclear() {
        assert_eq!(detect("hmm"), None);
        assert_eq!(detect("   "), None);
        assert_eq!(detect("that's not right"), None);
    }
}
