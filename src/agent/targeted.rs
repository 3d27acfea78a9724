//! Single-field extraction for confirmation-step edits
//!
//! The whole message is extracted again with the draft as context, then only
//! the requested field is kept. When the extraction has nothing for that
//! field, the edit's own replacement text is parsed instead.

use chrono::NaiveDate;
use tracing::debug;

use super::clarification::parser;
use super::edit_intent::EditIntent;
use super::hints::{self, Resolution};
use super::normalizer;
use crate::ai::SharedExtractionService;
use crate::constants::confidence;
use crate::types::{CashPool, Category, DraftField, DraftFields, FieldValue, Result};

/// Replacement value for one field
#[derive(Debug, Clone, PartialEq)]
pub struct TargetedValue {
    pub field: DraftField,
    pub value: FieldValue,
    pub confidence: f64,
}

pub struct TargetedFieldExtractor {
    extraction: SharedExtractionService,
    default_confidence: f64,
}

impl TargetedFieldExtractor {
    pub fn new(extraction: SharedExtractionService) -> Self {
        Self {
            extraction,
            default_confidence: confidence::TARGETED_DEFAULT,
        }
    }

    pub fn with_default_confidence(mut self, value: f64) -> Self {
        self.default_confidence = value;
        self
    }

    /// `Ok(None)` when neither the extraction nor the edit text yields a value.
    /// Extraction failures propagate.
    pub async fn extract(
        &self,
        message: &str,
        intent: &EditIntent,
        current: &DraftFields,
        pools: &[CashPool],
        categories: &[Category],
        today: NaiveDate,
    ) -> Result<Option<TargetedValue>> {
        let raw = self.extraction.extract(message, Some(current)).await?;
        let normalized = normalizer::normalize(&raw)?;
        let resolved = hints::resolve_extraction(&normalized, current, pools, categories, today);

        let field = intent.field;
        if let Some(value) = resolved.fields.get(field) {
            let score = resolved
                .confidence
                .get(&field)
                .copied()
                .unwrap_or(self.default_confidence);
            debug!(field = %field, source = "extraction", "targeted value found");
            return Ok(Some(TargetedValue {
                field,
                value,
                confidence: score,
            }));
        }

        let fallback = parse_edit_value(intent, current, pools, categories, today);
        if fallback.is_some() {
            debug!(field = %field, source = "edit text", "targeted value found");
        }
        Ok(fallback.map(|value| TargetedValue {
            field,
            value,
            confidence: self.default_confidence,
        }))
    }
}

/// Parse the replacement text captured by the edit detector
fn parse_edit_value(
    intent: &EditIntent,
    current: &DraftFields,
    pools: &[CashPool],
    categories: &[Category],
    today: NaiveDate,
) -> Option<FieldValue> {
    let text = intent.new_value.as_str();
    match intent.field {
        DraftField::PoolId => match hints::resolve_pool(Some(text), pools) {
            Resolution::Resolved(id) => Some(FieldValue::Text(id.into_inner())),
            _ => None,
        },
        DraftField::CategoryId => {
            match hints::resolve_category(Some(text), categories, current.transaction_type) {
                Resolution::Resolved(id) => Some(FieldValue::Text(id.into_inner())),
                _ => None,
            }
        }
        field => parser::parse_reply(field, text, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ExtractionService;
    use crate::types::{PoolId, TallyError, TransactionType, UserId};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fixed(std::result::Result<String, ()>);

    #[async_trait]
    impl ExtractionService for Fixed {
        async fn extract(&self, _message: &str, _context: Option<&DraftFields>) -> Result<String> {
            self.0.clone().map_err(|_| TallyError::timeout("extraction", Default::default()))
        }
    }

    fn response(amount: Option<f64>, pool_hint: Option<&str>) -> String {
        serde_json::json!({
            "transactionType": "EXPENSE",
            "amount": amount,
            "cashPoolHint": pool_hint,
            "categoryHint": null,
            "description": "groceries",
            "dateHint": null,
            "confidence": {
                "transactionType": "HIGH",
                "amount": "HIGH",
                "cashPoolHint": "MEDIUM",
                "categoryHint": "LOW",
                "description": "HIGH",
                "dateHint": "LOW"
            }
        })
        .to_string()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn current() -> DraftFields {
        DraftFields {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(500.0),
            date: Some(today()),
            ..Default::default()
        }
    }

    fn pools() -> Vec<CashPool> {
        vec![CashPool {
            id: PoolId::new("p-bank"),
            user_id: UserId::new("u1"),
            name: "Bank".into(),
            currency: "USD".into(),
            balance: 10.0,
            is_active: true,
        }]
    }

    fn extractor(result: std::result::Result<String, ()>) -> TargetedFieldExtractor {
        TargetedFieldExtractor::new(Arc::new(Fixed(result)))
    }

    #[tokio::test]
    async fn test_takes_only_requested_field_from_extraction() {
        let intent = EditIntent {
            field: DraftField::Amount,
            new_value: "650".into(),
        };
        let value = extractor(Ok(response(Some(650.0), Some("bank"))))
            .extract("actually it was 650", &intent, &current(), &pools(), &[], today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(value.field, DraftField::Amount);
        assert_eq!(value.value, FieldValue::Amount(650.0));
        assert_eq!(value.confidence, confidence::HIGH);
    }

    #[tokio::test]
    async fn test_falls_back_to_edit_text() {
        let intent = EditIntent {
            field: DraftField::PoolId,
            new_value: "bank".into(),
        };
        let value = extractor(Ok(response(None, None)))
            .with_default_confidence(0.4)
            .extract("use the bank", &intent, &current(), &pools(), &[], today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(value.value, FieldValue::Text("p-bank".into()));
        assert_eq!(value.confidence, 0.4);
    }

    #[tokio::test]
    async fn test_unresolvable_edit_is_none() {
        let intent = EditIntent {
            field: DraftField::PoolId,
            new_value: "savings".into(),
        };
        let value = extractor(Ok(response(None, None)))
            .extract("from savings", &intent, &current(), &pools(), &[], today())
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_extraction_failure_propagates() {
        let intent = EditIntent {
            field: DraftField::Amount,
            new_value: "650".into(),
        };
        let err = extractor(Err(()))
            .extract("it was 650", &intent, &current(), &pools(), &[], today())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());

        let err = extractor(Ok("not json".into()))
            .extract("it was 650", &intent, &current(), &pools(), &[], today())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Extraction(_)));
    }
}
