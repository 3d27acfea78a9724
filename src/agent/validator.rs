//! Draft validator
//!
//! Pure and structural: confidence is never consulted. The missing list
//! comes back in clarification priority order.

use chrono::{Local, NaiveDate};

use crate::constants::validation::MIN_PURPOSE_LEN;
use crate::types::{DraftField, DraftFields};

/// Why a required field does not count as filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    NotPositive,
    TooShort,
    InFuture,
}

impl FieldProblem {
    /// Sentence used to prefix a re-asked question
    pub fn describe(&self, field: DraftField) -> String {
        match self {
            Self::Missing => format!("The {} is missing.", field.label()),
            Self::NotPositive => format!("The {} must be greater than zero.", field.label()),
            Self::TooShort => format!(
                "The {} needs at least {} characters.",
                field.label(),
                MIN_PURPOSE_LEN
            ),
            Self::InFuture => format!("The {} can't be in the future.", field.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// (field, problem) in priority order
    pub problems: Vec<(DraftField, FieldProblem)>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn missing_fields(&self) -> Vec<DraftField> {
        self.problems.iter().map(|(field, _)| *field).collect()
    }

    pub fn problem(&self, field: DraftField) -> Option<FieldProblem> {
        self.problems
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, problem)| *problem)
    }
}

fn check(fields: &DraftFields, field: DraftField, today: NaiveDate) -> Option<FieldProblem> {
    match field {
        DraftField::Amount => match fields.amount {
            None => Some(FieldProblem::Missing),
            Some(amount) if !amount.is_finite() || amount <= 0.0 => {
                Some(FieldProblem::NotPositive)
            }
            Some(_) => None,
        },
        DraftField::Purpose => match fields.purpose.as_deref() {
            None => Some(FieldProblem::Missing),
            Some(purpose) if purpose.trim().chars().count() < MIN_PURPOSE_LEN => {
                Some(FieldProblem::TooShort)
            }
            Some(_) => None,
        },
        DraftField::Date => match fields.date {
            None => Some(FieldProblem::Missing),
            Some(date) if date > today => Some(FieldProblem::InFuture),
            Some(_) => None,
        },
        other => (!fields.is_set(other)).then_some(FieldProblem::Missing),
    }
}

/// Validate against an explicit "today"
pub fn validate_on(fields: &DraftFields, today: NaiveDate) -> ValidationReport {
    let problems = DraftField::REQUIRED
        .into_iter()
        .filter_map(|field| check(fields, field, today).map(|problem| (field, problem)))
        .collect();
    ValidationReport { problems }
}

/// Validate against the local wall clock at call time
pub fn validate(fields: &DraftFields) -> ValidationReport {
    validate_on(fields, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryId, PoolId, TransactionType};
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn complete() -> DraftFields {
        DraftFields {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(500.0),
            pool_id: Some(PoolId::new("p1")),
            category_id: Some(CategoryId::new("c1")),
            purpose: Some("groceries".into()),
            date: Some(today()),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_draft_is_valid() {
        let report = validate_on(&complete(), today());
        assert!(report.is_valid());
        assert!(report.missing_fields().is_empty());
    }

    #[test]
    fn test_empty_draft_lists_all_in_priority_order() {
        let report = validate_on(&DraftFields::default(), today());
        assert_eq!(report.missing_fields(), DraftField::REQUIRED.to_vec());
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        for amount in [0.0, -5.0, f64::NAN] {
            let mut fields = complete();
            fields.amount = Some(amount);
            let report = validate_on(&fields, today());
            assert_eq!(
                report.problem(DraftField::Amount),
                Some(FieldProblem::NotPositive)
            );
        }
    }

    #[test]
    fn test_rejects_short_purpose() {
        let mut fields = complete();
        fields.purpose = Some("  ab  ".into());
        let report = validate_on(&fields, today());
        assert_eq!(report.missing_fields(), vec![DraftField::Purpose]);
        assert_eq!(
            report.problem(DraftField::Purpose),
            Some(FieldProblem::TooShort)
        );
    }

    #[test]
    fn test_rejects_future_date_only() {
        let mut fields = complete();
        fields.date = today().succ_opt();
        assert_eq!(
            validate_on(&fields, today()).problem(DraftField::Date),
            Some(FieldProblem::InFuture)
        );

        fields.date = today().pred_opt();
        assert!(validate_on(&fields, today()).is_valid());
    }

    #[test]
    fn test_optional_fields_ignored() {
        let mut fields = complete();
        fields.notes = None;
        fields.tags = None;
        assert!(validate_on(&fields, today()).is_valid());
    }

    proptest! {
        #[test]
        fn prop_missing_list_keeps_priority_order(mask in proptest::collection::vec(any::<bool>(), 6)) {
            let mut fields = complete();
            for (field, clear) in DraftField::REQUIRED.into_iter().zip(mask.iter()) {
                if *clear {
                    fields.clear(field);
                }
            }
            let missing = validate_on(&fields, today()).missing_fields();
            let expected: Vec<DraftField> = DraftField::REQUIRED
                .into_iter()
                .zip(mask.iter())
                .filter(|(_, clear)| **clear)
                .map(|(field, _)| field)
                .collect();
            prop_assert_eq!(missing, expected);
        }
    }
}
