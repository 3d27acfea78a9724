//! Picks the single next question for an incomplete draft

use serde::Serialize;

use crate::agent::hints::matches_hint;
use crate::agent::validator;
use crate::types::{CashPool, Category, DraftField, DraftFields, TransactionType};

/// One choice offered with a question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectableOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

impl SelectableOption {
    fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            value: id.clone(),
            id,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationQuestion {
    pub field: DraftField,
    pub question: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectableOption>,
}

impl ClarificationQuestion {
    fn new(field: DraftField, question: impl Into<String>) -> Self {
        Self {
            field,
            question: question.into(),
            options: Vec::new(),
        }
    }

    fn with_options(mut self, options: Vec<SelectableOption>) -> Self {
        self.options = options;
        self
    }

    /// Option picked by a reply: exact id, 1-based position, or a label that
    /// alone matches the reply text.
    pub fn match_option(&self, reply: &str) -> Option<&SelectableOption> {
        let reply = reply.trim();
        if reply.is_empty() {
            return None;
        }
        if let Some(option) = self.options.iter().find(|option| option.id == reply) {
            return Some(option);
        }
        if let Ok(index) = reply.parse::<usize>() {
            return index.checked_sub(1).and_then(|i| self.options.get(i));
        }
        let mut matched = self
            .options
            .iter()
            .filter(|option| matches_hint(&option.label, reply));
        match (matched.next(), matched.next()) {
            (Some(option), None) => Some(option),
            _ => None,
        }
    }
}

/// Question for one field, with options drawn from the user's own data
pub fn question_for(
    field: DraftField,
    fields: &DraftFields,
    pools: &[CashPool],
    categories: &[Category],
) -> ClarificationQuestion {
    match field {
        DraftField::PoolId => {
            let options: Vec<SelectableOption> = pools
                .iter()
                .filter(|pool| pool.is_active)
                .map(|pool| SelectableOption::new(pool.id.as_str(), pool.display_label()))
                .collect();
            if options.is_empty() {
                ClarificationQuestion::new(
                    field,
                    "You don't have an active cash pool yet. Please create one, then tell me again.",
                )
            } else {
                ClarificationQuestion::new(field, "Which cash pool should I use?")
                    .with_options(options)
            }
        }
        DraftField::Amount => ClarificationQuestion::new(field, "How much was it?"),
        DraftField::Type => ClarificationQuestion::new(field, "Was this income or an expense?")
            .with_options(vec![
                SelectableOption::new(TransactionType::Income.as_str(), "Income"),
                SelectableOption::new(TransactionType::Expense.as_str(), "Expense"),
            ]),
        DraftField::CategoryId => {
            let known_type = fields.transaction_type;
            let options: Vec<SelectableOption> = categories
                .iter()
                .filter(|category| known_type.is_none_or(|t| category.category_type == t))
                .map(|category| {
                    SelectableOption::new(category.id.as_str(), category.display_label())
                })
                .collect();
            if options.is_empty() {
                ClarificationQuestion::new(
                    field,
                    "You don't have a matching category yet. Please create one, then tell me again.",
                )
            } else {
                ClarificationQuestion::new(field, "Which category fits best?").with_options(options)
            }
        }
        DraftField::Purpose => ClarificationQuestion::new(field, "What was it for?"),
        DraftField::Date => ClarificationQuestion::new(field, "When did this happen?"),
        DraftField::Notes => ClarificationQuestion::new(field, "Any notes to add?"),
        DraftField::Tags => {
            ClarificationQuestion::new(field, "Which tags should I add? (comma separated)")
        }
    }
}

/// Highest-priority missing field's question, or `None` when nothing is missing.
///
/// A field that holds a rejected value gets the reason in front of the question.
pub fn next_question(
    missing: &[DraftField],
    fields: &DraftFields,
    pools: &[CashPool],
    categories: &[Category],
) -> Option<ClarificationQuestion> {
    let field = DraftField::REQUIRED
        .into_iter()
        .find(|field| missing.contains(field))?;
    let mut question = question_for(field, fields, pools, categories);

    if fields.is_set(field)
        && let Some(problem) = validator::validate(fields).problem(field)
    {
        question.question = format!("{} {}", problem.describe(field), question.question);
    }
    Some(question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryId, PoolId, UserId};
    use proptest::prelude::*;

    fn pool(id: &str, name: &str, active: bool) -> CashPool {
        CashPool {
            id: PoolId::new(id),
            user_id: UserId::new("u1"),
            name: name.into(),
            currency: "USD".into(),
            balance: 50.0,
            is_active: active,
        }
    }

    fn category(id: &str, key: &str, t: TransactionType) -> Category {
        Category {
            id: CategoryId::new(id),
            user_id: UserId::new("u1"),
            key: key.into(),
            category_type: t,
            icon: "#".into(),
            color: String::new(),
        }
    }

    #[test]
    fn test_pool_question_lists_active_pools() {
        let pools = vec![
            pool("p1", "Main Wallet", true),
            pool("p2", "Closed", false),
            pool("p3", "Travel Wallet", true),
        ];
        let question = next_question(
            &[DraftField::PoolId, DraftField::Amount],
            &DraftFields::default(),
            &pools,
            &[],
        )
        .unwrap();

        assert_eq!(question.field, DraftField::PoolId);
        assert_eq!(question.question, "Which cash pool should I use?");
        let ids: Vec<&str> = question.options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(question.options[0].label, "Main Wallet (USD 50.00)");
    }

    #[test]
    fn test_no_active_pool_asks_to_create_one() {
        let question = question_for(
            DraftField::PoolId,
            &DraftFields::default(),
            &[pool("p1", "Closed", false)],
            &[],
        );
        assert!(question.options.is_empty());
        assert!(question.question.contains("create one"));
    }

    #[test]
    fn test_categories_filtered_by_known_type() {
        let categories = vec![
            category("c1", "salary", TransactionType::Income),
            category("c2", "groceries", TransactionType::Expense),
        ];
        let fields = DraftFields {
            transaction_type: Some(TransactionType::Expense),
            ..Default::default()
        };
        let question = question_for(DraftField::CategoryId, &fields, &[], &categories);
        assert_eq!(question.options.len(), 1);
        assert_eq!(question.options[0].label, "# groceries");

        let question =
            question_for(DraftField::CategoryId, &DraftFields::default(), &[], &categories);
        assert_eq!(question.options.len(), 2);
    }

    #[test]
    fn test_invalid_value_is_explained() {
        let fields = DraftFields {
            amount: Some(-5.0),
            ..Default::default()
        };
        let question = next_question(&[DraftField::Amount], &fields, &[], &[]).unwrap();
        assert_eq!(
            question.question,
            "The amount must be greater than zero. How much was it?"
        );
    }

    #[test]
    fn test_nothing_missing() {
        assert!(next_question(&[], &DraftFields::default(), &[], &[]).is_none());
    }

    #[test]
    fn test_match_option() {
        let pools = vec![pool("p1", "Main Wallet", true), pool("p2", "Bank", true)];
        let question = question_for(DraftField::PoolId, &DraftFields::default(), &pools, &[]);

        assert_eq!(question.match_option("p2").unwrap().id, "p2");
        assert_eq!(question.match_option("1").unwrap().id, "p1");
        assert_eq!(question.match_option("main wallet").unwrap().id, "p1");
        assert!(question.match_option("3").is_none());
        assert!(question.match_option("0").is_none());
        assert!(question.match_option("savings").is_none());
    }

    proptest! {
        #[test]
        fn prop_asks_highest_priority_missing_field(
            mask in proptest::collection::vec(any::<bool>(), 6)
        ) {
            let missing: Vec<DraftField> = DraftField::REQUIRED
                .into_iter()
                .zip(mask.iter())
                .filter(|(_, m)| **m)
                .map(|(field, _)| field)
                .rev()
                .collect();
            let question = next_question(&missing, &DraftFields::default(), &[], &[]);
            let expected = DraftField::REQUIRED.into_iter().find(|f| missing.contains(f));
            prop_assert_eq!(question.map(|q| q.field), expected);
        }
    }
}
