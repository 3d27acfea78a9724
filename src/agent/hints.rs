//! Hint resolution
//!
//! Free-text hints become identifiers only on a single unambiguous match
//! against the user's own reference data. Nothing is ever created, and with
//! several candidates nothing is picked.

use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use super::normalizer::NormalizedExtraction;
use crate::types::{
    CashPool, Category, CategoryId, ConfidenceMap, DraftField, DraftFields, PoolId,
    TransactionType,
};

/// Outcome of resolving one hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    /// No candidate matched (or there was no hint)
    Missing,
    /// More than one candidate matched
    Ambiguous(Vec<T>),
}

impl<T> Resolution<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "RESOLVED",
            Self::Missing => "MISSING",
            Self::Ambiguous(_) => "AMBIGUOUS",
        }
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Case-insensitive. The hint may be any substring of the name; the name
/// only matches inside a longer hint as a run of whole words.
pub fn matches_hint(name: &str, hint: &str) -> bool {
    let name = name.trim().to_lowercase();
    let hint = hint.trim().to_lowercase();
    if name.is_empty() || hint.is_empty() {
        return false;
    }
    if name.contains(&hint) {
        return true;
    }
    let name_words = words(&name);
    !name_words.is_empty()
        && words(&hint)
            .windows(name_words.len())
            .any(|window| window == name_words.as_slice())
}

fn resolve<'a, T: Clone + 'a>(
    hint: Option<&str>,
    candidates: impl Iterator<Item = (&'a str, &'a T)>,
) -> Resolution<T> {
    let Some(hint) = hint.filter(|h| !h.trim().is_empty()) else {
        return Resolution::Missing;
    };
    let mut matched: Vec<T> = candidates
        .filter(|(name, _)| matches_hint(name, hint))
        .map(|(_, id)| id.clone())
        .collect();
    match matched.len() {
        0 => Resolution::Missing,
        1 => Resolution::Resolved(matched.remove(0)),
        _ => Resolution::Ambiguous(matched),
    }
}

/// Resolve a pool hint against the user's active pools
pub fn resolve_pool(hint: Option<&str>, pools: &[CashPool]) -> Resolution<PoolId> {
    resolve(
        hint,
        pools
            .iter()
            .filter(|pool| pool.is_active)
            .map(|pool| (pool.name.as_str(), &pool.id)),
    )
}

/// Resolve a category hint, pre-filtered by the known transaction type
pub fn resolve_category(
    hint: Option<&str>,
    categories: &[Category],
    known_type: Option<TransactionType>,
) -> Resolution<CategoryId> {
    resolve(
        hint,
        categories
            .iter()
            .filter(|category| known_type.is_none_or(|t| category.category_type == t))
            .map(|category| (category.key.as_str(), &category.id)),
    )
}

/// Resolved date plus whether the hint was unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateResolution {
    pub date: NaiveDate,
    pub fell_back: bool,
}

/// TODAY/empty -> today, YESTERDAY -> today - 1, else ISO date.
/// Anything unparsable falls back to today.
pub fn resolve_date(hint: Option<&str>, today: NaiveDate) -> DateResolution {
    let hint = hint.map(str::trim).unwrap_or_default();
    let date = match hint.to_uppercase().as_str() {
        "" | "TODAY" => Some(today),
        "YESTERDAY" => Some(today - Duration::days(1)),
        _ => NaiveDate::parse_from_str(hint, "%Y-%m-%d").ok(),
    };
    match date {
        Some(date) => DateResolution {
            date,
            fell_back: false,
        },
        None => {
            warn!(hint, "unparsable date hint, using today");
            DateResolution {
                date: today,
                fell_back: true,
            }
        }
    }
}

/// Field values and scores produced by one extraction after resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedExtraction {
    pub fields: DraftFields,
    pub confidence: ConfidenceMap,
    pub pool: Option<Resolution<PoolId>>,
    pub category: Option<Resolution<CategoryId>>,
}

/// Apply hint resolution to a normalized extraction.
///
/// `current` is the draft as it stands; its type narrows category lookup
/// and an existing date is only replaced by an explicit date hint.
pub fn resolve_extraction(
    extraction: &NormalizedExtraction,
    current: &DraftFields,
    pools: &[CashPool],
    categories: &[Category],
    today: NaiveDate,
) -> ResolvedExtraction {
    let mut fields = extraction.fields.clone();
    let mut confidence = extraction.confidence.clone();
    let hints = &extraction.hints;

    let pool = hints.cash_pool.as_deref().map(|hint| {
        let resolution = resolve_pool(Some(hint), pools);
        debug!(outcome = resolution.label(), "cash pool hint resolved");
        resolution
    });
    if let Some(Resolution::Resolved(id)) = &pool {
        fields.pool_id = Some(id.clone());
        confidence.insert(DraftField::PoolId, extraction.hint_confidence.cash_pool);
    }

    let known_type = fields.transaction_type.or(current.transaction_type);
    let category = hints.category.as_deref().map(|hint| {
        let resolution = resolve_category(Some(hint), categories, known_type);
        debug!(outcome = resolution.label(), "category hint resolved");
        resolution
    });
    if let Some(Resolution::Resolved(id)) = &category {
        fields.category_id = Some(id.clone());
        confidence.insert(DraftField::CategoryId, extraction.hint_confidence.category);
    }

    if hints.date.is_some() || current.date.is_none() {
        let resolution = resolve_date(hints.date.as_deref(), today);
        fields.date = Some(resolution.date);
        let score = if resolution.fell_back {
            crate::constants::confidence::LOW
        } else {
            extraction.hint_confidence.date
        };
        confidence.insert(DraftField::Date, score);
    }

    ResolvedExtraction {
        fields,
        confidence,
        pool,
        category,
    }
}
