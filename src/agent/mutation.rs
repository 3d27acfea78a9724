//! Draft mutation service: the only write path for draft fields
//!
//! Every call shallow-merges into the stored fields, re-derives the missing
//! list with the validator and persists fields, confidence and missing list
//! in one store write.

use std::sync::Arc;
use tracing::{debug, info};

use super::validator;
use crate::constants::confidence;
use crate::storage::DraftStore;
use crate::types::{
    ConfidenceMap, DraftField, DraftFields, DraftId, DraftPatch, FieldValue, Result, TallyError,
    TransactionDraft, is_valid_confidence,
};

/// Merge `fields` and `scores` over a draft's current state.
///
/// Only fields set in `fields` change; everything else is kept verbatim.
pub fn merge_draft(
    draft: &TransactionDraft,
    fields: &DraftFields,
    scores: &ConfidenceMap,
) -> (DraftFields, ConfidenceMap) {
    let mut merged = draft.extracted_fields.clone();
    merged.merge(fields);
    let mut merged_scores = draft.confidence_map.clone();
    merged_scores.extend(scores.iter().map(|(field, score)| (*field, *score)));
    (merged, merged_scores)
}

fn check_confidence(scores: &ConfidenceMap) -> Result<()> {
    match scores
        .iter()
        .find(|(_, score)| !is_valid_confidence(**score))
    {
        Some((field, score)) => Err(TallyError::invariant(format!(
            "confidence for '{}' must be within [0, 1], got {}",
            field, score
        ))),
        None => Ok(()),
    }
}

#[derive(Clone)]
pub struct DraftMutationService {
    drafts: Arc<dyn DraftStore>,
}

impl DraftMutationService {
    pub fn new(drafts: Arc<dyn DraftStore>) -> Self {
        Self { drafts }
    }

    async fn load_mutable(&self, draft_id: &DraftId) -> Result<TransactionDraft> {
        let draft = self
            .drafts
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| TallyError::not_found("draft", draft_id.as_str()))?;
        if draft.is_immutable() {
            return Err(TallyError::invariant(format!(
                "draft {} is {} and can no longer change",
                draft.id, draft.status
            )));
        }
        Ok(draft)
    }

    async fn persist(
        &self,
        draft: &TransactionDraft,
        fields: DraftFields,
        scores: ConfidenceMap,
    ) -> Result<TransactionDraft> {
        let missing = validator::validate(&fields).missing_fields();
        debug!(
            draft_id = %draft.id,
            missing = missing.len(),
            "draft fields merged"
        );
        self.drafts
            .update_draft(
                &draft.id,
                DraftPatch {
                    extracted_fields: Some(fields),
                    confidence_map: Some(scores),
                    missing_fields: Some(missing),
                },
            )
            .await
    }

    /// Set one field with its confidence
    pub async fn update_field(
        &self,
        draft_id: &DraftId,
        field: DraftField,
        value: FieldValue,
        score: f64,
    ) -> Result<TransactionDraft> {
        let scores = ConfidenceMap::from([(field, score)]);
        check_confidence(&scores)?;
        let mut update = DraftFields::default();
        update.set(field, value)?;

        let draft = self.load_mutable(draft_id).await?;
        let (fields, scores) = merge_draft(&draft, &update, &scores);
        info!(draft_id = %draft.id, field = %field, "draft field updated");
        self.persist(&draft, fields, scores).await
    }

    /// Set several fields at once. Unset fields in `fields` are left alone.
    pub async fn update_fields(
        &self,
        draft_id: &DraftId,
        fields: &DraftFields,
        scores: &ConfidenceMap,
    ) -> Result<TransactionDraft> {
        check_confidence(scores)?;
        let draft = self.load_mutable(draft_id).await?;
        let (merged, merged_scores) = merge_draft(&draft, fields, scores);
        info!(
            draft_id = %draft.id,
            fields = fields.set_fields().len(),
            "draft fields updated"
        );
        self.persist(&draft, merged, merged_scores).await
    }

    /// Explicitly unset one field; its confidence drops to zero
    pub async fn clear_field(&self, draft_id: &DraftId, field: DraftField) -> Result<TransactionDraft> {
        let draft = self.load_mutable(draft_id).await?;
        let mut fields = draft.extracted_fields.clone();
        fields.clear(field);
        let mut scores = draft.confidence_map.clone();
        scores.insert(field, confidence::CLEARED);
        info!(draft_id = %draft.id, field = %field, "draft field cleared");
        self.persist(&draft, fields, scores).await
    }
}
