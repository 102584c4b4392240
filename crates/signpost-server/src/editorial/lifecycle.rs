//! Card review lifecycle: `draft → approved → published`, with `archived`
//! reachable from every state and no way back from `published`.

use signpost_common::scope::Scope;
use signpost_common::types::{CardRow, CardStatus, CardVersionRow, GeneratedCard, RiskLevel};
use signpost_rules::guards::{card_text, validate_admin_cards};
use signpost_rules::safety::{infer_risk_level, resolve_needs_sourcing};
use signpost_storage::{CardEdit, EditorialStore, PublishOutcome};
use std::sync::Arc;

use crate::auth::Claims;

pub const MUST_BE_APPROVED: &str = "Card must be approved before publishing";
pub const REVIEW_DATE_REQUIRED: &str = "Review date is required";
pub const SOURCE_REQUIRED: &str = "At least one source with a title is required";
pub const INTERACTION_REQUIRED: &str = "At least one interaction is required";
pub const SOURCING_UNRESOLVED: &str = "Card still needs sourcing";
pub const SIGNOFF_REQUIRED: &str = "Clinician sign-off required for high-risk card";

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("card not found")]
    NotFound,
    #[error("not authorised for this card's scope")]
    Forbidden,
    /// 所有未满足条件一次性返回
    #[error("{}", .0.join("; "))]
    InvalidState(Vec<String>),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LifecycleError {
    fn invalid(reason: &str) -> Self {
        Self::InvalidState(vec![reason.to_string()])
    }
}

/// Requirements on card content, independent of its status.
pub fn content_requirements(card: &CardRow) -> Vec<String> {
    let mut unmet = Vec::new();
    if card.review_by_date.is_none() {
        unmet.push(REVIEW_DATE_REQUIRED.to_string());
    }
    if !card.sources.iter().any(|s| !s.title.trim().is_empty()) {
        unmet.push(SOURCE_REQUIRED.to_string());
    }
    if card.interactions.is_empty() {
        unmet.push(INTERACTION_REQUIRED.to_string());
    }
    if card.needs_sourcing {
        unmet.push(SOURCING_UNRESOLVED.to_string());
    }
    if card.risk_level == RiskLevel::High && !card.clinician_approved {
        unmet.push(SIGNOFF_REQUIRED.to_string());
    }
    unmet
}

/// The card's guarded content with `edit` applied on top.
fn edited_content(card: &CardRow, edit: &CardEdit) -> GeneratedCard {
    GeneratedCard {
        title: edit.title.clone().unwrap_or_else(|| card.title.clone()),
        content_blocks: card.content_blocks.clone(),
        interactions: card.interactions.clone(),
        slot_language: card.slot_language.clone(),
        safety_netting: card.safety_netting.clone(),
        sources: edit.sources.clone().unwrap_or_else(|| card.sources.clone()),
        estimated_time_minutes: card.estimated_time_minutes,
        needs_sourcing: card.needs_sourcing,
        tags: edit.tags.clone().unwrap_or_else(|| card.tags.clone()),
    }
}

/// Every unmet publish requirement, in a stable order. Empty means the card
/// may be published.
pub fn publish_requirements(card: &CardRow) -> Vec<String> {
    let mut unmet = Vec::new();
    if card.status != CardStatus::Approved {
        unmet.push(MUST_BE_APPROVED.to_string());
    }
    unmet.extend(content_requirements(card));
    unmet
}

pub struct CardLifecycle {
    store: Arc<EditorialStore>,
}

impl CardLifecycle {
    pub fn new(store: Arc<EditorialStore>) -> Self {
        Self { store }
    }

    /// Loads a card the caller may act on under the claimed scope.
    ///
    /// A card outside the claimed scope is reported as missing.
    pub async fn load(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<CardRow, LifecycleError> {
        if !claims.can_edit(claimed) {
            return Err(LifecycleError::Forbidden);
        }
        match self.store.get_card(id).await? {
            Some(card) if &card.surgery_scope == claimed => Ok(card),
            _ => Err(LifecycleError::NotFound),
        }
    }

    async fn reload(&self, id: &str) -> Result<CardRow, LifecycleError> {
        self.store
            .get_card(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    pub async fn approve(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<CardRow, LifecycleError> {
        self.load(id, claimed, claims).await?;
        if !self
            .store
            .transition_card(id, &[CardStatus::Draft], CardStatus::Approved)
            .await?
        {
            return Err(LifecycleError::invalid("Only draft cards can be approved"));
        }
        tracing::info!(card_id = %id, actor = %claims.username, "Card approved");
        self.reload(id).await
    }

    /// Publishes an approved card, writing its immutable version snapshot.
    ///
    /// The gate is checked up front so the caller gets every unmet
    /// requirement at once, then re-checked inside the publishing
    /// transaction against the row it is about to snapshot.
    pub async fn publish(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<CardRow, LifecycleError> {
        let card = self.load(id, claimed, claims).await?;
        let unmet = publish_requirements(&card);
        if !unmet.is_empty() {
            return Err(LifecycleError::InvalidState(unmet));
        }

        match self
            .store
            .publish_card(id, &claims.username, content_requirements)
            .await?
        {
            PublishOutcome::Published(row) => Ok(row),
            PublishOutcome::NotApproved => Err(LifecycleError::invalid(MUST_BE_APPROVED)),
            PublishOutcome::Refused(unmet) => Err(LifecycleError::InvalidState(unmet)),
        }
    }

    pub async fn archive(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<CardRow, LifecycleError> {
        self.load(id, claimed, claims).await?;
        let from = [CardStatus::Draft, CardStatus::Approved, CardStatus::Published];
        if !self
            .store
            .transition_card(id, &from, CardStatus::Archived)
            .await?
        {
            return Err(LifecycleError::invalid("Card is already archived"));
        }
        tracing::info!(card_id = %id, actor = %claims.username, "Card archived");
        self.reload(id).await
    }

    /// Applies an editor's changes to a draft or approved card.
    ///
    /// The edited content goes back through the same content guards as a
    /// fresh generation. Sourcing is re-derived from the effective sources,
    /// so an explicit `needs_sourcing` can raise the flag but never clear
    /// it, and risk is re-inferred without ever dropping below HIGH.
    pub async fn edit(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
        mut edit: CardEdit,
    ) -> Result<CardRow, LifecycleError> {
        let card = self.load(id, claimed, claims).await?;
        if edit.is_empty() {
            return Err(LifecycleError::invalid("No changes supplied"));
        }

        let prompt = card
            .generated_from
            .get("prompt_text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let edited = edited_content(&card, &edit);
        let issues = validate_admin_cards(std::slice::from_ref(&edited), prompt);
        if !issues.is_empty() {
            return Err(LifecycleError::InvalidState(
                issues
                    .iter()
                    .map(|i| format!("{}: {}", i.code, i.message))
                    .collect(),
            ));
        }

        if edit.sources.is_some() || edit.needs_sourcing.is_some() {
            edit.needs_sourcing = Some(resolve_needs_sourcing(
                &edited.sources,
                edit.needs_sourcing.unwrap_or(false),
            ));
        }
        let inferred = infer_risk_level(&format!("{prompt} {}", card_text(&edited)));
        if card.risk_level != RiskLevel::High && inferred == RiskLevel::High {
            edit.risk_level = Some(RiskLevel::High);
        }

        let row = self
            .store
            .update_card(id, &edit)
            .await?
            .ok_or_else(|| LifecycleError::invalid("Only draft or approved cards can be edited"))?;
        tracing::info!(card_id = %id, actor = %claims.username, risk = %row.risk_level, "Card edited");
        Ok(row)
    }

    pub async fn clinician_signoff(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
        approved: bool,
    ) -> Result<CardRow, LifecycleError> {
        self.load(id, claimed, claims).await?;
        if !self.store.set_clinician_approved(id, approved).await? {
            return Err(LifecycleError::invalid(
                "Sign-off can only change on draft or approved cards",
            ));
        }
        tracing::info!(card_id = %id, approved, actor = %claims.username, "Clinician sign-off updated");
        self.reload(id).await
    }

    /// Flips visibility without touching the review status.
    pub async fn toggle_active(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<CardRow, LifecycleError> {
        self.load(id, claimed, claims).await?;
        self.store
            .toggle_card_active(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    pub async fn versions(
        &self,
        id: &str,
        claimed: &Scope,
        claims: &Claims,
    ) -> Result<Vec<CardVersionRow>, LifecycleError> {
        self.load(id, claimed, claims).await?;
        Ok(self.store.list_card_versions(id).await?)
    }
}
