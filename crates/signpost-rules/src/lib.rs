//! Pure content-policy rules for generated learning cards.
//!
//! Three families live here, all deterministic and free of I/O:
//! [`safety`] classifies risk and sourcing adequacy, [`guards`] enforces
//! the editorial content policy over a generated batch through registered
//! [`CardGuard`] implementations, and [`topics`] suggests topical placement
//! for a free-text prompt.

pub mod guards;
pub mod safety;
pub mod topics;

#[cfg(test)]
mod tests;

use serde::Serialize;
use signpost_common::types::GeneratedCard;

/// Machine-readable code attached to every guard issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    ForbiddenPattern,
    MissingToolkitSource,
    ForbiddenSource,
    MissingSlotGuidance,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForbiddenPattern => "FORBIDDEN_PATTERN",
            Self::MissingToolkitSource => "MISSING_TOOLKIT_SOURCE",
            Self::ForbiddenSource => "FORBIDDEN_SOURCE",
            Self::MissingSlotGuidance => "MISSING_SLOT_GUIDANCE",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single policy violation found on one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    pub card_title: String,
}

/// Inputs shared by every guard when checking one card.
pub struct GuardContext<'a> {
    /// Original editor prompt, lowercased.
    pub prompt_lower: &'a str,
    /// Every textual field of the card concatenated and lowercased.
    pub card_text_lower: &'a str,
}

/// A content-policy check applied to each generated card.
///
/// Implementations are registered in [`guards::default_guards`] and run by
/// [`guards::validate_admin_cards`]. A guard returns every issue it finds on
/// the card; an empty vector means the card passes that guard.
pub trait CardGuard: Send + Sync {
    /// Issue code this guard emits.
    fn code(&self) -> IssueCode;

    fn check(&self, card: &GeneratedCard, ctx: &GuardContext<'_>) -> Vec<Issue>;
}
