use signpost_common::types::GeneratedCard;

use crate::{CardGuard, GuardContext, Issue, IssueCode};

/// 分诊 / 升级处理相关词汇
pub const SLOT_VOCABULARY: &[&str] = &[
    "triage",
    "same-day",
    "same day",
    "red slot",
    "amber slot",
    "orange slot",
    "green slot",
    "pink slot",
    "purple slot",
    "urgent slot",
    "999",
    "111",
    "duty gp",
    "duty doctor",
    "a&e",
];

/// 涉及分诊词汇时必须提供结构化时段指引
pub struct SlotGuidanceGuard;

fn mentions_slot_vocabulary(text: &str) -> bool {
    SLOT_VOCABULARY.iter().any(|term| text.contains(term))
}

impl CardGuard for SlotGuidanceGuard {
    fn code(&self) -> IssueCode {
        IssueCode::MissingSlotGuidance
    }

    fn check(&self, card: &GeneratedCard, ctx: &GuardContext<'_>) -> Vec<Issue> {
        let needs_guidance =
            mentions_slot_vocabulary(ctx.prompt_lower) || mentions_slot_vocabulary(ctx.card_text_lower);
        let has_guidance = card
            .slot_language
            .as_ref()
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        if needs_guidance && !has_guidance {
            vec![Issue {
                code: self.code(),
                message: "Card mentions triage or escalation but has no slot guidance".to_string(),
                card_title: card.title.clone(),
            }]
        } else {
            Vec::new()
        }
    }
}
