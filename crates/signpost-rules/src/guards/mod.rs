pub mod forbidden_pattern;
pub mod forbidden_source;
pub mod slot_guidance;
pub mod toolkit_source;

use signpost_common::types::GeneratedCard;

use crate::{CardGuard, GuardContext, Issue};

pub use forbidden_pattern::ForbiddenPatternGuard;
pub use forbidden_source::ForbiddenSourceGuard;
pub use slot_guidance::SlotGuidanceGuard;
pub use toolkit_source::ToolkitSourceGuard;

/// 默认启用的全部校验规则
pub fn default_guards() -> Vec<Box<dyn CardGuard>> {
    vec![
        Box::new(ForbiddenPatternGuard),
        Box::new(ToolkitSourceGuard),
        Box::new(ForbiddenSourceGuard),
        Box::new(SlotGuidanceGuard),
    ]
}

/// Runs every default guard over every card and returns all issues found.
///
/// An empty result means the batch is safety-clean. A non-empty result is a
/// hard validation failure for the caller, never a warning.
pub fn validate_admin_cards(cards: &[GeneratedCard], prompt_text: &str) -> Vec<Issue> {
    run_guards(&default_guards(), cards, prompt_text)
}

pub fn run_guards(
    guards: &[Box<dyn CardGuard>],
    cards: &[GeneratedCard],
    prompt_text: &str,
) -> Vec<Issue> {
    let prompt_lower = prompt_text.to_lowercase();
    let mut issues = Vec::new();
    for card in cards {
        let card_text_lower = card_text(card).to_lowercase();
        let ctx = GuardContext {
            prompt_lower: &prompt_lower,
            card_text_lower: &card_text_lower,
        };
        for guard in guards {
            issues.extend(guard.check(card, &ctx));
        }
    }
    issues
}

/// Concatenates every textual field of a card into one string.
pub fn card_text(card: &GeneratedCard) -> String {
    let mut parts: Vec<&str> = vec![card.title.as_str()];
    for block in &card.content_blocks {
        parts.push(&block.text);
        parts.extend(block.items.iter().map(String::as_str));
    }
    for interaction in &card.interactions {
        parts.push(&interaction.prompt);
        parts.extend(interaction.options.iter().map(String::as_str));
        if let Some(explanation) = &interaction.explanation {
            parts.push(explanation);
        }
    }
    if let Some(slot) = &card.slot_language {
        for g in &slot.guidance {
            parts.push(&g.slot);
            parts.push(&g.rule);
        }
    }
    parts.extend(card.safety_netting.iter().map(String::as_str));
    for source in &card.sources {
        parts.push(&source.title);
        if let Some(url) = &source.url {
            parts.push(url);
        }
    }
    parts.join("\n")
}
