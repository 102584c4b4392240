use regex::Regex;
use signpost_common::types::GeneratedCard;
use std::sync::LazyLock;

use crate::{CardGuard, GuardContext, Issue, IssueCode};

/// (正则, 标签) 对：命中即视为违规内容
const FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    (
        r"\b(news2|qrisk\d?|centor|feverpain|curb-?65|wells score|phq-?9|gad-?7)\b",
        "clinical scoring tool",
    ),
    (
        r"\b(diagnos(e|es|ed|ing|is)|differential)\b",
        "diagnosis language",
    ),
    (
        r"\b(titrat(e|es|ed|ing|ion)|(increase|reduce|double|halve) (the|their|your) dose)\b",
        "medication titration",
    ),
    (r"\bprescrib(e|es|ed|ing)\b", "prescribing advice"),
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    FORBIDDEN_PATTERNS
        .iter()
        .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, *label)))
        .collect()
});

/// 禁止出现的临床评分 / 诊断 / 用药调整等表述
pub struct ForbiddenPatternGuard;

impl CardGuard for ForbiddenPatternGuard {
    fn code(&self) -> IssueCode {
        IssueCode::ForbiddenPattern
    }

    fn check(&self, card: &GeneratedCard, ctx: &GuardContext<'_>) -> Vec<Issue> {
        COMPILED
            .iter()
            .filter_map(|(re, label)| {
                re.find(ctx.card_text_lower).map(|m| Issue {
                    code: self.code(),
                    message: format!("Forbidden {label} term \"{}\"", m.as_str()),
                    card_title: card.title.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(COMPILED.len(), FORBIDDEN_PATTERNS.len());
    }
}
