use signpost_common::types::GeneratedCard;

use crate::{CardGuard, GuardContext, Issue, IssueCode};

/// 不允许引用的外部站点
pub const FORBIDDEN_SOURCE_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "webmd.com",
    "mayoclinic.org",
    "healthline.com",
    "reddit.com",
];

pub struct ForbiddenSourceGuard;

impl CardGuard for ForbiddenSourceGuard {
    fn code(&self) -> IssueCode {
        IssueCode::ForbiddenSource
    }

    fn check(&self, card: &GeneratedCard, _ctx: &GuardContext<'_>) -> Vec<Issue> {
        card.sources
            .iter()
            .filter_map(|s| s.url.as_deref())
            .filter_map(|u| {
                let lower = u.to_lowercase();
                FORBIDDEN_SOURCE_DOMAINS
                    .iter()
                    .find(|d| lower.contains(*d))
                    .map(|d| Issue {
                        code: self.code(),
                        message: format!("Source {u} uses disallowed domain {d}"),
                        card_title: card.title.clone(),
                    })
            })
            .collect()
    }
}
