use signpost_common::types::GeneratedCard;

use crate::{CardGuard, GuardContext, Issue, IssueCode};

/// 内部工具包来源的固定标题与 URL 前缀
pub const TOOLKIT_SOURCE_TITLE: &str = "Signposting Toolkit (internal)";
pub const TOOLKIT_SOURCE_URL_PREFIX: &str = "https://app.signpostingtool.co.uk/";

/// 第一条来源必须是内部工具包
pub struct ToolkitSourceGuard;

impl ToolkitSourceGuard {
    fn is_toolkit_source(card: &GeneratedCard) -> bool {
        let Some(first) = card.sources.first() else {
            return false;
        };
        let title_ok = first
            .title
            .trim()
            .eq_ignore_ascii_case(TOOLKIT_SOURCE_TITLE);
        let url_ok = first
            .url
            .as_deref()
            .map(|u| u.trim().starts_with(TOOLKIT_SOURCE_URL_PREFIX))
            .unwrap_or(false);
        title_ok && url_ok
    }
}

impl CardGuard for ToolkitSourceGuard {
    fn code(&self) -> IssueCode {
        IssueCode::MissingToolkitSource
    }

    fn check(&self, card: &GeneratedCard, _ctx: &GuardContext<'_>) -> Vec<Issue> {
        if Self::is_toolkit_source(card) {
            return Vec::new();
        }
        vec![Issue {
            code: self.code(),
            message: format!(
                "First source must be \"{TOOLKIT_SOURCE_TITLE}\" with a URL under {TOOLKIT_SOURCE_URL_PREFIX}"
            ),
            card_title: card.title.clone(),
        }]
    }
}
