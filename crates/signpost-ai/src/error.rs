use serde::Serialize;
use signpost_rules::Issue;

use crate::schema::SchemaIssue;

/// 编辑流程错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SchemaMismatch,
    ValidationFailed,
    RateLimited,
    InvalidState,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidState => "INVALID_STATE",
            Self::ServerError => "SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found in a model response, either a schema violation or a
/// content-guard issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_title: Option<String>,
}

impl From<SchemaIssue> for IssueDetail {
    fn from(issue: SchemaIssue) -> Self {
        Self {
            code: ErrorCode::SchemaMismatch.as_str().to_string(),
            message: issue.message,
            path: Some(issue.path),
            card_title: None,
        }
    }
}

impl From<Issue> for IssueDetail {
    fn from(issue: Issue) -> Self {
        Self {
            code: issue.code.as_str().to_string(),
            message: issue.message,
            path: None,
            card_title: Some(issue.card_title),
        }
    }
}

/// Structured failure raised by the generation loop.
///
/// `Display` renders as `"{code}: {message}"`, which is what a failed job
/// stores as its error message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EditorialAiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
    pub issues: Vec<IssueDetail>,
    pub debug_snippet: Option<String>,
}

impl EditorialAiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: &str) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: request_id.to_string(),
            issues: Vec::new(),
            debug_snippet: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<IssueDetail>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_snippet(mut self, snippet: Option<String>) -> Self {
        self.debug_snippet = snippet;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_code() {
        let err = EditorialAiError::new(ErrorCode::ValidationFailed, "3 issues", "req-1");
        assert_eq!(err.to_string(), "VALIDATION_FAILED: 3 issues");
    }

    #[test]
    fn guard_issue_keeps_card_title() {
        let detail: IssueDetail = Issue {
            code: signpost_rules::IssueCode::ForbiddenSource,
            message: "bad".into(),
            card_title: "Card".into(),
        }
        .into();
        assert_eq!(detail.code, "FORBIDDEN_SOURCE");
        assert_eq!(detail.card_title.as_deref(), Some("Card"));
        assert!(detail.path.is_none());
    }
}
