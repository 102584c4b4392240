use serde::Serialize;
use signpost_common::types::TargetRole;
use signpost_rules::guards::toolkit_source::{TOOLKIT_SOURCE_TITLE, TOOLKIT_SOURCE_URL_PREFIX};

use crate::error::IssueDetail;
use crate::schema::SCHEMA_VERSION;

/// Prompt 构建输入
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub prompt_text: &'a str,
    pub target_role: TargetRole,
    pub count: u32,
    pub interactive_first: bool,
    /// 允许使用的标签（为空时不限制）
    pub allowed_tags: &'a [String],
    /// 编辑要求的标签
    pub requested_tags: &'a [String],
    /// 上一次尝试被拒绝的原因（首次为空）
    pub previous_issues: &'a [IssueDetail],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

/// 构建生成 prompt（system + user）
pub fn build_generation_prompt(input: &PromptInput<'_>) -> GenerationPrompt {
    let system_prompt = SYSTEM_PROMPT
        .replace("{{SCHEMA_VERSION}}", SCHEMA_VERSION)
        .replace("{{TOOLKIT_TITLE}}", TOOLKIT_SOURCE_TITLE)
        .replace("{{TOOLKIT_URL}}", TOOLKIT_SOURCE_URL_PREFIX)
        .replace("{{SCHEMA_SHAPE}}", SCHEMA_SHAPE);

    let interactivity = if input.interactive_first {
        "Every card MUST include at least one interaction; lead with the interaction where it helps."
    } else {
        "Interactions are optional."
    };

    let mut user_prompt = USER_PROMPT
        .replace("{{AUDIENCE}}", input.target_role.audience())
        .replace("{{ROLE}}", input.target_role.as_str())
        .replace("{{COUNT}}", &input.count.to_string())
        .replace("{{INTERACTIVITY}}", interactivity)
        .replace("{{TAGS}}", &format_tags(input.allowed_tags, input.requested_tags))
        .replace("{{REQUEST}}", input.prompt_text.trim());

    if !input.previous_issues.is_empty() {
        user_prompt.push_str("\n\nYour previous answer was rejected. Fix every problem below:\n");
        for issue in input.previous_issues {
            let location = issue
                .path
                .as_deref()
                .or(issue.card_title.as_deref())
                .unwrap_or("batch");
            user_prompt.push_str(&format!("- [{}] {}: {}\n", issue.code, location, issue.message));
        }
    }

    GenerationPrompt {
        system_prompt,
        user_prompt,
    }
}

fn format_tags(allowed: &[String], requested: &[String]) -> String {
    let mut out = String::new();
    if allowed.is_empty() {
        out.push_str("Tags: choose short lowercase tags.");
    } else {
        out.push_str("Tags: use only these tags: ");
        out.push_str(&allowed.join(", "));
        out.push('.');
    }
    if !requested.is_empty() {
        out.push_str(" Apply these tags to every card: ");
        out.push_str(&requested.join(", "));
        out.push('.');
    }
    out
}

const SYSTEM_PROMPT: &str = r#"You write short, practical learning cards for staff in UK general practice surgeries.

Content rules (any breach rejects the whole batch):
- Never name clinical scoring tools, never use diagnosis language, never advise on prescribing or changing doses.
- The FIRST source of every card must be exactly: title "{{TOOLKIT_TITLE}}", url starting with "{{TOOLKIT_URL}}".
- Other sources must come from NHS, NICE, GOV.UK or similar official bodies. Never cite Wikipedia, WebMD, Mayo Clinic, Healthline or Reddit.
- If the request or a card touches triage, same-day care, 999, 111, A&E or the duty GP, fill "slot_language" with concrete guidance per slot.
- Set "needs_sourcing" to true if you are not confident in the sources.
- Include safety-netting advice on every card.

Respond with a single JSON object following schema {{SCHEMA_VERSION}} and nothing else:
{{SCHEMA_SHAPE}}"#;

const SCHEMA_SHAPE: &str = r#"{
  "schema_version": "card-batch/v1",
  "cards": [
    {
      "title": "string",
      "content_blocks": [{"type": "paragraph|callout|steps", "text": "string", "items": ["string"]}],
      "interactions": [{"type": "multiple_choice|true_false|scenario|reflection", "prompt": "string", "options": ["string"], "answer_index": 0, "explanation": "string"}],
      "slot_language": {"relevant": true, "guidance": [{"slot": "string", "rule": "string"}]},
      "safety_netting": ["string"],
      "sources": [{"title": "string", "url": "string", "publisher": "string"}],
      "estimated_time_minutes": 3,
      "needs_sourcing": false,
      "tags": ["string"]
    }
  ],
  "quiz": {"title": "string", "questions": [{"question": "string", "options": ["string"], "answer_index": 0, "explanation": "string"}]}
}"#;

const USER_PROMPT: &str = r#"Audience: {{AUDIENCE}} (role: {{ROLE}}).
Write exactly {{COUNT}} cards and one short quiz covering them.
{{INTERACTIVITY}}
{{TAGS}}

Editor request:
{{REQUEST}}"#;
