//! Bounded generation loop.
//!
//! Each iteration builds the prompt, calls the model under a timeout,
//! evaluates the output (schema, then domain guards), records the attempt,
//! and only then asks [`next_step`] whether to finish, retry or give up.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use signpost_common::scope::Scope;
use signpost_common::types::{AttemptStatus, GeneratedBatch, TargetRole};
use signpost_rules::guards::validate_admin_cards;

use crate::client::ModelClient;
use crate::error::{EditorialAiError, ErrorCode, IssueDetail};
use crate::prompt::{build_generation_prompt, GenerationPrompt, PromptInput};
use crate::schema::{parse_card_batch, BatchExpectations, SCHEMA_VERSION};

/// 循环参数
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// 失败记录与错误中保留的原始输出字符数
    pub snippet_chars: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(90),
            snippet_chars: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// 同一请求的所有尝试共享该 ID
    pub request_id: String,
    pub surgery_scope: Scope,
    pub created_by: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub count: u32,
    pub tags: Vec<String>,
    pub allowed_tags: Vec<String>,
    pub interactive_first: bool,
}

/// 单次模型调用的审计记录
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub request_id: String,
    pub attempt_index: u32,
    pub model_name: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub raw_model_output: String,
    pub raw_model_json: Option<Value>,
    pub validation_errors: Option<Value>,
    pub status: AttemptStatus,
    pub surgery_scope: Scope,
    pub created_by: String,
}

/// Durable sink for attempt records.
///
/// An error from [`AttemptRecorder::record`] aborts the loop; no attempt
/// proceeds without its record.
#[async_trait]
pub trait AttemptRecorder: Send + Sync {
    async fn record(&self, attempt: AttemptRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub batch: GeneratedBatch,
    pub model_used: String,
    /// 同时作为 trace id 返回给调用方
    pub request_id: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Finish,
    Retry,
    GiveUp,
}

/// Decides what follows attempt `attempt_index` (1-based).
///
/// # Examples
///
/// ```
/// use signpost_ai::{next_step, NextStep};
/// use signpost_common::types::AttemptStatus;
///
/// assert_eq!(next_step(AttemptStatus::Success, 3, 3), NextStep::Finish);
/// assert_eq!(next_step(AttemptStatus::SchemaMismatch, 1, 3), NextStep::Retry);
/// assert_eq!(next_step(AttemptStatus::ValidationFailed, 3, 3), NextStep::GiveUp);
/// ```
pub fn next_step(status: AttemptStatus, attempt_index: u32, max_attempts: u32) -> NextStep {
    match status {
        AttemptStatus::Success => NextStep::Finish,
        _ if attempt_index < max_attempts.max(1) => NextStep::Retry,
        _ => NextStep::GiveUp,
    }
}

struct Evaluation {
    status: AttemptStatus,
    raw_output: String,
    json: Option<Value>,
    outcome: Result<GeneratedBatch, Vec<IssueDetail>>,
}

impl Evaluation {
    fn call_failed(message: String) -> Self {
        Self {
            status: AttemptStatus::SchemaMismatch,
            raw_output: String::new(),
            json: None,
            outcome: Err(vec![IssueDetail {
                code: ErrorCode::SchemaMismatch.as_str().to_string(),
                message,
                path: None,
                card_title: None,
            }]),
        }
    }
}

/// Runs the attempt loop until a batch passes every check or the attempt
/// bound is reached.
pub async fn generate_batch(
    client: &dyn ModelClient,
    recorder: &dyn AttemptRecorder,
    settings: &LoopSettings,
    request: &GenerationRequest,
) -> Result<GenerationOutcome, EditorialAiError> {
    let max_attempts = settings.max_attempts.max(1);
    let mut feedback: Vec<IssueDetail> = Vec::new();
    let mut attempt_index = 0;

    loop {
        attempt_index += 1;
        let prompt = build_generation_prompt(&PromptInput {
            prompt_text: &request.prompt_text,
            target_role: request.target_role,
            count: request.count,
            interactive_first: request.interactive_first,
            allowed_tags: &request.allowed_tags,
            requested_tags: &request.tags,
            previous_issues: &feedback,
        });

        let evaluation = evaluate(client, &prompt, settings, request).await;
        let status = evaluation.status;
        let snippet = truncate_snippet(&evaluation.raw_output, settings.snippet_chars);
        let issue_count = evaluation.outcome.as_ref().map(|_| 0).unwrap_or_else(Vec::len);

        let record = AttemptRecord {
            request_id: request.request_id.clone(),
            attempt_index,
            model_name: client.model_name().to_string(),
            prompt_text: request.prompt_text.clone(),
            target_role: request.target_role,
            raw_model_output: if status == AttemptStatus::Success {
                evaluation.raw_output.clone()
            } else {
                snippet.clone()
            },
            raw_model_json: evaluation.json,
            validation_errors: evaluation
                .outcome
                .as_ref()
                .err()
                .and_then(|issues| serde_json::to_value(issues).ok()),
            status,
            surgery_scope: request.surgery_scope.clone(),
            created_by: request.created_by.clone(),
        };

        if let Err(e) = recorder.record(record).await {
            tracing::error!(
                request_id = %request.request_id,
                attempt = attempt_index,
                error = %e,
                "Failed to record generation attempt, aborting"
            );
            return Err(EditorialAiError::new(
                ErrorCode::ServerError,
                format!("Failed to record generation attempt {attempt_index}: {e}"),
                &request.request_id,
            ));
        }

        tracing::info!(
            request_id = %request.request_id,
            attempt = attempt_index,
            max_attempts,
            status = %status,
            issues = issue_count,
            "Generation attempt evaluated"
        );

        match (next_step(status, attempt_index, max_attempts), evaluation.outcome) {
            (_, Ok(batch)) => {
                return Ok(GenerationOutcome {
                    batch,
                    model_used: client.model_name().to_string(),
                    request_id: request.request_id.clone(),
                    attempts: attempt_index,
                })
            }
            (NextStep::Retry, Err(issues)) => feedback = issues,
            (_, Err(issues)) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    attempts = attempt_index,
                    status = %status,
                    "Generation attempts exhausted"
                );
                let (code, message) = if status == AttemptStatus::ValidationFailed {
                    (
                        ErrorCode::ValidationFailed,
                        format!("Generated cards failed content checks after {attempt_index} attempts"),
                    )
                } else {
                    (
                        ErrorCode::SchemaMismatch,
                        format!("Model output did not match {SCHEMA_VERSION} after {attempt_index} attempts"),
                    )
                };
                return Err(EditorialAiError::new(code, message, &request.request_id)
                    .with_issues(issues)
                    .with_snippet(Some(snippet).filter(|s| !s.is_empty())));
            }
        }
    }
}

async fn evaluate(
    client: &dyn ModelClient,
    prompt: &GenerationPrompt,
    settings: &LoopSettings,
    request: &GenerationRequest,
) -> Evaluation {
    let call = tokio::time::timeout(
        settings.attempt_timeout,
        client.call(&prompt.system_prompt, &prompt.user_prompt),
    )
    .await;

    let raw = match call {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            tracing::warn!(request_id = %request.request_id, error = %e, "Model call failed");
            return Evaluation::call_failed(format!("Model call failed: {e}"));
        }
        Err(_) => {
            tracing::warn!(
                request_id = %request.request_id,
                timeout_secs = settings.attempt_timeout.as_secs_f64(),
                "Model call timed out"
            );
            return Evaluation::call_failed(format!(
                "Model call timed out after {:.1}s",
                settings.attempt_timeout.as_secs_f64()
            ));
        }
    };

    let expect = BatchExpectations {
        count: request.count,
        interactive_first: request.interactive_first,
    };
    match parse_card_batch(&raw, &expect) {
        Err(failure) => Evaluation {
            status: AttemptStatus::SchemaMismatch,
            raw_output: raw,
            json: failure.json,
            outcome: Err(failure.issues.into_iter().map(IssueDetail::from).collect()),
        },
        Ok(batch) => {
            let json = serde_json::to_value(&batch).ok();
            let issues = validate_admin_cards(&batch.cards, &request.prompt_text);
            if issues.is_empty() {
                Evaluation {
                    status: AttemptStatus::Success,
                    raw_output: raw,
                    json,
                    outcome: Ok(batch),
                }
            } else {
                Evaluation {
                    status: AttemptStatus::ValidationFailed,
                    raw_output: raw,
                    json,
                    outcome: Err(issues.into_iter().map(IssueDetail::from).collect()),
                }
            }
        }
    }
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_snippet(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &raw[..idx]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        fn provider(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted-1"
        }

        async fn call(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl ModelClient for SlowClient {
        fn provider(&self) -> &str {
            "slow"
        }

        fn model_name(&self) -> &str {
            "slow-1"
        }

        async fn call(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    #[derive(Default)]
    struct MemoryRecorder {
        records: Mutex<Vec<AttemptRecord>>,
    }

    #[async_trait]
    impl AttemptRecorder for MemoryRecorder {
        async fn record(&self, attempt: AttemptRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(attempt);
            Ok(())
        }
    }

    struct BrokenRecorder;

    #[async_trait]
    impl AttemptRecorder for BrokenRecorder {
        async fn record(&self, _attempt: AttemptRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn card(title: &str, with_slots: bool) -> Value {
        let mut card = json!({
            "title": title,
            "content_blocks": [{"type": "paragraph", "text": "Book the patient into the next suitable slot."}],
            "interactions": [{
                "type": "true_false",
                "prompt": "Callers with new symptoms go to the duty team.",
                "options": ["True", "False"],
                "answer_index": 0
            }],
            "safety_netting": ["Ask the patient to call back if things change."],
            "sources": [{"title": "Signposting Toolkit (internal)", "url": "https://app.signpostingtool.co.uk/slots"}],
            "estimated_time_minutes": 4
        });
        if with_slots {
            card["slot_language"] = json!({
                "relevant": true,
                "guidance": [{"slot": "red", "rule": "Same-day red slot, tell the duty GP"}]
            });
        }
        card
    }

    fn batch_json(count: usize, with_slots: bool) -> String {
        let cards: Vec<Value> = (0..count)
            .map(|i| card(&format!("Card {}", i + 1), with_slots))
            .collect();
        json!({
            "cards": cards,
            "quiz": {"title": "Quiz", "questions": [{"question": "Which slot?", "options": ["Red", "Green"], "answer_index": 0}]}
        })
        .to_string()
    }

    fn request(prompt: &str, count: u32) -> GenerationRequest {
        GenerationRequest {
            request_id: "req-1".into(),
            surgery_scope: Scope::Tenant("s1".into()),
            created_by: "editor-1".into(),
            prompt_text: prompt.into(),
            target_role: TargetRole::Admin,
            count,
            tags: vec![],
            allowed_tags: vec![],
            interactive_first: true,
        }
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            snippet_chars: 50,
        }
    }

    fn statuses(recorder: &MemoryRecorder) -> Vec<AttemptStatus> {
        recorder.records.lock().unwrap().iter().map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let client = ScriptedClient::new(vec![Ok(batch_json(3, true))]);
        let recorder = MemoryRecorder::default();
        let outcome = generate_batch(
            &client,
            &recorder,
            &settings(),
            &request("chest pain same-day triage slot rules", 3),
        )
        .await
        .unwrap();

        assert_eq!(outcome.batch.cards.len(), 3);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.model_used, "scripted-1");
        assert_eq!(outcome.request_id, "req-1");
        assert_eq!(statuses(&recorder), vec![AttemptStatus::Success]);

        let records = recorder.records.lock().unwrap();
        assert!(records[0].raw_model_json.is_some());
        assert!(records[0].validation_errors.is_none());
    }

    #[tokio::test]
    async fn recovers_after_schema_mismatch() {
        let client = ScriptedClient::new(vec![
            Ok("sorry, no JSON today".into()),
            Ok(batch_json(2, false)),
        ]);
        let recorder = MemoryRecorder::default();
        let outcome = generate_batch(&client, &recorder, &settings(), &request("booking rules", 2))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            statuses(&recorder),
            vec![AttemptStatus::SchemaMismatch, AttemptStatus::Success]
        );
        let records = recorder.records.lock().unwrap();
        assert_eq!(records[0].attempt_index, 1);
        assert_eq!(records[1].attempt_index, 2);
        assert!(records[0].validation_errors.is_some());
    }

    #[tokio::test]
    async fn missing_slot_guidance_exhausts_retries() {
        let client = ScriptedClient::new(vec![
            Ok(batch_json(3, false)),
            Ok(batch_json(3, false)),
            Ok(batch_json(3, false)),
        ]);
        let recorder = MemoryRecorder::default();
        let err = generate_batch(
            &client,
            &recorder,
            &settings(),
            &request("chest pain same-day triage slot rules", 3),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.request_id, "req-1");
        assert_eq!(err.issues.len(), 3);
        assert!(err.issues.iter().all(|i| i.code == "MISSING_SLOT_GUIDANCE"));
        assert!(err.to_string().starts_with("VALIDATION_FAILED"));
        assert_eq!(client.calls(), 3);
        assert_eq!(statuses(&recorder), vec![AttemptStatus::ValidationFailed; 3]);
    }

    #[tokio::test]
    async fn schema_failure_carries_truncated_snippet() {
        let garbage = "x".repeat(200);
        let client = ScriptedClient::new(vec![Ok(garbage.clone())]);
        let recorder = MemoryRecorder::default();
        let one_shot = LoopSettings {
            max_attempts: 1,
            ..settings()
        };
        let err = generate_batch(&client, &recorder, &one_shot, &request("booking rules", 1))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::SchemaMismatch);
        let snippet = err.debug_snippet.unwrap();
        assert_eq!(snippet.chars().count(), 51);
        assert_eq!(recorder.records.lock().unwrap()[0].raw_model_output, snippet);
    }

    #[tokio::test]
    async fn transport_error_counts_as_schema_mismatch() {
        let client = ScriptedClient::new(vec![
            Err(anyhow::anyhow!("connection reset")),
            Ok(batch_json(1, false)),
        ]);
        let recorder = MemoryRecorder::default();
        let outcome = generate_batch(&client, &recorder, &settings(), &request("booking rules", 1))
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(statuses(&recorder)[0], AttemptStatus::SchemaMismatch);
    }

    #[tokio::test]
    async fn timeout_counts_as_schema_mismatch() {
        let recorder = MemoryRecorder::default();
        let fast = LoopSettings {
            max_attempts: 1,
            attempt_timeout: Duration::from_millis(20),
            snippet_chars: 50,
        };
        let err = generate_batch(&SlowClient, &recorder, &fast, &request("booking rules", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaMismatch);
        assert!(err.issues[0].message.contains("timed out"));
        assert!(err.debug_snippet.is_none());
        assert_eq!(statuses(&recorder), vec![AttemptStatus::SchemaMismatch]);
    }

    #[tokio::test]
    async fn recorder_failure_aborts_before_retry() {
        let client = ScriptedClient::new(vec![Ok("bad".into()), Ok(batch_json(1, false))]);
        let err = generate_batch(&client, &BrokenRecorder, &settings(), &request("booking rules", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn next_step_is_bounded() {
        assert_eq!(next_step(AttemptStatus::SchemaMismatch, 2, 3), NextStep::Retry);
        assert_eq!(next_step(AttemptStatus::SchemaMismatch, 3, 3), NextStep::GiveUp);
        assert_eq!(next_step(AttemptStatus::ValidationFailed, 1, 0), NextStep::GiveUp);
        assert_eq!(next_step(AttemptStatus::Success, 1, 3), NextStep::Finish);
    }

    #[test]
    fn snippet_truncation_is_char_safe() {
        assert_eq!(truncate_snippet("héllo", 2), "hé…");
        assert_eq!(truncate_snippet("short", 10), "short");
    }
}
