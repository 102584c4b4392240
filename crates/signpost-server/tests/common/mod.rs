#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use signpost_ai::ModelClient;
use signpost_server::app;
use signpost_server::auth::{create_token, EditorRole};
use signpost_server::config::{DatabaseConfig, ServerConfig};
use signpost_server::editorial::lifecycle::CardLifecycle;
use signpost_server::editorial::orchestrator::JobOrchestrator;
use signpost_server::editorial::role::KeywordRoleResolver;
use signpost_server::editorial::worker::{JobQueue, JobWorker};
use signpost_server::state::AppState;
use signpost_storage::EditorialStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "test-secret";
pub const SURGERY: &str = "surgery-1";

/// Replays canned model replies in order; the last reply repeats forever.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<u32>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }

    async fn call(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        *self.calls.lock().expect("calls lock") += 1;
        let mut replies = self.replies.lock().expect("replies lock");
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply.ok_or_else(|| anyhow::anyhow!("no scripted reply"))
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
    pub model: Arc<ScriptedModel>,
}

impl TestContext {
    pub fn editor_token(&self, surgeries: &[&str]) -> String {
        let surgeries: Vec<String> = surgeries.iter().map(|s| s.to_string()).collect();
        create_token(TEST_SECRET, "editor-1", "editor", EditorRole::Editor, &surgeries, 3600)
            .expect("editor token should encode")
    }

    pub fn superuser_token(&self) -> String {
        create_token(TEST_SECRET, "admin-1", "admin", EditorRole::Superuser, &[], 3600)
            .expect("superuser token should encode")
    }
}

/// Synchronous generation, no background worker.
pub async fn build_test_context(replies: Vec<String>) -> Result<TestContext> {
    build_test_context_with(replies, |_| {}).await
}

pub async fn build_test_context_with(
    replies: Vec<String>,
    configure: impl FnOnce(&mut ServerConfig),
) -> Result<TestContext> {
    signpost_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig {
        database: DatabaseConfig {
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            url: None,
        },
        ..Default::default()
    };
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config.generation.async_jobs = false;
    config.generation.attempt_timeout_secs = 5;
    config.worker.tick_secs = 1;
    configure(&mut config);

    let store = Arc::new(
        EditorialStore::new(&config.database.connection_url(), temp_dir.path()).await?,
    );
    let model = Arc::new(ScriptedModel::new(replies));
    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        model.clone(),
        Arc::new(KeywordRoleResolver),
        config.generation.loop_settings(),
    ));

    let (jobs, job_rx) = JobQueue::new();
    if config.generation.async_jobs {
        let worker = JobWorker::new(
            orchestrator.clone(),
            store.clone(),
            config.worker.max_concurrent,
            config.worker.tick_secs,
            config.worker.stale_running_secs,
        );
        tokio::spawn(worker.run(job_rx));
    }

    let state = AppState {
        store: store.clone(),
        orchestrator,
        lifecycle: Arc::new(CardLifecycle::new(store)),
        jobs,
        start_time: Utc::now(),
        jwt_secret: Arc::new(TEST_SECRET.to_string()),
        config: Arc::new(config),
    };

    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
        model,
    })
}

/// A model card that passes every content guard.
pub fn card_json(title: &str, with_slots: bool) -> Value {
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

pub fn batch_json(count: usize, with_slots: bool) -> String {
    let cards: Vec<Value> = (0..count)
        .map(|i| card_json(&format!("Card {}", i + 1), with_slots))
        .collect();
    json!({
        "cards": cards,
        "quiz": {
            "title": "Quiz",
            "questions": [{"question": "Which slot?", "options": ["Red", "Green"], "answer_index": 0}]
        }
    })
    .to_string()
}

pub fn generate_body(prompt: &str, count: u32) -> Value {
    json!({
        "surgery_id": SURGERY,
        "prompt_text": prompt,
        "count": count,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let req = builder.body(Body::empty()).expect("request should build");
    send(app, req).await
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

/// Runs a synchronous generation and returns the new card ids.
pub async fn generate_cards(ctx: &TestContext, token: &str, count: u32) -> Vec<String> {
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/editorial/generate",
        Some(token),
        Some(generate_body("Repeat prescription requests at reception", count)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "generate failed: {body}");
    body["data"]["card_ids"]
        .as_array()
        .expect("card_ids should be an array")
        .iter()
        .map(|v| v.as_str().expect("card id should be a string").to_string())
        .collect()
}

pub fn card_uri(card_id: &str, action: &str) -> String {
    if action.is_empty() {
        format!("/v1/editorial/cards/{card_id}?surgery_id={SURGERY}")
    } else {
        format!("/v1/editorial/cards/{card_id}/{action}?surgery_id={SURGERY}")
    }
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json.get("data").is_some());
    assert!(json["data"].is_null());
}

/// Error envelope carrying structured details in `data`.
pub fn assert_err_envelope_with_data(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json["data"].is_object());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}
