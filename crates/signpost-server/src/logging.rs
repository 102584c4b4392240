use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::time::Instant;

/// Per-request trace id, also echoed in the `X-Trace-Id` header and in every
/// envelope's `trace_id`.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

fn generate_trace_id() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

/// Maximum number of bytes to log from a request or response body.
const MAX_BODY_LOG_BYTES: usize = 200;
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// 请求/响应体的日志策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyPolicy {
    Log,
    /// 请求体与响应体都不记录
    Redact,
    /// 记录请求体；失败响应可能带模型原始输出，不记录
    RedactFailures,
}

impl BodyPolicy {
    fn for_path(path: &str) -> Self {
        if path.ends_with("/attempts") || path.starts_with("/v1/editorial/generate/preview") {
            Self::Redact
        } else if path == "/v1/editorial/generate" {
            Self::RedactFailures
        } else {
            Self::Log
        }
    }

    fn logs_request(self) -> bool {
        self != Self::Redact
    }

    fn logs_response(self, status: StatusCode) -> bool {
        match self {
            Self::Log => true,
            Self::Redact => false,
            Self::RedactFailures => status.is_success(),
        }
    }
}

/// Utf-8 prefix of at most `max` bytes, cut on a char boundary.
fn snippet(bytes: &[u8], max: usize) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "<non-utf8 body>".to_string();
    };
    if text.len() <= max {
        return text.to_string();
    }
    let end = (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
    format!("{}...", &text[..end])
}

fn format_elapsed(elapsed_us: u128) -> String {
    match elapsed_us {
        0..=999 => format!("{elapsed_us}µs"),
        1_000..=999_999 => format!("{}ms", elapsed_us / 1000),
        _ => format!("{:.1}s", elapsed_us as f64 / 1_000_000.0),
    }
}

fn is_json(response_headers: &axum::http::HeaderMap) -> bool {
    response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Buffers a body so it can be logged and then handed on unchanged.
async fn buffer(body: Body, limit: usize) -> Bytes {
    axum::body::to_bytes(body, limit).await.unwrap_or_default()
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, body: &str) {
    let code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(trace_id, status = code, elapsed, body, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id, status = code, elapsed, body, "<-- response");
    } else if body.is_empty() {
        tracing::info!(trace_id, status = code, elapsed, "<-- response");
    } else {
        tracing::info!(trace_id, status = code, elapsed, body, "<-- response");
    }
}

/// Request/response logging middleware.
///
/// Stamps every request with a [`TraceId`] and logs one line on the way in
/// and one on the way out. Bodies on attempt-audit and prompt-preview routes
/// are never logged, nor are failed generation responses, which can carry a
/// snippet of raw model output.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let path = req.uri().path().to_string();
    if path == "/v1/openapi.json" {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let url = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let policy = BodyPolicy::for_path(&path);

    let has_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);
    let (req, req_body) = if has_body && policy.logs_request() {
        let (parts, body) = req.into_parts();
        let bytes = buffer(body, MAX_REQUEST_BODY_BYTES).await;
        let logged = if bytes.is_empty() {
            String::new()
        } else {
            snippet(&bytes, MAX_BODY_LOG_BYTES)
        };
        (Request::from_parts(parts, Body::from(bytes)), logged)
    } else {
        (req, String::new())
    };

    if req_body.is_empty() {
        tracing::info!(trace_id = %trace_id, method = %method, path = %url, ua = %user_agent, "--> request");
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %url,
            body = %req_body,
            ua = %user_agent,
            "--> request"
        );
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let (parts, body) = response.into_parts();
    let bytes = buffer(body, usize::MAX).await;
    let resp_body = if policy.logs_response(status) && is_json(&parts.headers) && !bytes.is_empty() {
        snippet(&bytes, MAX_BODY_LOG_BYTES)
    } else {
        String::new()
    };
    log_response(&trace_id, status, &elapsed, &resp_body);

    let mut response = Response::from_parts(parts, Body::from(bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-Id", val);
    }
    response
}
