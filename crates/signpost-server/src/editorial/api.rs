use crate::api::{error_response, error_response_with_data, success_response, ApiError};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use signpost_ai::prompt::{build_generation_prompt, PromptInput};
use signpost_ai::{EditorialAiError, ErrorCode, IssueDetail};
use signpost_common::scope::Scope;
use signpost_common::types::{
    CardRow, CardSource, CardVersionRow, CreateGenerationJob, GenerationAttemptRow,
    GenerationBatchRow, GenerationJobRow, JobStatus, QuizRow, TargetRole,
};
use signpost_storage::CardEdit;
use std::collections::BTreeSet;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::lifecycle::LifecycleError;
use super::orchestrator::{JobFailure, JobRun};

const MIN_PROMPT_CHARS: usize = 10;
const MAX_CARD_COUNT: u32 = 10;
const DEFAULT_CARD_COUNT: u32 = 5;

/// 作用域查询参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeQuery {
    /// 诊所 ID，缺省表示全局默认内容
    #[param(required = false)]
    #[serde(default)]
    pub surgery_id: Option<String>,
}

impl ScopeQuery {
    fn scope(&self) -> Scope {
        Scope::from_surgery_id(self.surgery_id.clone())
    }
}

/// 生成请求
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// 诊所 ID，缺省表示全局默认内容
    #[serde(default)]
    pub surgery_id: Option<String>,
    /// 生成主题描述（至少 10 个字符）
    pub prompt_text: String,
    /// 目标受众（默认 admin）
    #[serde(default)]
    pub target_role: Option<TargetRole>,
    /// 卡片数量（1-10，默认 5）
    #[serde(default)]
    pub count: Option<u32>,
    /// 期望使用的标签
    #[serde(default)]
    pub tags: Vec<String>,
    /// 是否优先生成互动内容（默认 true）
    #[serde(default)]
    pub interactive_first: Option<bool>,
}

/// 校验通过的生成参数
struct GenerateInput {
    scope: Scope,
    prompt_text: String,
    target_role: TargetRole,
    count: u32,
    tags: Vec<String>,
    interactive_first: bool,
}

impl GenerateRequest {
    fn validate(self) -> Result<GenerateInput, String> {
        let prompt_text = self.prompt_text.trim().to_string();
        if prompt_text.chars().count() < MIN_PROMPT_CHARS {
            return Err(format!(
                "prompt_text must be at least {MIN_PROMPT_CHARS} characters"
            ));
        }
        let count = self.count.unwrap_or(DEFAULT_CARD_COUNT);
        if !(1..=MAX_CARD_COUNT).contains(&count) {
            return Err(format!("count must be between 1 and {MAX_CARD_COUNT}"));
        }
        let tags = normalize_tags(&self.tags);
        Ok(GenerateInput {
            scope: Scope::from_surgery_id(self.surgery_id),
            prompt_text,
            target_role: self.target_role.unwrap_or(TargetRole::Admin),
            count,
            tags,
            interactive_first: self.interactive_first.unwrap_or(true),
        })
    }
}

/// 同步生成成功响应
#[derive(Serialize, ToSchema)]
struct GenerateResponse {
    batch_id: String,
    card_ids: Vec<String>,
    quiz_id: String,
    created_at: DateTime<Utc>,
    /// 生成请求 ID（等于任务 ID），可用于查询尝试记录
    trace_id: String,
}

/// 异步生成已受理响应
#[derive(Serialize, ToSchema)]
struct JobAcceptedResponse {
    job_id: String,
    status: JobStatus,
}

/// 生成失败详情
#[derive(Serialize, ToSchema)]
struct GenerationFailureDetail {
    request_id: String,
    /// 全部问题列表
    #[schema(value_type = Vec<Object>)]
    issues: Vec<IssueDetail>,
    /// 模型原始输出片段（仅非生产环境或特权调用方）
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_snippet: Option<String>,
}

/// 提示词预览
#[derive(Serialize, ToSchema)]
struct PreviewResponse {
    target_role: TargetRole,
    system_prompt: String,
    user_prompt: String,
}

/// 批次详情
#[derive(Serialize, ToSchema)]
struct BatchResponse {
    batch: GenerationBatchRow,
    cards: Vec<CardRow>,
    quiz: Option<QuizRow>,
}

#[derive(Serialize, ToSchema)]
struct ArchiveBatchResponse {
    batch_id: String,
    /// 本次被归档的卡片数
    archived_cards: u64,
}

/// 未满足的状态条件
#[derive(Serialize, ToSchema)]
struct InvalidStateDetail {
    unmet: Vec<String>,
}

/// Deserializes a field that distinguishes "absent" from `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 卡片编辑请求（缺省字段保持不变，null 表示清空）
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CardEditRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = Date)]
    pub review_by_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub sources: Option<Vec<CardSource>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub topic_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub topic_subsection: Option<Option<String>>,
    #[serde(default)]
    pub needs_sourcing: Option<bool>,
}

/// 去空白、转小写、去重（按字母序）
fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl CardEditRequest {
    fn into_edit(self) -> Result<CardEdit, String> {
        let title = match self.title {
            Some(t) if t.trim().is_empty() => return Err("title cannot be empty".to_string()),
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        Ok(CardEdit {
            title,
            review_by_date: self.review_by_date,
            sources: self.sources,
            tags: self.tags.as_deref().map(normalize_tags),
            topic_id: self.topic_id,
            topic_subsection: self.topic_subsection,
            needs_sourcing: self.needs_sourcing,
            risk_level: None,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignoffRequest {
    /// true 为签署，false 为撤回
    pub approved: bool,
}

fn storage_failure(trace_id: &str, e: anyhow::Error, what: &str) -> Response {
    tracing::error!(error = %e, "{what}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        "Database error",
    )
}

fn forbidden(trace_id: &str) -> Response {
    error_response(
        StatusCode::FORBIDDEN,
        trace_id,
        "forbidden",
        "Not authorised for this scope",
    )
}

fn superuser_required(trace_id: &str) -> Response {
    error_response(
        StatusCode::FORBIDDEN,
        trace_id,
        "forbidden",
        "Superuser role required",
    )
}

fn lifecycle_error_response(trace_id: &str, err: LifecycleError) -> Response {
    match err {
        LifecycleError::NotFound => error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "Card not found",
        ),
        LifecycleError::Forbidden => forbidden(trace_id),
        LifecycleError::InvalidState(unmet) => error_response_with_data(
            StatusCode::CONFLICT,
            trace_id,
            "invalid_state",
            &format!("{}: {}", ErrorCode::InvalidState, unmet.join("; ")),
            InvalidStateDetail { unmet },
        ),
        LifecycleError::Storage(e) => storage_failure(trace_id, e, "Card lifecycle storage error"),
    }
}

/// Renders a loop failure with its full issue list. The raw snippet is kept
/// only when `reveal_snippet` is set.
fn generation_error_response(
    trace_id: &str,
    err: EditorialAiError,
    reveal_snippet: bool,
) -> Response {
    let (status, code) = match err.code {
        ErrorCode::SchemaMismatch => (StatusCode::UNPROCESSABLE_ENTITY, "schema_mismatch"),
        ErrorCode::ValidationFailed => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
        ErrorCode::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        ErrorCode::InvalidState => (StatusCode::CONFLICT, "invalid_state"),
        ErrorCode::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    let msg = err.to_string();
    error_response_with_data(
        status,
        trace_id,
        code,
        &msg,
        GenerationFailureDetail {
            request_id: err.request_id,
            issues: err.issues,
            raw_snippet: if reveal_snippet {
                err.debug_snippet
            } else {
                None
            },
        },
    )
}

fn reveals_raw_output(state: &AppState, claims: &Claims) -> bool {
    !state.config.is_production() || claims.is_superuser()
}

/// 提交生成任务。
/// 同步模式下直接返回批次；异步模式下返回 202 与任务 ID。
#[utoipa::path(
    post,
    path = "/v1/editorial/generate",
    tag = "Generation",
    security(("bearer_auth" = [])),
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "生成完成", body = GenerateResponse),
        (status = 202, description = "任务已受理", body = JobAcceptedResponse),
        (status = 400, description = "请求参数错误", body = ApiError),
        (status = 403, description = "无权访问该范围", body = ApiError),
        (status = 422, description = "模型输出未通过校验", body = ApiError),
        (status = 429, description = "超过每小时生成次数", body = ApiError)
    )
)]
async fn generate(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let input = match req.validate() {
        Ok(input) => input,
        Err(msg) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg)
        }
    };
    if !claims.can_edit(&input.scope) {
        return forbidden(&trace_id);
    }

    let limit = state.config.generation.rate_limit_per_hour;
    let create = CreateGenerationJob {
        surgery_scope: input.scope,
        created_by: claims.sub.clone(),
        prompt_text: input.prompt_text,
        target_role: input.target_role,
        count: input.count,
        tags: input.tags,
        interactive_first: input.interactive_first,
    };
    let job = match state
        .store
        .insert_job_rate_limited(&create, limit, chrono::Duration::hours(1))
        .await
    {
        Ok(Some(job)) => job,
        Ok(None) => {
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                &trace_id,
                "rate_limited",
                &format!(
                    "{}: at most {limit} generations per hour",
                    ErrorCode::RateLimited
                ),
            )
        }
        Err(e) => return storage_failure(&trace_id, e, "Failed to create generation job"),
    };

    if state.config.generation.async_jobs {
        state.jobs.dispatch(&job.id);
        return success_response(
            StatusCode::ACCEPTED,
            &trace_id,
            JobAcceptedResponse {
                job_id: job.id,
                status: job.status,
            },
        );
    }

    match state.orchestrator.run_generation_job(&job.id).await {
        Ok(JobRun::Completed(done)) => success_response(
            StatusCode::CREATED,
            &trace_id,
            GenerateResponse {
                batch_id: done.batch_id,
                card_ids: done.card_ids,
                quiz_id: done.quiz_id,
                created_at: done.created_at,
                trace_id: job.id,
            },
        ),
        Ok(JobRun::Failed(JobFailure::Generation(err))) => {
            generation_error_response(&trace_id, err, reveals_raw_output(&state, &claims))
        }
        Ok(JobRun::Failed(JobFailure::Internal(e))) => {
            tracing::error!(job_id = %job.id, error = %e, "Generation job failed internally");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Generation failed",
            )
        }
        Ok(JobRun::Skipped) => error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "conflict",
            "Generation job was claimed by another worker",
        ),
        Err(e) => storage_failure(&trace_id, e, "Failed to run generation job"),
    }
}

/// 预览生成提示词（不调用模型）。
/// 鉴权：仅 superuser。
#[utoipa::path(
    post,
    path = "/v1/editorial/generate/preview",
    tag = "Generation",
    security(("bearer_auth" = [])),
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "提示词预览", body = PreviewResponse),
        (status = 400, description = "请求参数错误", body = ApiError),
        (status = 403, description = "需要 superuser", body = ApiError)
    )
)]
async fn preview_generation(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    if !claims.is_superuser() {
        return superuser_required(&trace_id);
    }
    let input = match req.validate() {
        Ok(input) => input,
        Err(msg) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg)
        }
    };
    let allowed_tags = match state.store.list_allowed_tags().await {
        Ok(tags) => tags,
        Err(e) => return storage_failure(&trace_id, e, "Failed to load allowed tags"),
    };

    let target_role = state
        .orchestrator
        .role_resolver()
        .resolve(&input.prompt_text, input.target_role);
    let prompt = build_generation_prompt(&PromptInput {
        prompt_text: &input.prompt_text,
        target_role,
        count: input.count,
        interactive_first: input.interactive_first,
        allowed_tags: &allowed_tags,
        requested_tags: &input.tags,
        previous_issues: &[],
    });
    success_response(
        StatusCode::OK,
        &trace_id,
        PreviewResponse {
            target_role,
            system_prompt: prompt.system_prompt,
            user_prompt: prompt.user_prompt,
        },
    )
}

async fn load_job(
    state: &AppState,
    trace_id: &str,
    claims: &Claims,
    id: &str,
) -> Result<GenerationJobRow, Response> {
    match state.store.get_job(id).await {
        Ok(Some(job)) if claims.can_edit(&job.surgery_scope) => Ok(job),
        Ok(Some(_)) => Err(forbidden(trace_id)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            trace_id,
            "not_found",
            "Job not found",
        )),
        Err(e) => Err(storage_failure(trace_id, e, "Failed to load generation job")),
    }
}

/// 查询生成任务状态
#[utoipa::path(
    get,
    path = "/v1/editorial/jobs/{id}",
    tag = "Generation",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "任务 ID")),
    responses(
        (status = 200, description = "任务详情", body = GenerationJobRow),
        (status = 403, description = "无权访问该范围", body = ApiError),
        (status = 404, description = "任务不存在", body = ApiError)
    )
)]
async fn get_job(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match load_job(&state, &trace_id, &claims, &id).await {
        Ok(job) => success_response(StatusCode::OK, &trace_id, job),
        Err(resp) => resp,
    }
}

/// 查询任务的全部模型调用记录。
/// 生产环境下仅 superuser 可见模型原始输出。
#[utoipa::path(
    get,
    path = "/v1/editorial/jobs/{id}/attempts",
    tag = "Generation",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "任务 ID")),
    responses(
        (status = 200, description = "尝试记录（按序号升序）", body = Vec<GenerationAttemptRow>),
        (status = 403, description = "无权访问该范围", body = ApiError),
        (status = 404, description = "任务不存在", body = ApiError)
    )
)]
async fn list_job_attempts(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let job = match load_job(&state, &trace_id, &claims, &id).await {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    let mut attempts = match state.store.list_attempts(&job.id).await {
        Ok(rows) => rows,
        Err(e) => return storage_failure(&trace_id, e, "Failed to list generation attempts"),
    };
    if !reveals_raw_output(&state, &claims) {
        for attempt in &mut attempts {
            attempt.raw_model_output.clear();
            attempt.raw_model_json = None;
        }
    }
    success_response(StatusCode::OK, &trace_id, attempts)
}

/// 获取批次及其卡片与测验
#[utoipa::path(
    get,
    path = "/v1/editorial/batches/{id}",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "批次 ID"), ScopeQuery),
    responses(
        (status = 200, description = "批次详情", body = BatchResponse),
        (status = 403, description = "无权访问该范围", body = ApiError),
        (status = 404, description = "批次不存在", body = ApiError)
    )
)]
async fn get_batch(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    let claimed = query.scope();
    if !claims.can_edit(&claimed) {
        return forbidden(&trace_id);
    }
    match state.store.get_batch_bundle(&id).await {
        Ok(Some(bundle)) if bundle.batch.surgery_scope == claimed => success_response(
            StatusCode::OK,
            &trace_id,
            BatchResponse {
                batch: bundle.batch,
                cards: bundle.cards,
                quiz: bundle.quiz,
            },
        ),
        Ok(_) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Batch not found",
        ),
        Err(e) => storage_failure(&trace_id, e, "Failed to load batch"),
    }
}

/// 归档批次及其全部卡片
#[utoipa::path(
    post,
    path = "/v1/editorial/batches/{id}/archive",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "批次 ID"), ScopeQuery),
    responses(
        (status = 200, description = "已归档", body = ArchiveBatchResponse),
        (status = 403, description = "无权访问该范围", body = ApiError),
        (status = 404, description = "批次不存在", body = ApiError)
    )
)]
async fn archive_batch(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    let claimed = query.scope();
    if !claims.can_edit(&claimed) {
        return forbidden(&trace_id);
    }
    let not_found = || {
        error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Batch not found",
        )
    };
    match state.store.get_batch(&id).await {
        Ok(Some(batch)) if batch.surgery_scope == claimed => {}
        Ok(_) => return not_found(),
        Err(e) => return storage_failure(&trace_id, e, "Failed to load batch"),
    }
    match state.store.archive_batch(&id).await {
        Ok(Some(archived_cards)) => {
            tracing::info!(batch_id = %id, archived_cards, actor = %claims.username, "Batch archived");
            success_response(
                StatusCode::OK,
                &trace_id,
                ArchiveBatchResponse {
                    batch_id: id,
                    archived_cards,
                },
            )
        }
        Ok(None) => not_found(),
        Err(e) => storage_failure(&trace_id, e, "Failed to archive batch"),
    }
}

/// 编辑草稿或已审核卡片
#[utoipa::path(
    patch,
    path = "/v1/editorial/cards/{id}",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    request_body = CardEditRequest,
    responses(
        (status = 200, description = "更新后的卡片", body = CardRow),
        (status = 400, description = "请求参数错误", body = ApiError),
        (status = 404, description = "卡片不存在", body = ApiError),
        (status = 409, description = "状态不允许编辑", body = ApiError)
    )
)]
async fn edit_card(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
    Json(req): Json<CardEditRequest>,
) -> impl IntoResponse {
    let edit = match req.into_edit() {
        Ok(edit) => edit,
        Err(msg) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg)
        }
    };
    match state
        .lifecycle
        .edit(&id, &query.scope(), &claims, edit)
        .await
    {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 审核通过（DRAFT → APPROVED）
#[utoipa::path(
    post,
    path = "/v1/editorial/cards/{id}/approve",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    responses(
        (status = 200, description = "已审核", body = CardRow),
        (status = 404, description = "卡片不存在", body = ApiError),
        (status = 409, description = "状态不允许", body = ApiError)
    )
)]
async fn approve_card(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    match state.lifecycle.approve(&id, &query.scope(), &claims).await {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 发布卡片并写入版本快照。
/// 所有未满足的发布条件会一并返回。
#[utoipa::path(
    post,
    path = "/v1/editorial/cards/{id}/publish",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    responses(
        (status = 200, description = "已发布", body = CardRow),
        (status = 404, description = "卡片不存在", body = ApiError),
        (status = 409, description = "未满足发布条件", body = ApiError)
    )
)]
async fn publish_card(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    match state.lifecycle.publish(&id, &query.scope(), &claims).await {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 归档卡片（任意状态均可）
#[utoipa::path(
    post,
    path = "/v1/editorial/cards/{id}/archive",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    responses(
        (status = 200, description = "已归档", body = CardRow),
        (status = 404, description = "卡片不存在", body = ApiError),
        (status = 409, description = "卡片已归档", body = ApiError)
    )
)]
async fn archive_card(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    match state.lifecycle.archive(&id, &query.scope(), &claims).await {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 临床签署（高风险卡片发布前必需）。
/// 鉴权：仅 superuser。
#[utoipa::path(
    post,
    path = "/v1/editorial/cards/{id}/clinician-signoff",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    request_body = SignoffRequest,
    responses(
        (status = 200, description = "签署状态已更新", body = CardRow),
        (status = 403, description = "需要 superuser", body = ApiError),
        (status = 404, description = "卡片不存在", body = ApiError),
        (status = 409, description = "状态不允许", body = ApiError)
    )
)]
async fn clinician_signoff(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
    Json(req): Json<SignoffRequest>,
) -> impl IntoResponse {
    if !claims.is_superuser() {
        return superuser_required(&trace_id);
    }
    match state
        .lifecycle
        .clinician_signoff(&id, &query.scope(), &claims, req.approved)
        .await
    {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 切换卡片可见性（与审核状态无关）。
/// 鉴权：仅 superuser。
#[utoipa::path(
    post,
    path = "/v1/editorial/cards/{id}/toggle-active",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    responses(
        (status = 200, description = "切换后的卡片", body = CardRow),
        (status = 403, description = "需要 superuser", body = ApiError),
        (status = 404, description = "卡片不存在", body = ApiError)
    )
)]
async fn toggle_card_active(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    if !claims.is_superuser() {
        return superuser_required(&trace_id);
    }
    match state
        .lifecycle
        .toggle_active(&id, &query.scope(), &claims)
        .await
    {
        Ok(card) => success_response(StatusCode::OK, &trace_id, card),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

/// 卡片发布版本历史
#[utoipa::path(
    get,
    path = "/v1/editorial/cards/{id}/versions",
    tag = "Cards",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "卡片 ID"), ScopeQuery),
    responses(
        (status = 200, description = "版本快照（按版本升序）", body = Vec<CardVersionRow>),
        (status = 404, description = "卡片不存在", body = ApiError)
    )
)]
async fn list_card_versions(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> impl IntoResponse {
    match state.lifecycle.versions(&id, &query.scope(), &claims).await {
        Ok(versions) => success_response(StatusCode::OK, &trace_id, versions),
        Err(e) => lifecycle_error_response(&trace_id, e),
    }
}

pub fn editorial_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(generate))
        .routes(routes!(preview_generation))
        .routes(routes!(get_job))
        .routes(routes!(list_job_attempts))
        .routes(routes!(get_batch))
        .routes(routes!(archive_batch))
        .routes(routes!(edit_card))
        .routes(routes!(approve_card))
        .routes(routes!(publish_card))
        .routes(routes!(archive_card))
        .routes(routes!(clinician_signoff))
        .routes(routes!(toggle_card_active))
        .routes(routes!(list_card_versions))
}
