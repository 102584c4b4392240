use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect,
    Statement,
};
use signpost_common::id::next_id;
use signpost_common::scope::Scope;
use signpost_common::types::{CreateGenerationJob, GenerationJobRow, JobStatus};

use super::{decode_json, encode_json, parse_enum, EditorialStore};
use crate::entities::generation_job::{self, Column as JobCol, Entity as JobEntity};
use crate::error;

/// 窗口内任务数未达上限时才插入；检查与写入为同一条语句
const INSERT_RATE_LIMITED_SQL: &str = "
INSERT INTO generation_jobs
    (id, surgery_id, created_by, prompt_text, target_role, count, tags, interactive_first, status, created_at)
SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
WHERE (
    SELECT COUNT(*) FROM generation_jobs
    WHERE created_by = $3 AND created_at >= $11
) < $12
";

/// 异常中断的任务统一使用该错误信息
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

fn model_to_job(m: generation_job::Model) -> error::Result<GenerationJobRow> {
    Ok(GenerationJobRow {
        surgery_scope: Scope::from_surgery_id(m.surgery_id),
        target_role: parse_enum("target_role", &m.target_role)?,
        count: m.count.max(0) as u32,
        tags: decode_json("tags", &m.tags)?,
        status: parse_enum("status", &m.status)?,
        id: m.id,
        created_by: m.created_by,
        prompt_text: m.prompt_text,
        interactive_first: m.interactive_first,
        batch_id: m.batch_id,
        error_message: m.error_message,
        created_at: m.created_at.with_timezone(&Utc),
        started_at: m.started_at.map(|t| t.with_timezone(&Utc)),
        completed_at: m.completed_at.map(|t| t.with_timezone(&Utc)),
    })
}

impl EditorialStore {
    /// Creates a PENDING job unless `created_by` already has `limit` jobs
    /// inside the trailing `window`. Returns `None` when rate limited.
    pub async fn insert_job_rate_limited(
        &self,
        req: &CreateGenerationJob,
        limit: u32,
        window: Duration,
    ) -> Result<Option<GenerationJobRow>> {
        let id = next_id();
        let now = Utc::now().fixed_offset();
        let since = now - window;
        let stmt = Statement::from_sql_and_values(
            self.db().get_database_backend(),
            INSERT_RATE_LIMITED_SQL,
            [
                id.clone().into(),
                req.surgery_scope.surgery_id().map(str::to_string).into(),
                req.created_by.clone().into(),
                req.prompt_text.clone().into(),
                req.target_role.as_str().into(),
                (req.count as i32).into(),
                encode_json("tags", &req.tags)?.into(),
                req.interactive_first.into(),
                JobStatus::Pending.as_str().into(),
                now.into(),
                since.into(),
                (limit as i64).into(),
            ],
        );

        let res = self.db().execute(stmt).await?;
        if res.rows_affected() == 0 {
            tracing::info!(
                created_by = %req.created_by,
                limit,
                "Generation job rejected by rate limit"
            );
            return Ok(None);
        }
        self.get_job(&id).await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<GenerationJobRow>> {
        let m = JobEntity::find_by_id(id).one(self.db()).await?;
        Ok(m.map(model_to_job).transpose()?)
    }

    /// PENDING → RUNNING. Returns false when the job is missing or was
    /// already claimed.
    pub async fn claim_job(&self, id: &str) -> Result<bool> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(JobStatus::Running.as_str()))
            .col_expr(JobCol::StartedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(JobCol::Id.eq(id))
            .filter(JobCol::Status.eq(JobStatus::Pending.as_str()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Marks a non-terminal job FAILED with `message` stored verbatim.
    pub async fn fail_job(&self, id: &str, message: &str) -> Result<bool> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(JobStatus::Failed.as_str()))
            .col_expr(JobCol::ErrorMessage, Expr::value(message))
            .col_expr(JobCol::CompletedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(JobCol::Id.eq(id))
            .filter(JobCol::Status.is_in([JobStatus::Pending.as_str(), JobStatus::Running.as_str()]))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// 按创建时间升序列出指定状态的任务
    pub async fn list_jobs_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<GenerationJobRow>> {
        let rows = JobEntity::find()
            .filter(JobCol::Status.eq(status.as_str()))
            .order_by(JobCol::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_job)
            .collect::<error::Result<Vec<_>>>()?)
    }

    /// Fails RUNNING jobs that started before `started_before`.
    pub async fn fail_stale_running_jobs(&self, started_before: DateTime<Utc>) -> Result<u64> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(JobStatus::Failed.as_str()))
            .col_expr(JobCol::ErrorMessage, Expr::value(INTERRUPTED_MESSAGE))
            .col_expr(JobCol::CompletedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(JobCol::Status.eq(JobStatus::Running.as_str()))
            .filter(JobCol::StartedAt.lt(started_before.fixed_offset()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
