use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use signpost_common::scope::Scope;
use signpost_common::types::GenerationAttemptRow;

use super::{decode_opt_json, encode_json, parse_enum, EditorialStore};
use crate::entities::generation_attempt::{self, Column as AttemptCol, Entity as AttemptEntity};
use crate::error;

fn model_to_attempt(m: generation_attempt::Model) -> error::Result<GenerationAttemptRow> {
    Ok(GenerationAttemptRow {
        attempt_index: m.attempt_index.max(0) as u32,
        target_role: parse_enum("target_role", &m.target_role)?,
        raw_model_json: decode_opt_json("raw_model_json", m.raw_model_json)?,
        validation_errors: decode_opt_json("validation_errors", m.validation_errors)?,
        status: parse_enum("status", &m.status)?,
        surgery_scope: Scope::from_surgery_id(m.surgery_id),
        id: m.id,
        request_id: m.request_id,
        model_name: m.model_name,
        prompt_text: m.prompt_text,
        raw_model_output: m.raw_model_output,
        created_by: m.created_by,
        batch_id: m.batch_id,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl EditorialStore {
    /// 写入一次生成尝试（写入后仅 batch_id 可回填）
    pub async fn insert_attempt(&self, row: &GenerationAttemptRow) -> Result<()> {
        let am = generation_attempt::ActiveModel {
            id: Set(row.id.clone()),
            request_id: Set(row.request_id.clone()),
            attempt_index: Set(row.attempt_index as i32),
            model_name: Set(row.model_name.clone()),
            prompt_text: Set(row.prompt_text.clone()),
            target_role: Set(row.target_role.as_str().to_string()),
            raw_model_output: Set(row.raw_model_output.clone()),
            raw_model_json: Set(row
                .raw_model_json
                .as_ref()
                .map(|v| encode_json("raw_model_json", v))
                .transpose()?),
            validation_errors: Set(row
                .validation_errors
                .as_ref()
                .map(|v| encode_json("validation_errors", v))
                .transpose()?),
            status: Set(row.status.as_str().to_string()),
            surgery_id: Set(row.surgery_scope.surgery_id().map(str::to_string)),
            created_by: Set(row.created_by.clone()),
            batch_id: Set(row.batch_id.clone()),
            created_at: Set(row.created_at.fixed_offset()),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    /// 按尝试序号列出同一请求的全部尝试
    pub async fn list_attempts(&self, request_id: &str) -> Result<Vec<GenerationAttemptRow>> {
        let rows = AttemptEntity::find()
            .filter(AttemptCol::RequestId.eq(request_id))
            .order_by_asc(AttemptCol::AttemptIndex)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_attempt)
            .collect::<error::Result<Vec<_>>>()?)
    }
}
