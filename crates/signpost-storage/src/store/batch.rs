use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use serde_json::Value;
use signpost_common::id::next_id;
use signpost_common::scope::Scope;
use signpost_common::types::{
    BatchStatus, CardRow, CardStatus, GenerationBatchRow, JobStatus, NewCard, QuizQuestion,
    QuizRow, TargetRole,
};

use super::card::new_card_model;
use super::{decode_json, decode_opt_json, encode_json, parse_enum, EditorialStore};
use crate::entities::card::{Column as CardCol, Entity as CardEntity};
use crate::entities::generation_attempt::{Column as AttemptCol, Entity as AttemptEntity};
use crate::entities::generation_batch::{self, Column as BatchCol, Entity as BatchEntity};
use crate::entities::generation_job::{Column as JobCol, Entity as JobEntity};
use crate::entities::quiz::{self, Column as QuizCol, Entity as QuizEntity};
use crate::error;

/// 待写入的批次头信息
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub surgery_scope: Scope,
    pub created_by: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub model_used: String,
    pub generation_meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

/// 生成完成后写入的实体 ID
#[derive(Debug, Clone, Serialize)]
pub struct CompletedGeneration {
    pub batch_id: String,
    pub card_ids: Vec<String>,
    pub quiz_id: String,
    pub created_at: DateTime<Utc>,
}

/// 批次及其卡片、测验
#[derive(Debug, Clone, Serialize)]
pub struct BatchBundle {
    pub batch: GenerationBatchRow,
    pub cards: Vec<CardRow>,
    pub quiz: Option<QuizRow>,
}

fn model_to_batch(m: generation_batch::Model) -> error::Result<GenerationBatchRow> {
    Ok(GenerationBatchRow {
        surgery_scope: Scope::from_surgery_id(m.surgery_id),
        target_role: parse_enum("target_role", &m.target_role)?,
        status: parse_enum("status", &m.status)?,
        generation_meta: decode_opt_json("generation_meta", m.generation_meta)?,
        id: m.id,
        created_by: m.created_by,
        prompt_text: m.prompt_text,
        model_used: m.model_used,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn model_to_quiz(m: quiz::Model) -> error::Result<QuizRow> {
    Ok(QuizRow {
        surgery_scope: Scope::from_surgery_id(m.surgery_id),
        questions: decode_json("questions", &m.questions)?,
        id: m.id,
        batch_id: m.batch_id,
        title: m.title,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl EditorialStore {
    /// Persists a successful generation in one transaction: the batch,
    /// the `batch_id` back-fill on every attempt of `request_id`, the cards,
    /// the quiz, and the RUNNING → COMPLETE transition of the job.
    ///
    /// Fails (and rolls back) if the job is no longer RUNNING.
    pub async fn complete_generation(
        &self,
        job_id: &str,
        request_id: &str,
        batch: &NewBatch,
        cards: &[NewCard],
        quiz: &NewQuiz,
    ) -> Result<CompletedGeneration> {
        let now = Utc::now().fixed_offset();
        let batch_id = next_id();
        let quiz_id = next_id();
        let surgery_id = batch.surgery_scope.surgery_id().map(str::to_string);

        let card_ids: Vec<String> = cards.iter().map(|_| next_id()).collect();
        let card_models = cards
            .iter()
            .zip(&card_ids)
            .map(|(card, id)| new_card_model(id, &batch_id, batch, card, now))
            .collect::<error::Result<Vec<_>>>()?;

        let txn = self.db().begin().await?;

        generation_batch::ActiveModel {
            id: Set(batch_id.clone()),
            surgery_id: Set(surgery_id.clone()),
            created_by: Set(batch.created_by.clone()),
            prompt_text: Set(batch.prompt_text.clone()),
            target_role: Set(batch.target_role.as_str().to_string()),
            model_used: Set(batch.model_used.clone()),
            status: Set(BatchStatus::Draft.as_str().to_string()),
            generation_meta: Set(batch
                .generation_meta
                .as_ref()
                .map(|v| encode_json("generation_meta", v))
                .transpose()?),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        AttemptEntity::update_many()
            .col_expr(AttemptCol::BatchId, Expr::value(batch_id.clone()))
            .filter(AttemptCol::RequestId.eq(request_id))
            .exec(&txn)
            .await?;

        if !card_models.is_empty() {
            CardEntity::insert_many(card_models)
                .exec_without_returning(&txn)
                .await?;
        }

        quiz::ActiveModel {
            id: Set(quiz_id.clone()),
            batch_id: Set(batch_id.clone()),
            surgery_id: Set(surgery_id),
            title: Set(quiz.title.clone()),
            questions: Set(encode_json("questions", &quiz.questions)?),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(JobStatus::Complete.as_str()))
            .col_expr(JobCol::BatchId, Expr::value(batch_id.clone()))
            .col_expr(JobCol::CompletedAt, Expr::value(now))
            .filter(JobCol::Id.eq(job_id))
            .filter(JobCol::Status.eq(JobStatus::Running.as_str()))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            anyhow::bail!("Job {job_id} is no longer running");
        }

        txn.commit().await?;

        tracing::info!(
            job_id = %job_id,
            batch_id = %batch_id,
            cards = card_ids.len(),
            "Generation batch persisted"
        );

        Ok(CompletedGeneration {
            batch_id,
            card_ids,
            quiz_id,
            created_at: now.with_timezone(&Utc),
        })
    }

    pub async fn get_batch(&self, id: &str) -> Result<Option<GenerationBatchRow>> {
        let m = BatchEntity::find_by_id(id).one(self.db()).await?;
        Ok(m.map(model_to_batch).transpose()?)
    }

    /// 批次 + 卡片 + 测验
    pub async fn get_batch_bundle(&self, id: &str) -> Result<Option<BatchBundle>> {
        let Some(batch) = self.get_batch(id).await? else {
            return Ok(None);
        };
        let cards = self.list_cards_by_batch(id).await?;
        let quiz = QuizEntity::find()
            .filter(QuizCol::BatchId.eq(id))
            .one(self.db())
            .await?
            .map(model_to_quiz)
            .transpose()?;
        Ok(Some(BatchBundle { batch, cards, quiz }))
    }

    /// Archives a batch together with all its cards. Returns the number of
    /// cards archived, or `None` when the batch does not exist.
    pub async fn archive_batch(&self, id: &str) -> Result<Option<u64>> {
        let now = Utc::now().fixed_offset();
        let txn = self.db().begin().await?;

        let res = BatchEntity::update_many()
            .col_expr(BatchCol::Status, Expr::value(BatchStatus::Archived.as_str()))
            .filter(BatchCol::Id.eq(id))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let cards = CardEntity::update_many()
            .col_expr(CardCol::Status, Expr::value(CardStatus::Archived.as_str()))
            .col_expr(CardCol::UpdatedAt, Expr::value(now))
            .filter(CardCol::BatchId.eq(id))
            .filter(CardCol::Status.ne(CardStatus::Archived.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(Some(cards.rows_affected))
    }
}
