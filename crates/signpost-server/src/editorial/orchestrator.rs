use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use signpost_ai::schema::SCHEMA_VERSION;
use signpost_ai::{
    generate_batch, AttemptRecord, AttemptRecorder, EditorialAiError, GenerationOutcome,
    GenerationRequest, LoopSettings, ModelClient,
};
use signpost_common::id::next_id;
use signpost_common::types::{
    GeneratedCard, GenerationAttemptRow, GenerationJobRow, JobStatus, NewCard, TopicCategoryRow,
};
use signpost_rules::guards::card_text;
use signpost_rules::safety::{infer_risk_level, resolve_needs_sourcing};
use signpost_rules::topics::infer_topics;
use signpost_storage::{CompletedGeneration, EditorialStore, NewBatch, NewQuiz};
use std::sync::Arc;

use super::role::RoleResolver;

/// Writes every attempt to the `generation_attempts` table before the loop
/// moves on.
pub struct StoreRecorder {
    store: Arc<EditorialStore>,
}

impl StoreRecorder {
    pub fn new(store: Arc<EditorialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AttemptRecorder for StoreRecorder {
    async fn record(&self, attempt: AttemptRecord) -> Result<()> {
        let row = GenerationAttemptRow {
            id: next_id(),
            request_id: attempt.request_id,
            attempt_index: attempt.attempt_index,
            model_name: attempt.model_name,
            prompt_text: attempt.prompt_text,
            target_role: attempt.target_role,
            raw_model_output: attempt.raw_model_output,
            raw_model_json: attempt.raw_model_json,
            validation_errors: attempt.validation_errors,
            status: attempt.status,
            surgery_scope: attempt.surgery_scope,
            created_by: attempt.created_by,
            batch_id: None,
            created_at: Utc::now(),
        };
        self.store
            .insert_attempt(&row)
            .await
            .context("Failed to record generation attempt")
    }
}

/// 任务执行失败原因，`Display` 即写入任务的 error_message
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error(transparent)]
    Generation(#[from] EditorialAiError),
    #[error("SERVER_ERROR: {0:#}")]
    Internal(anyhow::Error),
}

/// 单次任务执行结果
#[derive(Debug)]
pub enum JobRun {
    /// 任务不存在、不是 PENDING，或已被其他执行者抢占
    Skipped,
    Completed(CompletedGeneration),
    Failed(JobFailure),
}

/// Drives one generation job from PENDING to a terminal state.
pub struct JobOrchestrator {
    store: Arc<EditorialStore>,
    model: Arc<dyn ModelClient>,
    role_resolver: Arc<dyn RoleResolver>,
    settings: LoopSettings,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<EditorialStore>,
        model: Arc<dyn ModelClient>,
        role_resolver: Arc<dyn RoleResolver>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            store,
            model,
            role_resolver,
            settings,
        }
    }

    pub fn role_resolver(&self) -> &dyn RoleResolver {
        self.role_resolver.as_ref()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Runs job `job_id` if it is still PENDING.
    ///
    /// Safe to call repeatedly and concurrently for the same id: the
    /// PENDING → RUNNING claim is a conditional update, so only one caller
    /// ever runs the loop. There is no automatic retry of a failed job.
    pub async fn run_generation_job(&self, job_id: &str) -> Result<JobRun> {
        let Some(job) = self.store.get_job(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Generation job not found");
            return Ok(JobRun::Skipped);
        };
        if job.status != JobStatus::Pending {
            tracing::debug!(job_id = %job_id, status = %job.status, "Generation job not pending");
            return Ok(JobRun::Skipped);
        }
        if !self.store.claim_job(job_id).await? {
            tracing::debug!(job_id = %job_id, "Generation job claimed elsewhere");
            return Ok(JobRun::Skipped);
        }

        tracing::info!(
            job_id = %job.id,
            scope = %job.surgery_scope,
            count = job.count,
            "Generation job started"
        );

        match self.execute(&job).await {
            Ok(done) => {
                tracing::info!(
                    job_id = %job.id,
                    batch_id = %done.batch_id,
                    cards = done.card_ids.len(),
                    "Generation job complete"
                );
                Ok(JobRun::Completed(done))
            }
            Err(failure) => {
                let message = failure.to_string();
                if !self.store.fail_job(&job.id, &message).await? {
                    tracing::warn!(job_id = %job.id, "Generation job already terminal when failing");
                }
                tracing::warn!(job_id = %job.id, error = %message, "Generation job failed");
                Ok(JobRun::Failed(failure))
            }
        }
    }

    async fn execute(&self, job: &GenerationJobRow) -> Result<CompletedGeneration, JobFailure> {
        let target_role = self
            .role_resolver
            .resolve(&job.prompt_text, job.target_role);

        let allowed_tags = self
            .store
            .list_allowed_tags()
            .await
            .map_err(JobFailure::Internal)?;

        let categories = match self.store.list_active_topic_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "Topic categories unavailable, skipping topic inference"
                );
                Vec::new()
            }
        };

        let request = GenerationRequest {
            request_id: job.id.clone(),
            surgery_scope: job.surgery_scope.clone(),
            created_by: job.created_by.clone(),
            prompt_text: job.prompt_text.clone(),
            target_role,
            count: job.count,
            tags: job.tags.clone(),
            allowed_tags,
            interactive_first: job.interactive_first,
        };

        let recorder = StoreRecorder::new(self.store.clone());
        let outcome =
            generate_batch(self.model.as_ref(), &recorder, &self.settings, &request).await?;

        let cards: Vec<NewCard> = outcome
            .batch
            .cards
            .iter()
            .map(|card| build_card(card, job, &outcome, &categories))
            .collect();

        let batch = NewBatch {
            surgery_scope: job.surgery_scope.clone(),
            created_by: job.created_by.clone(),
            prompt_text: job.prompt_text.clone(),
            target_role,
            model_used: outcome.model_used.clone(),
            generation_meta: Some(json!({
                "request_id": outcome.request_id,
                "schema_version": SCHEMA_VERSION,
                "attempts": outcome.attempts,
                "requested_role": job.target_role,
                "count": job.count,
                "interactive_first": job.interactive_first,
                "tags": job.tags,
            })),
        };
        let quiz = NewQuiz {
            title: outcome.batch.quiz.title.clone(),
            questions: outcome.batch.quiz.questions.clone(),
        };

        self.store
            .complete_generation(&job.id, &outcome.request_id, &batch, &cards, &quiz)
            .await
            .map_err(JobFailure::Internal)
    }
}

/// Stamps a validated card with risk, sourcing and a best-effort topic.
fn build_card(
    card: &GeneratedCard,
    job: &GenerationJobRow,
    outcome: &GenerationOutcome,
    categories: &[TopicCategoryRow],
) -> NewCard {
    let text = card_text(card);
    let topic = infer_topics(&format!("{} {}", card.title, job.prompt_text), categories)
        .into_iter()
        .next();

    NewCard {
        title: card.title.clone(),
        topic_id: topic.as_ref().map(|t| t.category_id.clone()),
        topic_subsection: topic.as_ref().map(|t| t.subsection.clone()),
        content_blocks: card.content_blocks.clone(),
        interactions: card.interactions.clone(),
        slot_language: card.slot_language.clone(),
        safety_netting: card.safety_netting.clone(),
        sources: card.sources.clone(),
        estimated_time_minutes: card.estimated_time_minutes,
        risk_level: infer_risk_level(&format!("{} {}", job.prompt_text, text)),
        needs_sourcing: resolve_needs_sourcing(&card.sources, card.needs_sourcing),
        tags: card.tags.clone(),
        generated_from: json!({
            "request_id": outcome.request_id,
            "model": outcome.model_used,
            "prompt_text": job.prompt_text,
            "topic_confidence": topic.as_ref().map(|t| t.confidence),
        }),
    }
}
