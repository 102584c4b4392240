use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use signpost_common::id::next_id;
use signpost_common::scope::Scope;
use signpost_common::types::{
    CardRow, CardSource, CardStatus, CardVersionRow, NewCard, RiskLevel,
};

use super::batch::NewBatch;
use super::{decode_json, decode_opt_json, encode_json, parse_enum, EditorialStore};
use crate::entities::card::{self, Column as CardCol, Entity as CardEntity};
use crate::entities::card_version::{self, Column as VersionCol, Entity as VersionEntity};
use crate::error::{self, StorageError};

/// Partial edit of a DRAFT or APPROVED card. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct CardEdit {
    pub title: Option<String>,
    pub review_by_date: Option<Option<NaiveDate>>,
    pub sources: Option<Vec<CardSource>>,
    pub tags: Option<Vec<String>>,
    pub topic_id: Option<Option<String>>,
    pub topic_subsection: Option<Option<String>>,
    pub needs_sourcing: Option<bool>,
    /// 只会被调高，由生命周期层计算
    pub risk_level: Option<RiskLevel>,
}

impl CardEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.review_by_date.is_none()
            && self.sources.is_none()
            && self.tags.is_none()
            && self.topic_id.is_none()
            && self.topic_subsection.is_none()
            && self.needs_sourcing.is_none()
            && self.risk_level.is_none()
    }
}

/// 发布操作结果
#[derive(Debug)]
pub enum PublishOutcome {
    Published(CardRow),
    /// 卡片不存在或状态不是 APPROVED（含并发发布中的落败方）
    NotApproved,
    /// 事务内复查未通过，附未满足的条件
    Refused(Vec<String>),
}

pub(crate) fn model_to_card(m: card::Model) -> error::Result<CardRow> {
    Ok(CardRow {
        surgery_scope: Scope::from_surgery_id(m.surgery_id),
        target_role: parse_enum("target_role", &m.target_role)?,
        content_blocks: decode_json("content_blocks", &m.content_blocks)?,
        interactions: decode_json("interactions", &m.interactions)?,
        slot_language: decode_opt_json("slot_language", m.slot_language)?,
        safety_netting: decode_json("safety_netting", &m.safety_netting)?,
        sources: decode_json("sources", &m.sources)?,
        estimated_time_minutes: m.estimated_time_minutes.max(0) as u32,
        risk_level: parse_enum("risk_level", &m.risk_level)?,
        tags: decode_json("tags", &m.tags)?,
        status: parse_enum("status", &m.status)?,
        version: m.version.max(0) as u32,
        generated_from: decode_json("generated_from", &m.generated_from)?,
        id: m.id,
        batch_id: m.batch_id,
        title: m.title,
        topic_id: m.topic_id,
        topic_subsection: m.topic_subsection,
        needs_sourcing: m.needs_sourcing,
        review_by_date: m.review_by_date,
        clinician_approved: m.clinician_approved,
        is_active: m.is_active,
        published_at: m.published_at.map(|t| t.with_timezone(&Utc)),
        published_by: m.published_by,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn model_to_version(m: card_version::Model) -> error::Result<CardVersionRow> {
    Ok(CardVersionRow {
        version: m.version.max(0) as u32,
        snapshot: decode_json("snapshot", &m.snapshot)?,
        id: m.id,
        card_id: m.card_id,
        published_at: m.published_at.with_timezone(&Utc),
        created_by: m.created_by,
    })
}

/// 新卡片一律为 DRAFT、版本 0、未经临床签核
pub(crate) fn new_card_model(
    id: &str,
    batch_id: &str,
    batch: &NewBatch,
    card: &NewCard,
    now: DateTime<FixedOffset>,
) -> error::Result<card::ActiveModel> {
    Ok(card::ActiveModel {
        id: Set(id.to_string()),
        batch_id: Set(batch_id.to_string()),
        surgery_id: Set(batch.surgery_scope.surgery_id().map(str::to_string)),
        target_role: Set(batch.target_role.as_str().to_string()),
        title: Set(card.title.clone()),
        topic_id: Set(card.topic_id.clone()),
        topic_subsection: Set(card.topic_subsection.clone()),
        content_blocks: Set(encode_json("content_blocks", &card.content_blocks)?),
        interactions: Set(encode_json("interactions", &card.interactions)?),
        slot_language: Set(card
            .slot_language
            .as_ref()
            .map(|s| encode_json("slot_language", s))
            .transpose()?),
        safety_netting: Set(encode_json("safety_netting", &card.safety_netting)?),
        sources: Set(encode_json("sources", &card.sources)?),
        estimated_time_minutes: Set(card.estimated_time_minutes as i32),
        risk_level: Set(card.risk_level.as_str().to_string()),
        needs_sourcing: Set(card.needs_sourcing),
        review_by_date: Set(None),
        tags: Set(encode_json("tags", &card.tags)?),
        status: Set(CardStatus::Draft.as_str().to_string()),
        version: Set(0),
        clinician_approved: Set(false),
        is_active: Set(true),
        published_at: Set(None),
        published_by: Set(None),
        generated_from: Set(encode_json("generated_from", &card.generated_from)?),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

impl EditorialStore {
    pub async fn get_card(&self, id: &str) -> Result<Option<CardRow>> {
        let m = CardEntity::find_by_id(id).one(self.db()).await?;
        Ok(m.map(model_to_card).transpose()?)
    }

    pub async fn list_cards_by_batch(&self, batch_id: &str) -> Result<Vec<CardRow>> {
        let rows = CardEntity::find()
            .filter(CardCol::BatchId.eq(batch_id))
            .order_by_asc(CardCol::CreatedAt)
            .order_by_asc(CardCol::Id)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_card)
            .collect::<error::Result<Vec<_>>>()?)
    }

    /// Moves a card to `to` only if its current status is one of `from`.
    pub async fn transition_card(
        &self,
        id: &str,
        from: &[CardStatus],
        to: CardStatus,
    ) -> Result<bool> {
        let res = CardEntity::update_many()
            .col_expr(CardCol::Status, Expr::value(to.as_str()))
            .col_expr(CardCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(CardCol::Id.eq(id))
            .filter(CardCol::Status.is_in(from.iter().map(CardStatus::as_str)))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Publishes an APPROVED card atomically.
    ///
    /// The transaction opens with the conditional status update, so of two
    /// concurrent publishes exactly one sees a row change. `recheck` runs on
    /// the freshly read row inside the transaction; any unmet requirement it
    /// returns rolls everything back.
    pub async fn publish_card<F>(&self, id: &str, actor: &str, recheck: F) -> Result<PublishOutcome>
    where
        F: FnOnce(&CardRow) -> Vec<String> + Send,
    {
        let now = Utc::now().fixed_offset();
        let txn = self.db().begin().await?;

        let res = CardEntity::update_many()
            .col_expr(CardCol::Status, Expr::value(CardStatus::Published.as_str()))
            .col_expr(CardCol::Version, Expr::col(CardCol::Version).add(1))
            .col_expr(CardCol::PublishedAt, Expr::value(now))
            .col_expr(CardCol::PublishedBy, Expr::value(actor))
            .col_expr(CardCol::UpdatedAt, Expr::value(now))
            .filter(CardCol::Id.eq(id))
            .filter(CardCol::Status.eq(CardStatus::Approved.as_str()))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(PublishOutcome::NotApproved);
        }

        let m = CardEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "card",
                id: id.to_string(),
            })?;
        let row = model_to_card(m)?;

        let unmet = recheck(&row);
        if !unmet.is_empty() {
            txn.rollback().await?;
            return Ok(PublishOutcome::Refused(unmet));
        }

        card_version::ActiveModel {
            id: Set(next_id()),
            card_id: Set(row.id.clone()),
            version: Set(row.version as i32),
            snapshot: Set(encode_json("snapshot", &row)?),
            published_at: Set(now),
            created_by: Set(actor.to_string()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(card_id = %row.id, version = row.version, actor = %actor, "Card published");
        Ok(PublishOutcome::Published(row))
    }

    /// Applies `edit` when the card is DRAFT or APPROVED. Returns `None`
    /// when the card is missing or in any other state.
    pub async fn update_card(&self, id: &str, edit: &CardEdit) -> Result<Option<CardRow>> {
        let mut q = CardEntity::update_many()
            .col_expr(CardCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()));
        if let Some(title) = &edit.title {
            q = q.col_expr(CardCol::Title, Expr::value(title.clone()));
        }
        if let Some(date) = edit.review_by_date {
            q = q.col_expr(CardCol::ReviewByDate, Expr::value(date));
        }
        if let Some(sources) = &edit.sources {
            q = q.col_expr(CardCol::Sources, Expr::value(encode_json("sources", sources)?));
        }
        if let Some(tags) = &edit.tags {
            q = q.col_expr(CardCol::Tags, Expr::value(encode_json("tags", tags)?));
        }
        if let Some(topic_id) = &edit.topic_id {
            q = q.col_expr(CardCol::TopicId, Expr::value(topic_id.clone()));
        }
        if let Some(subsection) = &edit.topic_subsection {
            q = q.col_expr(CardCol::TopicSubsection, Expr::value(subsection.clone()));
        }
        if let Some(flag) = edit.needs_sourcing {
            q = q.col_expr(CardCol::NeedsSourcing, Expr::value(flag));
        }
        if let Some(risk) = edit.risk_level {
            q = q.col_expr(CardCol::RiskLevel, Expr::value(risk.as_str()));
        }

        let res = q
            .filter(CardCol::Id.eq(id))
            .filter(CardCol::Status.is_in([
                CardStatus::Draft.as_str(),
                CardStatus::Approved.as_str(),
            ]))
            .exec(self.db())
            .await?;
        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.get_card(id).await
    }

    /// 临床签核（仅 DRAFT / APPROVED）
    pub async fn set_clinician_approved(&self, id: &str, approved: bool) -> Result<bool> {
        let res = CardEntity::update_many()
            .col_expr(CardCol::ClinicianApproved, Expr::value(approved))
            .col_expr(CardCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(CardCol::Id.eq(id))
            .filter(CardCol::Status.is_in([
                CardStatus::Draft.as_str(),
                CardStatus::Approved.as_str(),
            ]))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected == 1)
    }

    /// Flips `is_active`, independent of the lifecycle status.
    pub async fn toggle_card_active(&self, id: &str) -> Result<Option<CardRow>> {
        let Some(current) = CardEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        CardEntity::update_many()
            .col_expr(CardCol::IsActive, Expr::value(!current.is_active))
            .col_expr(CardCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(CardCol::Id.eq(id))
            .filter(CardCol::IsActive.eq(current.is_active))
            .exec(self.db())
            .await?;
        self.get_card(id).await
    }

    pub async fn list_card_versions(&self, card_id: &str) -> Result<Vec<CardVersionRow>> {
        let rows = VersionEntity::find()
            .filter(VersionCol::CardId.eq(card_id))
            .order_by_asc(VersionCol::Version)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_version)
            .collect::<error::Result<Vec<_>>>()?)
    }
}
