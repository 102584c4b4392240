use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder,
};
use signpost_common::id::next_id;
use signpost_common::types::TopicCategoryRow;

use super::{decode_json, encode_json, EditorialStore};
use crate::entities::allowed_tag::{self, Column as TagCol, Entity as TagEntity};
use crate::entities::topic_category::{self, Column as TopicCol, Entity as TopicEntity};
use crate::error;

fn model_to_category(m: topic_category::Model) -> error::Result<TopicCategoryRow> {
    Ok(TopicCategoryRow {
        subsections: decode_json("subsections", &m.subsections)?,
        id: m.id,
        name: m.name,
        active: m.active,
    })
}

impl EditorialStore {
    // ---- Topic categories ----

    pub async fn list_active_topic_categories(&self) -> Result<Vec<TopicCategoryRow>> {
        let rows = TopicEntity::find()
            .filter(TopicCol::Active.eq(true))
            .order_by_asc(TopicCol::Name)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(model_to_category)
            .collect::<error::Result<Vec<_>>>()?)
    }

    /// 按名称插入或更新主题分类
    pub async fn upsert_topic_category(
        &self,
        name: &str,
        subsections: &[String],
        active: bool,
    ) -> Result<TopicCategoryRow> {
        let now = Utc::now().fixed_offset();
        let subsections_json = encode_json("subsections", subsections)?;
        let existing = TopicEntity::find()
            .filter(TopicCol::Name.eq(name))
            .one(self.db())
            .await?;

        let m = match existing {
            Some(m) => {
                let mut am = m.into_active_model();
                am.subsections = Set(subsections_json);
                am.active = Set(active);
                am.updated_at = Set(now);
                am.update(self.db()).await?
            }
            None => {
                topic_category::ActiveModel {
                    id: Set(next_id()),
                    name: Set(name.to_string()),
                    subsections: Set(subsections_json),
                    active: Set(active),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db())
                .await?
            }
        };
        Ok(model_to_category(m)?)
    }

    // ---- Allowed tags ----

    pub async fn list_allowed_tags(&self) -> Result<Vec<String>> {
        let rows = TagEntity::find()
            .order_by_asc(TagCol::Tag)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(|m| m.tag).collect())
    }

    /// 插入标签（已存在时返回 false）
    pub async fn insert_allowed_tag(&self, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_lowercase();
        let exists = TagEntity::find()
            .filter(TagCol::Tag.eq(tag.as_str()))
            .one(self.db())
            .await?
            .is_some();
        if exists {
            return Ok(false);
        }
        allowed_tag::ActiveModel {
            id: Set(next_id()),
            tag: Set(tag),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(self.db())
        .await?;
        Ok(true)
    }
}
