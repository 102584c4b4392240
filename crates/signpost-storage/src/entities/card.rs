use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cards")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub batch_id: String,
    pub surgery_id: Option<String>,
    pub target_role: String,
    pub title: String,
    pub topic_id: Option<String>,
    pub topic_subsection: Option<String>,
    pub content_blocks: String,
    pub interactions: String,
    pub slot_language: Option<String>,
    pub safety_netting: String,
    pub sources: String,
    pub estimated_time_minutes: i32,
    pub risk_level: String,
    pub needs_sourcing: bool,
    pub review_by_date: Option<Date>,
    pub tags: String,
    pub status: String,
    pub version: i32,
    pub clinician_approved: bool,
    pub is_active: bool,
    pub published_at: Option<DateTimeWithTimeZone>,
    pub published_by: Option<String>,
    pub generated_from: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::generation_batch::Entity",
        from = "Column::BatchId",
        to = "super::generation_batch::Column::Id"
    )]
    Batch,
    #[sea_orm(has_many = "super::card_version::Entity")]
    Version,
}

impl Related<super::generation_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl Related<super::card_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Version.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
