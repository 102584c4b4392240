use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "generation_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub request_id: String,
    pub attempt_index: i32,
    pub model_name: String,
    pub prompt_text: String,
    pub target_role: String,
    pub raw_model_output: String,
    pub raw_model_json: Option<String>,
    pub validation_errors: Option<String>,
    pub status: String,
    pub surgery_id: Option<String>,
    pub created_by: String,
    pub batch_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::generation_batch::Entity",
        from = "Column::BatchId",
        to = "super::generation_batch::Column::Id"
    )]
    Batch,
}

impl Related<super::generation_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
