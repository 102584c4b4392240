use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// Implements `as_str` / `Display` / `FromStr` for a unit-only enum whose
/// persisted form is the snake_case variant name.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {}: {s}", stringify!($name))),
                }
            }
        }
    };
}

/// Audience a card is written for.
///
/// # Examples
///
/// ```
/// use signpost_common::types::TargetRole;
///
/// let role: TargetRole = "admin".parse().unwrap();
/// assert_eq!(role, TargetRole::Admin);
/// assert_eq!(role.to_string(), "admin");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    Admin,
    Gp,
    Nurse,
}

string_enum!(TargetRole { Admin => "admin", Gp => "gp", Nurse => "nurse" });

impl TargetRole {
    /// 用于 prompt 的受众描述
    pub fn audience(&self) -> &'static str {
        match self {
            Self::Admin => "reception and care-navigation (admin) staff",
            Self::Gp => "GPs and other prescribing clinicians",
            Self::Nurse => "practice nurses and healthcare assistants",
        }
    }
}

/// 生成任务状态（单向流转：pending → running → complete | failed）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

string_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Complete => "complete",
    Failed => "failed",
});

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// 单次模型调用的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    SchemaMismatch,
    ValidationFailed,
}

string_enum!(AttemptStatus {
    Success => "success",
    SchemaMismatch => "schema_mismatch",
    ValidationFailed => "validation_failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    Archived,
}

string_enum!(BatchStatus { Draft => "draft", Archived => "archived" });

/// 卡片生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Draft,
    Approved,
    Published,
    Archived,
}

string_enum!(CardStatus {
    Draft => "draft",
    Approved => "approved",
    Published => "published",
    Archived => "archived",
});

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    High,
}

string_enum!(RiskLevel { Low => "low", High => "high" });

// ---- card-batch payload (structure the model must produce) ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentBlockKind {
    Paragraph,
    Callout,
    Steps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: ContentBlockKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    MultipleChoice,
    TrueFalse,
    Scenario,
    Reflection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer_index: Option<usize>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// 分诊时段指引（按紧急程度命名的时段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SlotGuidance {
    pub slot: String,
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SlotLanguage {
    #[serde(default)]
    pub relevant: bool,
    #[serde(default)]
    pub guidance: Vec<SlotGuidance>,
}

impl SlotLanguage {
    /// 没有任何有效指引条目即视为空
    pub fn is_empty(&self) -> bool {
        self.guidance
            .iter()
            .all(|g| g.slot.trim().is_empty() && g.rule.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CardSource {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// 模型生成的单张卡片（已通过 schema 校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeneratedCard {
    pub title: String,
    pub content_blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub slot_language: Option<SlotLanguage>,
    #[serde(default)]
    pub safety_netting: Vec<String>,
    #[serde(default)]
    pub sources: Vec<CardSource>,
    pub estimated_time_minutes: u32,
    #[serde(default)]
    pub needs_sourcing: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeneratedQuiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeneratedBatch {
    pub cards: Vec<GeneratedCard>,
    pub quiz: GeneratedQuiz,
}

// ---- persisted rows ----

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerationJobRow {
    pub id: String,
    pub surgery_scope: Scope,
    pub created_by: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub count: u32,
    pub tags: Vec<String>,
    pub interactive_first: bool,
    pub status: JobStatus,
    pub batch_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 创建生成任务请求
#[derive(Debug, Clone)]
pub struct CreateGenerationJob {
    pub surgery_scope: Scope,
    pub created_by: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub count: u32,
    pub tags: Vec<String>,
    pub interactive_first: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerationAttemptRow {
    pub id: String,
    pub request_id: String,
    pub attempt_index: u32,
    pub model_name: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub raw_model_output: String,
    #[schema(value_type = Option<Object>)]
    pub raw_model_json: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub validation_errors: Option<serde_json::Value>,
    pub status: AttemptStatus,
    pub surgery_scope: Scope,
    pub created_by: String,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GenerationBatchRow {
    pub id: String,
    pub surgery_scope: Scope,
    pub created_by: String,
    pub prompt_text: String,
    pub target_role: TargetRole,
    pub model_used: String,
    pub status: BatchStatus,
    #[schema(value_type = Option<Object>)]
    pub generation_meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CardRow {
    pub id: String,
    pub batch_id: String,
    pub surgery_scope: Scope,
    pub target_role: TargetRole,
    pub title: String,
    pub topic_id: Option<String>,
    pub topic_subsection: Option<String>,
    pub content_blocks: Vec<ContentBlock>,
    pub interactions: Vec<Interaction>,
    pub slot_language: Option<SlotLanguage>,
    pub safety_netting: Vec<String>,
    pub sources: Vec<CardSource>,
    pub estimated_time_minutes: u32,
    pub risk_level: RiskLevel,
    pub needs_sourcing: bool,
    pub review_by_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub status: CardStatus,
    pub version: u32,
    pub clinician_approved: bool,
    pub is_active: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub published_by: Option<String>,
    #[schema(value_type = Object)]
    pub generated_from: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 待写入的新卡片（由生成结果 + 推断结果组装）
#[derive(Debug, Clone)]
pub struct NewCard {
    pub title: String,
    pub topic_id: Option<String>,
    pub topic_subsection: Option<String>,
    pub content_blocks: Vec<ContentBlock>,
    pub interactions: Vec<Interaction>,
    pub slot_language: Option<SlotLanguage>,
    pub safety_netting: Vec<String>,
    pub sources: Vec<CardSource>,
    pub estimated_time_minutes: u32,
    pub risk_level: RiskLevel,
    pub needs_sourcing: bool,
    pub tags: Vec<String>,
    pub generated_from: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CardVersionRow {
    pub id: String,
    pub card_id: String,
    pub version: u32,
    #[schema(value_type = Object)]
    pub snapshot: serde_json::Value,
    pub published_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuizRow {
    pub id: String,
    pub batch_id: String,
    pub surgery_scope: Scope,
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub created_at: DateTime<Utc>,
}

/// 主题分类（含子分类标签）
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TopicCategoryRow {
    pub id: String,
    pub name: String,
    pub subsections: Vec<String>,
    pub active: bool,
}
