use serde::{Deserialize, Serialize};

/// Tenant boundary under which content is generated and stored.
///
/// A surgery (practice) owns its own content; the shared global default
/// pseudo-tenant holds content every surgery inherits. Persisted as a
/// nullable `surgery_id` column where `NULL` means [`Scope::GlobalDefault`].
///
/// # Examples
///
/// ```
/// use signpost_common::scope::Scope;
///
/// let scope = Scope::from_surgery_id(Some("s-42".to_string()));
/// assert_eq!(scope, Scope::Tenant("s-42".to_string()));
/// assert_eq!(scope.surgery_id(), Some("s-42"));
/// assert_eq!(Scope::from_surgery_id(None), Scope::GlobalDefault);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Tenant(String),
    GlobalDefault,
}

impl Scope {
    /// 从数据库列值还原
    pub fn from_surgery_id(surgery_id: Option<String>) -> Self {
        match surgery_id {
            Some(id) if !id.is_empty() => Self::Tenant(id),
            _ => Self::GlobalDefault,
        }
    }

    /// 转换为数据库列值
    pub fn surgery_id(&self) -> Option<&str> {
        match self {
            Self::Tenant(id) => Some(id),
            Self::GlobalDefault => None,
        }
    }

    pub fn into_surgery_id(self) -> Option<String> {
        match self {
            Self::Tenant(id) => Some(id),
            Self::GlobalDefault => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::GlobalDefault)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "surgery:{id}"),
            Self::GlobalDefault => write!(f, "global"),
        }
    }
}
