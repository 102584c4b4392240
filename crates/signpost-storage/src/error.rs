/// Errors raised while mapping between database rows and domain types.
///
/// Store methods return `anyhow::Result`; these variants are what ends up
/// inside when the failure is ours rather than the driver's.
///
/// # Examples
///
/// ```rust
/// use signpost_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "card",
///     id: "c-99".to_string(),
/// };
/// assert!(err.to_string().contains("card"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A text column holds a value outside its enum domain.
    #[error("Storage: invalid value {value:?} in column '{column}'")]
    InvalidValue { column: &'static str, value: String },

    /// A JSON column could not be encoded or decoded.
    #[error("Storage: JSON error in column '{column}': {source}")]
    Json {
        column: &'static str,
        source: serde_json::Error,
    },

    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Convenience `Result` alias for row mapping.
pub type Result<T> = std::result::Result<T, StorageError>;
