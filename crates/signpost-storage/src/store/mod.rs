use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

use crate::error::{self, StorageError};

pub mod attempt;
pub mod batch;
pub mod card;
pub mod job;
pub mod reference;

pub use batch::{BatchBundle, CompletedGeneration, NewBatch, NewQuiz};
pub use card::{CardEdit, PublishOutcome};

/// 编辑内容数据库（signpost.db）的统一访问层。
///
/// 所有方法均为 `async fn`，底层使用 SeaORM + SQLite。
pub struct EditorialStore {
    pub(crate) db: DatabaseConnection,
}

impl EditorialStore {
    /// 连接并初始化数据库。
    ///
    /// - `db_url`：完整的数据库连接 URL，例如 `sqlite:///data/signpost.db?mode=rwc`
    /// - `data_dir`：本地数据目录，不存在时自动创建
    ///
    /// 自动运行 `sea-orm-migration` 迁移，确保 Schema 最新。
    pub async fn new(db_url: &str, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        let db = Database::connect(db_url)
            .await
            .with_context(|| format!("Failed to connect to {db_url}"))?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await.context("Failed to run migrations")?;

        tracing::info!(db_url = %db_url, "Initialized editorial store");
        Ok(Self { db })
    }

    /// 返回底层数据库连接引用（供子模块使用）。
    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 数据库连通性检查
    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

pub(crate) fn encode_json<T: Serialize + ?Sized>(
    column: &'static str,
    value: &T,
) -> error::Result<String> {
    serde_json::to_string(value).map_err(|source| StorageError::Json { column, source })
}

pub(crate) fn decode_json<T: DeserializeOwned>(column: &'static str, text: &str) -> error::Result<T> {
    serde_json::from_str(text).map_err(|source| StorageError::Json { column, source })
}

pub(crate) fn decode_opt_json<T: DeserializeOwned>(
    column: &'static str,
    text: Option<String>,
) -> error::Result<Option<T>> {
    text.map(|t| decode_json(column, &t)).transpose()
}

pub(crate) fn parse_enum<T: FromStr>(column: &'static str, value: &str) -> error::Result<T> {
    value.parse().map_err(|_| StorageError::InvalidValue {
        column,
        value: value.to_string(),
    })
}
