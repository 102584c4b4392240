use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 按依赖顺序建表
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// surgery_id 为 NULL 表示全局默认租户；JSON 字段以 TEXT 保存
const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS generation_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    surgery_id TEXT,
    created_by TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    target_role TEXT NOT NULL,
    count INTEGER NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    interactive_first INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'pending',
    batch_id TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_generation_jobs_creator_time ON generation_jobs(created_by, created_at);
CREATE INDEX IF NOT EXISTS idx_generation_jobs_status ON generation_jobs(status);

CREATE TABLE IF NOT EXISTS generation_batches (
    id TEXT PRIMARY KEY NOT NULL,
    surgery_id TEXT,
    created_by TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    target_role TEXT NOT NULL,
    model_used TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    generation_meta TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_generation_batches_surgery ON generation_batches(surgery_id);

CREATE TABLE IF NOT EXISTS generation_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    request_id TEXT NOT NULL,
    attempt_index INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    prompt_text TEXT NOT NULL,
    target_role TEXT NOT NULL,
    raw_model_output TEXT NOT NULL,
    raw_model_json TEXT,
    validation_errors TEXT,
    status TEXT NOT NULL,
    surgery_id TEXT,
    created_by TEXT NOT NULL,
    batch_id TEXT REFERENCES generation_batches(id),
    created_at TEXT NOT NULL,
    UNIQUE(request_id, attempt_index)
);
CREATE INDEX IF NOT EXISTS idx_generation_attempts_request ON generation_attempts(request_id);

CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY NOT NULL,
    batch_id TEXT NOT NULL REFERENCES generation_batches(id),
    surgery_id TEXT,
    target_role TEXT NOT NULL,
    title TEXT NOT NULL,
    topic_id TEXT,
    topic_subsection TEXT,
    content_blocks TEXT NOT NULL,
    interactions TEXT NOT NULL,
    slot_language TEXT,
    safety_netting TEXT NOT NULL,
    sources TEXT NOT NULL,
    estimated_time_minutes INTEGER NOT NULL,
    risk_level TEXT NOT NULL,
    needs_sourcing INTEGER NOT NULL,
    review_by_date TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'draft',
    version INTEGER NOT NULL DEFAULT 0,
    clinician_approved INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    published_at TEXT,
    published_by TEXT,
    generated_from TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cards_batch ON cards(batch_id);
CREATE INDEX IF NOT EXISTS idx_cards_surgery_status ON cards(surgery_id, status);

CREATE TABLE IF NOT EXISTS card_versions (
    id TEXT PRIMARY KEY NOT NULL,
    card_id TEXT NOT NULL REFERENCES cards(id),
    version INTEGER NOT NULL,
    snapshot TEXT NOT NULL,
    published_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    UNIQUE(card_id, version)
);

CREATE TABLE IF NOT EXISTS quizzes (
    id TEXT PRIMARY KEY NOT NULL,
    batch_id TEXT NOT NULL UNIQUE REFERENCES generation_batches(id),
    surgery_id TEXT,
    title TEXT NOT NULL,
    questions TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_categories (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    subsections TEXT NOT NULL DEFAULT '[]',
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS allowed_tags (
    id TEXT PRIMARY KEY NOT NULL,
    tag TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS allowed_tags;
DROP TABLE IF EXISTS topic_categories;
DROP TABLE IF EXISTS quizzes;
DROP TABLE IF EXISTS card_versions;
DROP TABLE IF EXISTS cards;
DROP TABLE IF EXISTS generation_attempts;
DROP TABLE IF EXISTS generation_batches;
DROP TABLE IF EXISTS generation_jobs;
";
