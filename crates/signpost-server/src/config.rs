use serde::{Deserialize, Serialize};
use signpost_ai::LoopSettings;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// 运行环境，production 下不向非特权调用方返回模型原始输出
    #[serde(default)]
    pub environment: Environment,

    /// CORS 允许的 origins 列表，为空时允许所有来源（开发模式）
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            environment: Environment::default(),
            cors_allowed_origins: Vec::new(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

// ---- Seed file types (used by `init-topics` / `init-tags` CLI subcommands) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsSeedFile {
    #[serde(default)]
    pub topics: Vec<SeedTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTopic {
    pub name: String,
    #[serde(default)]
    pub subsections: Vec<String>,
    #[serde(default = "default_seed_active")]
    pub active: bool,
}

fn default_seed_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsSeedFile {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// 完整连接 URL，缺省时使用 `{data_dir}/signpost.db`
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            url: None,
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => format!("sqlite://{}/signpost.db?mode=rwc", self.data_dir),
        }
    }

    /// 隐藏口令后的连接串，用于日志
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        let Some((scheme, rest)) = url.split_once("://") else {
            return url;
        };
        match rest.split_once('@') {
            Some((credentials, host)) => {
                let user = credentials.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            None => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expire_secs")]
    pub token_expire_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expire_secs: default_token_expire_secs(),
        }
    }
}

fn default_token_expire_secs() -> u64 {
    86400
}

/// 模型服务配置（OpenAI 兼容接口）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            api_key: String::new(),
            base_url: None,
            model: None,
            timeout_secs: default_model_timeout_secs(),
            max_tokens: None,
            temperature: None,
        }
    }
}

fn default_model_provider() -> String {
    "openai".to_string()
}

fn default_model_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// 每个用户每小时可提交的生成任务数
    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,
    /// true 时 `POST generate` 入队后立即返回 202
    #[serde(default = "default_async_jobs")]
    pub async_jobs: bool,
    #[serde(default = "default_raw_snippet_chars")]
    pub raw_snippet_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            rate_limit_per_hour: default_rate_limit_per_hour(),
            async_jobs: default_async_jobs(),
            raw_snippet_chars: default_raw_snippet_chars(),
        }
    }
}

impl GenerationConfig {
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_attempts: self.max_attempts.max(1),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            snippet_chars: self.raw_snippet_chars,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    90
}

fn default_rate_limit_per_hour() -> u32 {
    5
}

fn default_async_jobs() -> bool {
    true
}

fn default_raw_snippet_chars() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_worker_max_concurrent")]
    pub max_concurrent: usize,
    /// RUNNING 超过该时长的任务视为中断
    #[serde(default = "default_stale_running_secs")]
    pub stale_running_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_worker_tick_secs(),
            max_concurrent: default_worker_max_concurrent(),
            stale_running_secs: default_stale_running_secs(),
        }
    }
}

fn default_worker_tick_secs() -> u64 {
    30
}

fn default_worker_max_concurrent() -> usize {
    4
}

fn default_stale_running_secs() -> u64 {
    900
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.generation.rate_limit_per_hour, 5);
        assert!(config.generation.async_jobs);
        assert_eq!(config.model.timeout_secs, 120);
        assert_eq!(config.worker.stale_running_secs, 900);
        assert_eq!(
            config.database.connection_url(),
            "sqlite://data/signpost.db?mode=rwc"
        );
    }

    #[test]
    fn sections_override_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            environment = "production"

            [database]
            data_dir = "/var/lib/signpost"

            [generation]
            max_attempts = 2
            async_jobs = false

            [model]
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.generation.loop_settings().max_attempts, 2);
        assert!(!config.generation.async_jobs);
        assert_eq!(config.model.model.as_deref(), Some("gpt-4o"));
        assert_eq!(
            config.database.connection_url(),
            "sqlite:///var/lib/signpost/signpost.db?mode=rwc"
        );
    }

    #[test]
    fn redacted_url_hides_password() {
        let db = DatabaseConfig {
            data_dir: "data".into(),
            url: Some("postgres://editor:hunter2@db:5432/signpost".into()),
        };
        assert_eq!(db.redacted_url(), "postgres://editor:***@db:5432/signpost");
    }

    #[test]
    fn topic_seed_defaults_to_active() {
        let seed: TopicsSeedFile =
            serde_json::from_str(r#"{"topics":[{"name":"Admin","subsections":["Fit notes"]}]}"#)
                .unwrap();
        assert!(seed.topics[0].active);
    }
}
