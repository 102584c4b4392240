use anyhow::Result;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use signpost_ai::{ModelClient, OpenAiCompatProvider};
use signpost_storage::EditorialStore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use signpost_server::app;
use signpost_server::auth::{self, EditorRole};
use signpost_server::config::{self, ServerConfig};
use signpost_server::editorial::lifecycle::CardLifecycle;
use signpost_server::editorial::orchestrator::JobOrchestrator;
use signpost_server::editorial::role::KeywordRoleResolver;
use signpost_server::editorial::worker::{JobQueue, JobWorker};
use signpost_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  signpost-server [config.toml]                                         Start the server");
    eprintln!("  signpost-server init-topics <config.toml> <seed.json>                Initialize topic categories from seed file");
    eprintln!("  signpost-server init-tags <config.toml> <seed.json>                  Initialize allowed tags from seed file");
    eprintln!("  signpost-server issue-token <config.toml> <user> <role> [surgery..]  Issue an editor token (role: editor|superuser)");
}

#[tokio::main]
async fn main() -> Result<()> {
    signpost_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("signpost=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-topics") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-topics requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-topics requires <seed.json> argument")
            })?;
            run_init_topics(config_path, seed_path).await
        }
        Some("init-tags") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-tags requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-tags requires <seed.json> argument")
            })?;
            run_init_tags(config_path, seed_path).await
        }
        Some("issue-token") => {
            let (Some(config_path), Some(user), Some(role)) = (args.get(2), args.get(3), args.get(4))
            else {
                print_usage();
                return Err(anyhow::anyhow!(
                    "issue-token requires <config.toml> <user> <role> arguments"
                ));
            };
            run_issue_token(config_path, user, role, &args[5..])
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn open_store(config: &ServerConfig) -> Result<Arc<EditorialStore>> {
    let store =
        EditorialStore::new(&config.database.connection_url(), Path::new(&config.database.data_dir))
            .await?;
    Ok(Arc::new(store))
}

fn read_seed<T: serde::de::DeserializeOwned>(seed_path: &str) -> Result<T> {
    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))
}

/// Insert or update topic categories from a JSON seed file.
async fn run_init_topics(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config).await?;
    let seed: config::TopicsSeedFile = read_seed(seed_path)?;

    let mut upserted = 0u32;
    let mut failed = 0u32;
    for topic in &seed.topics {
        match store
            .upsert_topic_category(&topic.name, &topic.subsections, topic.active)
            .await
        {
            Ok(row) => {
                tracing::info!(name = %topic.name, id = %row.id, active = topic.active, "Topic category saved");
                upserted += 1;
            }
            Err(e) => {
                tracing::error!(name = %topic.name, error = %e, "Failed to save topic category");
                failed += 1;
            }
        }
    }

    tracing::info!(upserted, failed, "init-topics completed");
    Ok(())
}

/// Insert allowed tags from a JSON seed file. Existing tags are skipped.
async fn run_init_tags(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config).await?;
    let seed: config::TagsSeedFile = read_seed(seed_path)?;

    let mut created = 0u32;
    let mut skipped = 0u32;
    for tag in &seed.tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        match store.insert_allowed_tag(&tag).await {
            Ok(true) => created += 1,
            Ok(false) => {
                tracing::warn!(tag = %tag, "Tag already exists, skipping");
                skipped += 1;
            }
            Err(e) => tracing::error!(tag = %tag, error = %e, "Failed to insert tag"),
        }
    }

    tracing::info!(created, skipped, "init-tags completed");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_issue_token(config_path: &str, user: &str, role: &str, surgeries: &[String]) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let secret = config.auth.jwt_secret.as_deref().ok_or_else(|| {
        anyhow::anyhow!("issue-token requires [auth].jwt_secret to be set in config")
    })?;
    let role: EditorRole = role.parse().map_err(anyhow::Error::msg)?;
    let token = auth::create_token(
        secret,
        user,
        user,
        role,
        surgeries,
        config.auth.token_expire_secs,
    )?;
    println!("{token}");
    Ok(())
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    tracing::info!(
        config = config_path,
        environment = ?config.environment,
        database = %config.database.redacted_url(),
        "Loaded configuration"
    );

    std::fs::create_dir_all(&config.database.data_dir)?;
    let store = open_store(&config).await?;

    let model: Arc<dyn ModelClient> = Arc::new(OpenAiCompatProvider::new(
        config.model.provider.clone(),
        config.model.api_key.clone(),
        config.model.model.clone(),
        config.model.base_url.clone(),
        Some(config.model.timeout_secs),
        config.model.max_tokens,
        config.model.temperature,
    )?);
    tracing::info!(
        provider = %model.provider(),
        model = %model.model_name(),
        "Generation model configured"
    );

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        model,
        Arc::new(KeywordRoleResolver),
        config.generation.loop_settings(),
    ));
    let lifecycle = Arc::new(CardLifecycle::new(store.clone()));

    // JWT secret: use configured value or generate random
    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => Arc::new(secret.clone()),
        None => {
            tracing::warn!("No jwt_secret configured. A random secret was generated and will change on restart. Set [auth].jwt_secret in config for production use.");
            Arc::new(random_secret())
        }
    };

    let (jobs, job_rx) = JobQueue::new();
    let worker = JobWorker::new(
        orchestrator.clone(),
        store.clone(),
        config.worker.max_concurrent,
        config.worker.tick_secs,
        config.worker.stale_running_secs,
    );
    let worker_handle = tokio::spawn(worker.run(job_rx));

    let state = AppState {
        store,
        orchestrator,
        lifecycle,
        jobs,
        start_time: Utc::now(),
        jwt_secret,
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "Server started");

    let result = axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server error");
    }

    worker_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}
