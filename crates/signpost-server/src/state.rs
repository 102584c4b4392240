use crate::config::ServerConfig;
use crate::editorial::lifecycle::CardLifecycle;
use crate::editorial::orchestrator::JobOrchestrator;
use crate::editorial::worker::JobQueue;
use chrono::{DateTime, Utc};
use signpost_storage::EditorialStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EditorialStore>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub lifecycle: Arc<CardLifecycle>,
    pub jobs: JobQueue,
    pub start_time: DateTime<Utc>,
    pub jwt_secret: Arc<String>,
    pub config: Arc<ServerConfig>,
}
