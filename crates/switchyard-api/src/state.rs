//! Application state wiring config, providers and storage together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use switchyard_core::chat::snapshot::BoxSnapshotRepository;
use switchyard_core::chat::store::ConversationStore;
use switchyard_core::llm::orchestrator::Orchestrator;
use switchyard_infra::config::{config_path, data_dir, load_router_config};
use switchyard_infra::llm::create_providers;
use switchyard_infra::sqlite::pool::DatabasePool;
use switchyard_infra::sqlite::snapshot::SqliteSnapshotRepository;
use switchyard_types::config::RouterConfig;

/// Everything a command handler needs.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: RouterConfig,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load config, create providers, open the snapshot database when
    /// enabled and restore stored conversations.
    pub async fn init(explicit_config: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = data_dir();
        let config_path = config_path(explicit_config);
        let config = load_router_config(&config_path)
            .await
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        let providers = create_providers(&config).context("Failed to create providers")?;

        let mut store = ConversationStore::new(&config.context, &config.sessions);
        if config.sessions.snapshots {
            let pool = DatabasePool::open_in(&data_dir)
                .await
                .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;
            store = store.with_snapshots(BoxSnapshotRepository::new(SqliteSnapshotRepository::new(
                pool,
            )));
        }

        let orchestrator =
            Orchestrator::with_store(&config, providers, store).context("Invalid router setup")?;
        match orchestrator.store().restore().await {
            Ok(restored) => tracing::debug!(restored, "Conversations restored"),
            Err(e) => tracing::warn!("Failed to restore conversations: {e}"),
        }

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config,
            config_path,
            data_dir,
        })
    }

    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
    }
}
