// SPDX-License-Identifier: GPL-3.0-only
mod api;
mod config;
mod logging;
mod source;
mod store;
mod sync;
mod utils;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use api::{ApiHandlers, HttpServer};
use config::Config;
use logging::setup_logging;
use source::{ContentSource, HttpBlogSource};
use store::{PostStore, SqlitePostStore};
use sync::{FleetRefreshCoordinator, RefreshOrchestrator, SingleFlightKeyLock, StalenessCache};

/// Wire source, store and the sync core together
fn build_fleet(
    config: &Config,
    source: Arc<dyn ContentSource>,
    store: Arc<dyn PostStore>,
) -> FleetRefreshCoordinator {
    let orchestrator = RefreshOrchestrator::new(
        source,
        store,
        Arc::new(SingleFlightKeyLock::new()),
        Arc::new(StalenessCache::new()),
        config.refresh_settings(),
    );
    FleetRefreshCoordinator::new(orchestrator, config.max_parallel_refreshes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    setup_logging(&config.log_level)?;

    config.validate()?;
    let blogs = config.blog_keys()?;

    info!("Starting blogsyncd v{}", env!("CARGO_PKG_VERSION"));
    if blogs.is_empty() {
        warn!("No blogs configured; periodic refresh has nothing to do");
    }

    // Initialize post store
    let store: Arc<dyn PostStore> = Arc::new(SqlitePostStore::new(&config.store_db_path).await?);
    info!("Post store initialized at {}", config.store_db_path.display());

    // Initialize content source
    let source: Arc<dyn ContentSource> = Arc::new(
        HttpBlogSource::new(&config.source_api_url, config.source_api_key.clone())?
    );

    let fleet = build_fleet(&config, source, store);

    // Spawn tasks
    let refresh_fleet = fleet.clone();
    let refresh_blogs = blogs.clone();
    let refresh_interval = config.refresh_interval_secs.max(1);
    let refresh_task = tokio::spawn(async move {
        info!(interval_secs = refresh_interval, "Refresh task started");
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(refresh_interval));
        loop {
            interval.tick().await;

            match refresh_fleet.refresh_all(&refresh_blogs, false).await {
                Ok(outcomes) => {
                    info!(blogs = outcomes.len(), "Periodic refresh finished");
                }
                Err(e) => {
                    error!(error = %e, "Periodic refresh left blogs without data");
                }
            }
        }
    });

    // Start HTTP server
    let http_addr = config.local_api_bind;
    let handlers = ApiHandlers::new(fleet, blogs, config.wait_for_data_timeout());
    let http_server = HttpServer::new(handlers, http_addr);
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.serve().await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("All services started. Waiting for shutdown signal...");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    // Graceful shutdown
    info!("Initiating graceful shutdown...");

    refresh_task.abort();
    http_task.abort();

    info!("Shutdown complete");
    Ok(())
}
