pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod speech;
pub mod sync;
pub mod voices;
pub mod waveform;

pub use api::ApiClient;
pub use config::AppConfig;
pub use database::{
    ActionType, CachedMessage, CachedUser, ContentType, OfflineAction, OfflineContent, OfflineStore,
    StoreConfig, StoreState, UserRole,
};
pub use error::{CogniError, Result};
pub use speech::{SpeakRequest, SpeechController, SpeechSnapshot};
pub use sync::{ActionPusher, ApiActionPusher, NoopPusher, SyncCoordinator, SyncReport};
pub use voices::Voice;
pub use waveform::{WaveAnimator, WaveConfig, WaveProps, WaveRenderer};

use std::path::PathBuf;
use std::sync::Arc;

/// Headless start-up: open the offline store and flush queued actions once
///
/// Failures are logged, never raised; the client stays usable without the
/// offline layer.
pub fn run() {
    // Initialize logger
    env_logger::init();

    log::info!("=== CogniSpark Client Initialization ===");

    match try_run() {
        Ok(report) => log::info!(
            "✓ Start-up sync finished ({} attempted, {} synced, {} failed)",
            report.attempted,
            report.synced,
            report.failed
        ),
        Err(e) => log::error!("✗ Offline layer unavailable: {}", e),
    }
}

fn try_run() -> Result<SyncReport> {
    let config = match std::env::var("COGNISPARK_CONFIG") {
        Ok(path) => AppConfig::load(&PathBuf::from(path))?,
        Err(_) => AppConfig::from_env()?,
    };

    log::info!("Initializing offline store...");
    let store: StoreState = Arc::new(OfflineStore::open_at(StoreConfig::from(&config))?);

    let content_count = store.count_content().unwrap_or(0);
    let pending_count = store.count_pending_actions().unwrap_or(0);
    let message_count = store.count_messages().unwrap_or(0);
    log::info!("✓ Offline store ready at {}", config.database_path.display());
    log::info!(
        "  - {} content items, {} pending actions, {} messages",
        content_count,
        pending_count,
        message_count
    );

    let pusher = build_pusher(&config)?;
    let coordinator = SyncCoordinator::new(store, pusher);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(coordinator.sync_offline_actions())
}

/// Push to the backend when a session token is available, otherwise keep the stub
fn build_pusher(config: &AppConfig) -> Result<Arc<dyn ActionPusher>> {
    match std::env::var("COGNISPARK_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            let client = ApiClient::new(&config.api_base_url)?;
            log::info!("Offline actions will be pushed to {}", client.base_url());
            Ok(Arc::new(ApiActionPusher::new(client, Some(token))))
        }
        _ => {
            log::warn!("No session token - using no-op action pusher");
            Ok(Arc::new(NoopPusher))
        }
    }
}
