//! Offline sync coordinator
//!
//! Drains the pending-action queue of the offline store. Each action is pushed
//! to the server through an `ActionPusher` and only flagged as synced once the
//! push succeeded. Failures are logged and leave the action queued for the next
//! pass.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::database::{ActionType, OfflineAction, StoreState};
use crate::error::Result;

const SYNC_ENDPOINT: &str = "/sync/actions";

/// Sends one queued action to the server
#[async_trait]
pub trait ActionPusher: Send + Sync {
    async fn push(&self, action: &OfflineAction) -> Result<()>;
}

/// Accepts every action without talking to anyone
pub struct NoopPusher;

#[async_trait]
impl ActionPusher for NoopPusher {
    async fn push(&self, action: &OfflineAction) -> Result<()> {
        log::debug!("No-op push for action '{}'", action.id);
        Ok(())
    }
}

/// Posts queued actions to the backend's sync endpoint
pub struct ApiActionPusher {
    client: ApiClient,
    token: Option<String>,
}

impl ApiActionPusher {
    pub fn new(client: ApiClient, token: Option<String>) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl ActionPusher for ApiActionPusher {
    async fn push(&self, action: &OfflineAction) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .post_json(SYNC_ENDPOINT, action, self.token.as_deref())
            .await?;
        Ok(())
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

pub struct SyncCoordinator {
    store: StoreState,
    pusher: Arc<dyn ActionPusher>,
    online: AtomicBool,
    // One pass at a time; a reconnect during a pass waits for it
    pass_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(store: StoreState, pusher: Arc<dyn ActionPusher>) -> Self {
        Self {
            store,
            pusher,
            online: AtomicBool::new(true),
            pass_lock: Mutex::new(()),
        }
    }

    /// Coordinator with the stub pusher
    pub fn with_noop(store: StoreState) -> Self {
        Self::new(store, Arc::new(NoopPusher))
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Queue a mutation made while the server could not be reached
    pub fn record_action(&self, action_type: ActionType, data: serde_json::Value) -> Result<OfflineAction> {
        let action = OfflineAction {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            data,
            timestamp: Utc::now(),
            synced: false,
        };
        self.store.add_action(&action)?;

        log::info!("Recorded offline {} action '{}'", action_type.as_str(), action.id);
        Ok(action)
    }

    /// Track connectivity; coming back online triggers a sync pass
    pub async fn set_online(&self, online: bool) -> Result<Option<SyncReport>> {
        let was_online = self.online.swap(online, Ordering::Relaxed);
        if online && !was_online {
            log::info!("Connectivity restored - syncing offline actions");
            return self.sync_offline_actions().await.map(Some);
        }
        if !online && was_online {
            log::info!("Connectivity lost - actions will queue locally");
        }
        Ok(None)
    }

    /// Push every pending action in queue order and mark the successful ones synced
    ///
    /// Reading the queue can fail (storage errors propagate); individual push or
    /// mark failures are only logged.
    pub async fn sync_offline_actions(&self) -> Result<SyncReport> {
        let _pass = self.pass_lock.lock().await;

        let pending = self.store.get_pending_actions()?;
        let mut report = SyncReport {
            attempted: pending.len(),
            ..SyncReport::default()
        };

        if pending.is_empty() {
            log::debug!("No pending offline actions");
            return Ok(report);
        }

        log::info!("Syncing {} pending offline actions", pending.len());

        for action in &pending {
            if let Err(e) = self.pusher.push(action).await {
                log::error!("Failed to push action '{}': {}", action.id, e);
                report.failed += 1;
                continue;
            }

            match self.store.mark_action_synced(&action.id) {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    log::error!("Pushed action '{}' but could not mark it synced: {}", action.id, e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Sync pass finished: {} synced, {} failed",
            report.synced,
            report.failed
        );

        Ok(report)
    }
}
