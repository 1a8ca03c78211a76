//! Applies the persisted snapshot to the live exchange

use crate::exchange::{Exchange, ExchangeError, ExchangePhase};
use crate::poller::ChangeNotice;
use crate::snapshot::{SnapshotError, SnapshotStore};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Load the snapshot and feed it to the exchange.
///
/// The snapshot is parsed completely before the exchange sees it, so a
/// malformed file leaves the thread as it was.
pub async fn reload_once(
    exchange: &Exchange,
    snapshots: &dyn SnapshotStore,
) -> Result<ExchangePhase, ReloadError> {
    let messages = snapshots.load().await?;
    Ok(exchange.reload(messages)?)
}

/// Reload once per change notice until the poller goes away
pub async fn run_reload_loop(
    exchange: &Exchange,
    snapshots: &dyn SnapshotStore,
    mut notices: mpsc::Receiver<ChangeNotice>,
) {
    while let Some(notice) = notices.recv().await {
        tracing::debug!(modified = ?notice.modified, "Snapshot changed on disk");
        match reload_once(exchange, snapshots).await {
            Ok(phase) => tracing::info!(phase = phase.name(), "Thread reloaded"),
            Err(e) => tracing::error!(error = %e, "Reload failed, keeping current thread"),
        }
    }
    tracing::debug!("Reload loop finished");
}
