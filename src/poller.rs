//! Change detection for the persisted snapshot
//!
//! The poller only watches the modification time. Reading and applying the
//! snapshot is the reload loop's job.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Where the poller gets modification times from
#[async_trait]
pub trait ModificationSource: Send + Sync {
    /// `Ok(None)` when the resource does not exist (yet)
    async fn modified(&self) -> io::Result<Option<SystemTime>>;
}

/// Reads the modification time of a file on disk
#[derive(Debug, Clone)]
pub struct FileModificationSource {
    path: PathBuf,
}

impl FileModificationSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ModificationSource for FileModificationSource {
    async fn modified(&self) -> io::Result<Option<SystemTime>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.modified().map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Sent once per observed modification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub modified: SystemTime,
}

/// Last modification time the poller has accounted for.
///
/// Writers hold it across their own write and acknowledge the result, so a
/// change the service made itself never comes back as a notice.
#[derive(Debug, Clone, Default)]
pub struct ModificationBaseline(Arc<Mutex<Option<SystemTime>>>);

impl ModificationBaseline {
    /// Ticks wait until the returned guard is dropped
    pub async fn hold(&self) -> BaselineGuard<'_> {
        BaselineGuard(self.0.lock().await)
    }
}

pub struct BaselineGuard<'a>(MutexGuard<'a, Option<SystemTime>>);

impl BaselineGuard<'_> {
    /// Adopt a modification made by the holder. `None` leaves the baseline as is.
    pub fn acknowledge(&mut self, modified: Option<SystemTime>) {
        if modified.is_some() {
            *self.0 = modified;
        }
    }
}

/// Owns the polling task. Dropping the handle cancels it.
pub struct PollerHandle {
    token: CancellationToken,
    baseline: ModificationBaseline,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn baseline(&self) -> ModificationBaseline {
        self.baseline.clone()
    }

    /// Cancel the task and wait for it to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "Change poller task did not exit cleanly");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct ChangePoller;

impl ChangePoller {
    /// Start polling `source` every `interval`.
    ///
    /// The modification time seen when the task starts is the baseline and
    /// does not produce a notice.
    pub fn spawn<M>(source: M, interval: Duration) -> (PollerHandle, mpsc::Receiver<ChangeNotice>)
    where
        M: ModificationSource + 'static,
    {
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let baseline = ModificationBaseline::default();
        let join = tokio::spawn(poll_loop(
            source,
            interval,
            baseline.clone(),
            tx,
            token.clone(),
        ));
        (
            PollerHandle {
                token,
                baseline,
                join: Some(join),
            },
            rx,
        )
    }
}

async fn poll_loop<M: ModificationSource>(
    source: M,
    interval: Duration,
    baseline: ModificationBaseline,
    tx: mpsc::Sender<ChangeNotice>,
    token: CancellationToken,
) {
    {
        let mut last_seen = baseline.0.lock().await;
        *last_seen = read_modified(&source).await;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    tracing::debug!(interval_ms = interval.as_millis(), "Change poller started");

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let mut last_seen = baseline.0.lock().await;
                let Some(modified) = read_modified(&source).await else {
                    continue;
                };
                if *last_seen == Some(modified) {
                    continue;
                }
                *last_seen = Some(modified);
                drop(last_seen);

                match tx.try_send(ChangeNotice { modified }) {
                    // A notice is already queued; the reload it triggers reads the latest file
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    tracing::debug!("Change poller stopped");
}

/// Unavailable for this tick counts as no change
async fn read_modified<M: ModificationSource>(source: &M) -> Option<SystemTime> {
    match source.modified().await {
        Ok(modified) => modified,
        Err(e) => {
            tracing::debug!(error = %e, "Modification time unavailable");
            None
        }
    }
}
