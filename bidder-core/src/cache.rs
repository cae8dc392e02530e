use futures_util::{future, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::repository::{load_snapshot, CampaignSource};
use crate::snapshot::Snapshot;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Minimum time between two successful loads
    pub refresh_cooldown: Duration,
    /// Delay before retrying a failed scheduled refresh
    pub retry_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_cooldown: Duration::from_secs(60),
            retry_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Refresh {
    Loaded(Arc<Snapshot>),
    /// The cooldown since the last successful load has not elapsed yet
    Throttled,
}

/// Loads snapshots from the store, at most once per cooldown window.
pub struct Refresher<S: ?Sized> {
    source: Arc<S>,
    cooldown: Duration,
    last_success: Option<Instant>,
    version: u64,
}

impl<S> Refresher<S>
where
    S: CampaignSource + ?Sized,
{
    pub fn new(source: Arc<S>, cooldown: Duration) -> Self {
        Self {
            source,
            cooldown,
            last_success: None,
            version: 0,
        }
    }

    pub fn is_due(&self) -> bool {
        self.last_success
            .map_or(true, |last| last.elapsed() >= self.cooldown)
    }

    /// Earliest instant at which `load_if_due` will hit the store again.
    pub fn next_due(&self) -> Instant {
        match self.last_success {
            Some(last) => last + self.cooldown,
            None => Instant::now(),
        }
    }

    /// Failures leave the cooldown clock untouched, so the next call retries.
    pub async fn load_if_due(&mut self) -> CoreResult<Refresh> {
        if !self.is_due() {
            let wait = self.next_due().saturating_duration_since(Instant::now());
            debug!(
                next_due_in_ms = wait.as_millis() as u64,
                "Refresh throttled"
            );
            return Ok(Refresh::Throttled);
        }

        let started = Instant::now();
        let snapshot = load_snapshot(self.source.as_ref(), self.version + 1).await?;

        self.version = snapshot.version();
        self.last_success = Some(Instant::now());

        info!(
            campaigns = snapshot.len(),
            version = snapshot.version(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Campaign snapshot loaded"
        );

        Ok(Refresh::Loaded(Arc::new(snapshot)))
    }
}

#[derive(Debug, Clone)]
pub enum CacheState {
    /// Warmup load still in flight
    Loading,
    Ready(Arc<Snapshot>),
    /// Warmup load failed; no snapshot will ever be published
    Unavailable(CoreError),
}

/// Read side of the campaign snapshot cache.
///
/// One background task owns the write side and replaces the published
/// snapshot on every successful refresh. Readers only ever see a whole
/// snapshot and never trigger a load themselves.
#[derive(Clone)]
pub struct SnapshotCache {
    rx: watch::Receiver<CacheState>,
}

impl SnapshotCache {
    /// Start the refresh task. The first load begins immediately.
    ///
    /// Cancelling `cancel` stops the task and closes every subscription.
    pub fn spawn<S>(
        source: Arc<S>,
        config: CacheConfig,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        S: CampaignSource + ?Sized + 'static,
    {
        let (tx, rx) = watch::channel(CacheState::Loading);
        let refresher = Refresher::new(source, config.refresh_cooldown);
        let handle = tokio::spawn(run_refresh_loop(refresher, config.retry_interval, tx, cancel));
        (Self { rx }, handle)
    }

    pub fn state(&self) -> CacheState {
        self.rx.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        match &*self.rx.borrow() {
            CacheState::Ready(snapshot) => Some(snapshot.clone()),
            _ => None,
        }
    }

    /// Wait for the warmup load. Surfaces its error if it failed.
    pub async fn ready(&self) -> CoreResult<Arc<Snapshot>> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| !matches!(state, CacheState::Loading))
            .await
            .map_err(|_| CoreError::CacheClosed)?;

        match &*state {
            CacheState::Ready(snapshot) => Ok(snapshot.clone()),
            CacheState::Unavailable(e) => Err(e.clone()),
            CacheState::Loading => Err(CoreError::CacheClosed),
        }
    }

    /// Current snapshot first, then every replacement. Ends once the
    /// refresh task has stopped.
    pub fn subscribe(&self) -> impl Stream<Item = Arc<Snapshot>> + Send + 'static {
        WatchStream::new(self.rx.clone()).filter_map(|state| {
            future::ready(match state {
                CacheState::Ready(snapshot) => Some(snapshot),
                _ => None,
            })
        })
    }
}

async fn run_refresh_loop<S>(
    mut refresher: Refresher<S>,
    retry_interval: Duration,
    tx: watch::Sender<CacheState>,
    cancel: CancellationToken,
) where
    S: CampaignSource + ?Sized,
{
    let warmup = tokio::select! {
        _ = cancel.cancelled() => {
            info!("Snapshot refresher cancelled during warmup");
            return;
        }
        outcome = refresher.load_if_due() => outcome,
    };

    match warmup {
        Ok(Refresh::Loaded(snapshot)) => {
            tx.send_replace(CacheState::Ready(snapshot));
        }
        Ok(Refresh::Throttled) => {}
        Err(e) => {
            error!(error = %e, "Initial campaign load failed");
            tx.send_replace(CacheState::Unavailable(e));
            return;
        }
    }

    let mut next_attempt = refresher.next_due();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_until(next_attempt) => {}
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = refresher.load_if_due() => outcome,
        };

        next_attempt = match outcome {
            Ok(Refresh::Loaded(snapshot)) => {
                tx.send_replace(CacheState::Ready(snapshot));
                refresher.next_due()
            }
            Ok(Refresh::Throttled) => refresher.next_due(),
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = retry_interval.as_millis() as u64,
                    "Campaign refresh failed, serving stale snapshot"
                );
                Instant::now() + retry_interval
            }
        };
    }

    info!("Snapshot refresher stopped");
}
