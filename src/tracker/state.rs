// Screen-state holder for the sleep-tracking screen.
//
// One worker task owns the in-memory state and serializes every
// operation; the entry points send commands with oneshot replies and
// await them. Derived values are published on a watch channel for
// observers, and the two one-shot events live in slots that are
// read-and-cleared through the worker so a re-render never re-delivers
// a stale event.

use crate::tracker::format::format_nights;
use crate::tracker::night::{Night, NightId};
use crate::tracker::store::NightStore;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Depth of the command queue between entry points and the worker
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Observer-facing snapshot derived from the tracker state.
/// `navigation_pending` and `clear_notice_pending` mirror the one-shot
/// event slots so observers know to consume them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerView {
    /// True when no night is open
    pub start_visible: bool,
    /// True when a night is open
    pub stop_visible: bool,
    /// True when there is history to clear
    pub clear_visible: bool,
    /// Formatted rendering of the full history
    pub summary: String,
    pub navigation_pending: bool,
    pub clear_notice_pending: bool,
}

enum Command {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    RecordQuality {
        id: NightId,
        quality: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    ConsumeNavigation {
        reply: oneshot::Sender<Option<Night>>,
    },
    ConsumeClearNotice {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle for driving the screen state. Dropping it signals the worker
/// to shut down; `close` additionally waits for the worker to finish.
#[derive(Debug)]
pub struct SleepTracker {
    command_tx: mpsc::Sender<Command>,
    view_rx: watch::Receiver<TrackerView>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SleepTracker {
    /// Spawn the worker and run the initialization fetch. Returns once
    /// the first view has been published; a store failure during the
    /// fetch surfaces here.
    pub async fn spawn(store: Arc<dyn NightStore>) -> Result<Self> {
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (view_tx, view_rx) = watch::channel(TrackerView::default());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let worker = tokio::spawn(async move {
            let mut worker = Worker {
                store,
                current: None,
                history: Vec::new(),
                navigation: None,
                clear_notice: false,
                view_tx,
            };

            let init = worker.refresh().await;
            let init_failed = init.is_err();
            worker.publish();
            let _ = ready_tx.send(init);
            if init_failed {
                return;
            }

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    command = command_rx.recv() => match command {
                        Some(command) => worker.handle(command).await,
                        None => break,
                    },
                }
            }
            debug!("tracker worker stopped");
        });

        ready_rx
            .await
            .map_err(|_| anyhow!("Tracker worker exited during initialization"))??;

        Ok(Self {
            command_tx,
            view_rx,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// Subscribe to view updates; the receiver always holds the latest
    /// published snapshot
    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.view_rx.clone()
    }

    /// Current view snapshot
    pub fn view(&self) -> TrackerView {
        self.view_rx.borrow().clone()
    }

    /// Insert a new open night (start == end == now) and refresh
    pub async fn start_tracking(&self) -> Result<()> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Close the open night, persist it, and emit the navigate event.
    /// No-op when no night is open.
    pub async fn stop_tracking(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await?
    }

    /// Delete every night and emit the cleared notice
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await?
    }

    /// Re-run the initialization fetch against the store
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Record a quality rating (0..=5) against a closed night
    pub async fn record_quality(&self, id: NightId, quality: i32) -> Result<()> {
        self.request(|reply| Command::RecordQuality { id, quality, reply })
            .await?
    }

    /// Take the pending navigate event, if any. Consumption is atomic:
    /// a second call returns None until the next stop emits again.
    pub async fn consume_navigation(&self) -> Result<Option<Night>> {
        self.request(|reply| Command::ConsumeNavigation { reply })
            .await
    }

    /// Take the pending cleared notice, if any
    pub async fn consume_clear_notice(&self) -> Result<bool> {
        self.request(|reply| Command::ConsumeClearNotice { reply })
            .await
    }

    /// Signal shutdown and wait for the worker to finish. Commands
    /// queued but not yet handled are dropped and their callers get an
    /// error.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| anyhow!("Tracker is closed"))?;
        reply_rx.await.map_err(|_| anyhow!("Tracker is closed"))
    }
}

impl Drop for SleepTracker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Worker-owned state; only the worker task touches it
struct Worker {
    store: Arc<dyn NightStore>,
    current: Option<Night>,
    history: Vec<Night>,
    navigation: Option<Night>,
    clear_notice: bool,
    view_tx: watch::Sender<TrackerView>,
}

impl Worker {
    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let _ = reply.send(self.start_tracking().await);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop_tracking().await);
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.clear().await);
            }
            Command::Refresh { reply } => {
                let _ = reply.send(self.refresh().await);
            }
            Command::RecordQuality { id, quality, reply } => {
                let _ = reply.send(self.record_quality(id, quality).await);
            }
            Command::ConsumeNavigation { reply } => {
                let _ = reply.send(self.navigation.take());
            }
            Command::ConsumeClearNotice { reply } => {
                let _ = reply.send(std::mem::take(&mut self.clear_notice));
            }
        }
        self.publish();
    }

    /// Fetch the most recent night and the full history. The most
    /// recent night is the current one only while still open.
    async fn refresh(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let (most_recent, history) = run_store(move || {
            let most_recent = store.most_recent()?;
            let history = store.all_nights()?;
            Ok((most_recent, history))
        })
        .await?;

        self.current = most_recent.filter(|night| night.is_open());
        self.history = history;
        Ok(())
    }

    async fn start_tracking(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let night = run_store(move || store.insert(Utc::now())).await?;
        debug!(id = night.id, "started tracking");
        self.refresh().await
    }

    async fn stop_tracking(&mut self) -> Result<()> {
        let Some(current) = self.current.as_ref() else {
            debug!("stop requested with no open night");
            return Ok(());
        };

        let mut night = current.clone();
        // A close in the same instant as the start would leave the
        // night looking open, so the end always moves forward.
        night.end_time = Utc::now().max(night.start_time + Duration::nanoseconds(1));

        let store = Arc::clone(&self.store);
        let updated = night.clone();
        run_store(move || store.update(&updated)).await?;
        debug!(id = night.id, "stopped tracking");

        // Refresh immediately so `current` clears now instead of on the
        // next external refresh; the event is only set once the whole
        // operation has succeeded
        self.refresh().await?;
        self.navigation = Some(night);
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        run_store(move || store.delete_all()).await?;
        debug!("cleared all nights");

        self.current = None;
        self.history.clear();
        self.clear_notice = true;
        Ok(())
    }

    async fn record_quality(&mut self, id: NightId, quality: i32) -> Result<()> {
        if !(0..=5).contains(&quality) {
            bail!("Quality rating out of range (0-5): {}", quality);
        }

        let store = Arc::clone(&self.store);
        run_store(move || {
            let Some(mut night) = store.all_nights()?.into_iter().find(|n| n.id == id) else {
                bail!("Unknown night id: {}", id);
            };
            if night.is_open() {
                bail!("Night {} is still open and cannot be rated", id);
            }
            night.quality = Some(quality);
            store.update(&night)
        })
        .await?;
        debug!(id, quality, "recorded sleep quality");

        self.refresh().await
    }

    /// Recompute the derived view and publish it if anything changed
    fn publish(&self) {
        let view = TrackerView {
            start_visible: self.current.is_none(),
            stop_visible: self.current.is_some(),
            clear_visible: !self.history.is_empty(),
            summary: format_nights(&self.history),
            navigation_pending: self.navigation.is_some(),
            clear_notice_pending: self.clear_notice,
        };
        self.view_tx.send_if_modified(|slot| {
            if *slot == view {
                false
            } else {
                *slot = view;
                true
            }
        });
    }
}

/// Run a synchronous store call on the blocking pool
async fn run_store<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .context("Night store task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::store::JsonNightStore;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn test_store() -> (Arc<JsonNightStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonNightStore::at_path(temp_dir.path().join("nights.json")));
        (store, temp_dir)
    }

    /// Store whose reads can be switched to fail, for error-path tests
    struct FlakyReadStore {
        inner: JsonNightStore,
        fail_reads: AtomicBool,
    }

    impl NightStore for FlakyReadStore {
        fn insert(&self, start: DateTime<Utc>) -> Result<Night> {
            self.inner.insert(start)
        }

        fn update(&self, night: &Night) -> Result<()> {
            self.inner.update(night)
        }

        fn most_recent(&self) -> Result<Option<Night>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                bail!("Simulated read failure");
            }
            self.inner.most_recent()
        }

        fn all_nights(&self) -> Result<Vec<Night>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                bail!("Simulated read failure");
            }
            self.inner.all_nights()
        }

        fn delete_all(&self) -> Result<()> {
            self.inner.delete_all()
        }
    }

    #[tokio::test]
    async fn start_and_stop_visibility_are_mutually_exclusive() {
        let (store, _temp) = test_store();
        let mut tracker = SleepTracker::spawn(store).await.unwrap();

        let view = tracker.view();
        assert!(view.start_visible && !view.stop_visible);

        tracker.start_tracking().await.unwrap();
        let view = tracker.view();
        assert!(!view.start_visible && view.stop_visible);

        tracker.stop_tracking().await.unwrap();
        let view = tracker.view();
        assert!(view.start_visible && !view.stop_visible);

        tracker.close().await;
    }

    #[tokio::test]
    async fn clear_visibility_tracks_history() {
        let (store, _temp) = test_store();
        let mut tracker = SleepTracker::spawn(store).await.unwrap();
        assert!(!tracker.view().clear_visible);

        tracker.start_tracking().await.unwrap();
        assert!(tracker.view().clear_visible);

        tracker.clear().await.unwrap();
        assert!(!tracker.view().clear_visible);

        tracker.close().await;
    }

    #[tokio::test]
    async fn subscribe_observes_view_changes() {
        let (store, _temp) = test_store();
        let mut tracker = SleepTracker::spawn(store).await.unwrap();
        let mut view_rx = tracker.subscribe();

        tracker.start_tracking().await.unwrap();
        view_rx.changed().await.unwrap();
        assert!(view_rx.borrow().stop_visible);

        tracker.close().await;
    }

    #[tokio::test]
    async fn failed_stop_emits_no_navigation_event() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyReadStore {
            inner: JsonNightStore::at_path(temp_dir.path().join("nights.json")),
            fail_reads: AtomicBool::new(false),
        });
        let mut tracker = SleepTracker::spawn(Arc::clone(&store) as Arc<dyn NightStore>)
            .await
            .unwrap();
        tracker.start_tracking().await.unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(tracker.stop_tracking().await.is_err());
        assert!(!tracker.view().navigation_pending);

        store.fail_reads.store(false, Ordering::SeqCst);
        assert!(tracker.consume_navigation().await.unwrap().is_none());

        tracker.close().await;
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let (store, _temp) = test_store();
        let mut tracker = SleepTracker::spawn(store).await.unwrap();
        tracker.close().await;

        let err = tracker.start_tracking().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
