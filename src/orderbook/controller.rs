//! Snapshot/stream reconciliation for a single order book.
//!
//! [`SyncController`] owns the [`UpdateBuffer`] and is the only writer to the
//! [`OrderBookStore`]. It consumes diff events from a channel fed by the
//! stream task and moves through three states:
//!
//! ```text
//!            warm-up              snapshot accepted,
//! Buffering ─────────► Reconciling ─────────────────► Live
//!     ▲                                                │
//!     └──────────────────── gap ───────────────────────┘
//! ```
//!
//! - **Buffering**: events are queued, nothing touches the book.
//! - **Reconciling**: a snapshot is fetched (bounded retries) and checked
//!   against the earliest buffered event. Events keep being queued meanwhile.
//!   The accepted snapshot is installed and the queue replayed in order.
//! - **Live**: events are applied directly. A gap invalidates the book and
//!   starts a fresh cycle.
//!
//! Because buffer drain and the switch to Live happen inside this one task,
//! no live event can reach the store while a replay is in progress.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{SyncConfig, WarmUp};
use crate::error::Error;
use crate::types::{DepthUpdate, Snapshot, UpdateId};

use super::book::ApplyOutcome;
use super::buffer::UpdateBuffer;
use super::store::OrderBookStore;

/// Something that can fetch a full depth snapshot
///
/// Implemented by [`RestClient`](crate::client::RestClient); tests plug in
/// scripted sources.
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current book for `symbol`
    fn fetch_snapshot(&self, symbol: &str) -> impl Future<Output = Result<Snapshot, Error>> + Send;
}

impl<T: SnapshotSource> SnapshotSource for Arc<T> {
    fn fetch_snapshot(&self, symbol: &str) -> impl Future<Output = Result<Snapshot, Error>> + Send {
        (**self).fetch_snapshot(symbol)
    }
}

/// Synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Queueing stream events, book not being updated
    Buffering,
    /// Fetching and validating a snapshot
    Reconciling,
    /// Applying stream events directly to the book
    Live,
}

impl SyncState {
    /// Whether the book is being kept up to date
    pub fn is_live(&self) -> bool {
        matches!(self, SyncState::Live)
    }
}

/// What happened to an event handed to [`SyncController::on_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDisposition {
    /// Queued for replay
    Buffered,
    /// Applied to the book
    Applied,
    /// Already reflected in the book
    Stale,
    /// A gap was detected; the controller is back to Buffering
    ResyncRequired,
}

/// Counts from replaying the buffer onto a fresh snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Snapshot the buffer was replayed onto
    pub snapshot_id: UpdateId,
    /// Buffered events already covered by the snapshot
    pub discarded: usize,
    /// Buffered events applied
    pub applied: usize,
    /// Buffered events rejected as gaps
    pub gaps: usize,
    /// The first event after the snapshot did not connect to it
    pub handoff_gap: bool,
}

/// Why a fetched snapshot could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Snapshot ends before the earliest buffered event starts
    PredatesBuffer {
        snapshot_id: UpdateId,
        first_buffered: UpdateId,
    },
    /// Snapshot is older than what the book already absorbed
    OlderThanBook {
        snapshot_id: UpdateId,
        book_id: UpdateId,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::PredatesBuffer {
                snapshot_id,
                first_buffered,
            } => write!(
                f,
                "snapshot {} predates first buffered update {}",
                snapshot_id, first_buffered
            ),
            Rejection::OlderThanBook {
                snapshot_id,
                book_id,
            } => write!(f, "snapshot {} is older than book at {}", snapshot_id, book_id),
        }
    }
}

/// Drives one [`OrderBookStore`] from a snapshot source and a diff channel
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use depth_sync::client::RestClient;
/// use depth_sync::orderbook::{OrderBookStore, SyncController};
/// use depth_sync::Config;
///
/// # async fn example() -> depth_sync::Result<()> {
/// let config = Config::new("BTCUSDT");
/// let store = Arc::new(OrderBookStore::new(config.symbol()));
/// let rest = RestClient::new(&config)?;
///
/// let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
/// let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
///
/// let controller = SyncController::new(config.symbol(), store, rest, config.sync().clone());
/// controller.run(rx, stop_rx).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SyncController<S> {
    symbol: String,
    store: Arc<OrderBookStore>,
    source: S,
    config: SyncConfig,
    buffer: UpdateBuffer,
    state: watch::Sender<SyncState>,
    initialized_once: bool,
}

impl<S: SnapshotSource> SyncController<S> {
    /// Create a controller in the Buffering state
    pub fn new(
        symbol: impl Into<String>,
        store: Arc<OrderBookStore>,
        source: S,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Buffering);
        Self {
            symbol: symbol.into(),
            store,
            source,
            config,
            buffer: UpdateBuffer::new(),
            state,
            initialized_once: false,
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Number of queued events
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The store this controller writes to
    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.store
    }

    fn set_state(&self, state: SyncState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(symbol = %self.symbol, from = ?previous, to = ?state, "sync state changed");
        }
    }

    /// Handle one stream event
    ///
    /// Queues it while not Live; otherwise applies it and, on a gap,
    /// invalidates the book and drops back to Buffering with this event as
    /// the first entry of the new buffer.
    pub fn on_update(&mut self, update: DepthUpdate) -> UpdateDisposition {
        if !self.state().is_live() {
            self.buffer.push(update);
            return UpdateDisposition::Buffered;
        }

        match self.store.apply_update(&update) {
            ApplyOutcome::Applied => UpdateDisposition::Applied,
            ApplyOutcome::Stale => {
                debug!(
                    final_update_id = update.final_update_id,
                    "dropping stale update"
                );
                UpdateDisposition::Stale
            }
            ApplyOutcome::Gap => {
                let expected = self.store.current_sequence() + 1;
                warn!(
                    symbol = %self.symbol,
                    expected,
                    got = update.first_update_id,
                    "sequence gap in live stream, resynchronizing"
                );
                self.begin_resync(Some(update));
                UpdateDisposition::ResyncRequired
            }
        }
    }

    /// Invalidate the book and return to Buffering
    fn begin_resync(&mut self, first: Option<DepthUpdate>) {
        self.store.invalidate();
        self.buffer.clear();
        self.set_state(SyncState::Buffering);
        if let Some(update) = first {
            self.buffer.push(update);
        }
    }

    /// Buffer events for the configured warm-up
    pub async fn warm_up(&mut self, updates: &mut mpsc::UnboundedReceiver<DepthUpdate>) {
        match self.config.warm_up() {
            WarmUp::Fixed(duration) => buffer_for(&mut self.buffer, updates, duration).await,
            WarmUp::FirstUpdate { timeout } => {
                let deadline = tokio::time::sleep(timeout);
                tokio::pin!(deadline);
                while self.buffer.is_empty() {
                    tokio::select! {
                        biased;
                        _ = &mut deadline => break,
                        update = updates.recv() => match update {
                            Some(update) => self.buffer.push(update),
                            None => break,
                        },
                    }
                }
            }
        }
        info!(symbol = %self.symbol, buffered = self.buffer.len(), "warm-up complete");
    }

    /// Fetch and validate a snapshot, install it and replay the buffer
    ///
    /// Events arriving on `updates` while a fetch or retry delay is pending
    /// are appended to the buffer. On success the controller is Live.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotRetriesExhausted`] when every attempt failed
    /// or produced an unusable snapshot. A fetch error that is not a
    /// transport error (see [`Error::is_transport`]) is returned at once.
    pub async fn reconcile(
        &mut self,
        updates: &mut mpsc::UnboundedReceiver<DepthUpdate>,
    ) -> Result<ReplayReport, Error> {
        self.set_state(SyncState::Reconciling);
        let max_attempts = self.config.max_snapshot_attempts();

        for attempt in 1..=max_attempts {
            drain_pending(&mut self.buffer, updates);
            info!(symbol = %self.symbol, attempt, max_attempts, "fetching depth snapshot");

            let result = {
                let fetch = self.source.fetch_snapshot(&self.symbol);
                tokio::pin!(fetch);
                loop {
                    tokio::select! {
                        biased;
                        result = &mut fetch => break result,
                        Some(update) = updates.recv() => self.buffer.push(update),
                    }
                }
            };

            match result {
                Ok(snapshot) => {
                    drain_pending(&mut self.buffer, updates);
                    match self.validate(&snapshot) {
                        Ok(()) => return Ok(self.install(snapshot)),
                        Err(rejection) => {
                            warn!(symbol = %self.symbol, attempt, %rejection, "refetching snapshot");
                        }
                    }
                }
                Err(e) if e.is_transport() => {
                    warn!(symbol = %self.symbol, attempt, error = %e, "snapshot fetch failed");
                }
                Err(e) => {
                    error!(symbol = %self.symbol, attempt, error = %e, "snapshot fetch cannot succeed");
                    return Err(e);
                }
            }

            if attempt < max_attempts {
                buffer_for(&mut self.buffer, updates, self.config.retry_delay()).await;
            }
        }

        Err(Error::SnapshotRetriesExhausted {
            attempts: max_attempts,
        })
    }

    fn validate(&self, snapshot: &Snapshot) -> Result<(), Rejection> {
        if let Some(front) = self.buffer.front() {
            if snapshot.last_update_id < front.first_update_id {
                return Err(Rejection::PredatesBuffer {
                    snapshot_id: snapshot.last_update_id,
                    first_buffered: front.first_update_id,
                });
            }
        }

        let book_id = self.store.current_sequence();
        if snapshot.last_update_id < book_id {
            return Err(Rejection::OlderThanBook {
                snapshot_id: snapshot.last_update_id,
                book_id,
            });
        }

        Ok(())
    }

    /// Install `snapshot`, replay the buffer onto it and go Live
    fn install(&mut self, snapshot: Snapshot) -> ReplayReport {
        let snapshot_id = snapshot.last_update_id;
        // `validate` already refused anything older than the store, and this
        // task is the only writer
        let installed = self
            .store
            .set_snapshot(&snapshot.bids, &snapshot.asks, snapshot_id);
        debug_assert!(installed, "validated snapshot refused by store");

        if self.buffer.is_empty() {
            warn!(symbol = %self.symbol, "no buffered updates, stream may not be delivering");
        }

        let mut report = ReplayReport {
            snapshot_id,
            ..ReplayReport::default()
        };

        for update in self.buffer.drain() {
            if update.final_update_id <= snapshot_id {
                report.discarded += 1;
                continue;
            }

            // the first event past the snapshot should straddle snapshot_id + 1
            if report.applied == 0 && report.gaps == 0 && update.first_update_id > snapshot_id + 1 {
                report.handoff_gap = true;
                warn!(
                    symbol = %self.symbol,
                    snapshot_id,
                    first_update_id = update.first_update_id,
                    "gap between snapshot and first buffered update"
                );
            }

            match self.store.apply_update(&update) {
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::Stale => report.discarded += 1,
                ApplyOutcome::Gap => report.gaps += 1,
            }
        }

        self.initialized_once = true;
        self.set_state(SyncState::Live);
        info!(
            symbol = %self.symbol,
            snapshot_id,
            discarded = report.discarded,
            applied = report.applied,
            gaps = report.gaps,
            last_update_id = self.store.current_sequence(),
            "order book initialised"
        );
        report
    }

    /// Run until stopped, the stream ends, or initial sync fails
    ///
    /// # Errors
    ///
    /// - [`Error::SnapshotRetriesExhausted`] if the very first reconciliation
    ///   runs out of attempts. Later resyncs that run out start a new cycle.
    /// - [`Error::ConnectionClosed`] when the event channel closes.
    pub async fn run(
        mut self,
        mut updates: mpsc::UnboundedReceiver<DepthUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Error> {
        loop {
            let cycle = async {
                self.warm_up(&mut updates).await;
                self.reconcile(&mut updates).await
            };
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                outcome = cycle => outcome,
            };

            if let Err(e) = outcome {
                if !self.initialized_once {
                    error!(symbol = %self.symbol, error = %e, "failed to initialise order book");
                    return Err(e);
                }
                warn!(symbol = %self.symbol, error = %e, "resync failed, starting a new cycle");
                self.begin_resync(None);
                continue;
            }

            loop {
                let update = tokio::select! {
                    biased;
                    _ = stopped(&mut shutdown) => return Ok(()),
                    update = updates.recv() => update,
                };

                let Some(update) = update else {
                    warn!(symbol = %self.symbol, "depth stream ended");
                    return Err(Error::ConnectionClosed);
                };

                if self.on_update(update) == UpdateDisposition::ResyncRequired {
                    break;
                }
            }
        }
    }
}

/// Queue everything already waiting on the channel
fn drain_pending(buffer: &mut UpdateBuffer, updates: &mut mpsc::UnboundedReceiver<DepthUpdate>) {
    while let Ok(update) = updates.try_recv() {
        buffer.push(update);
    }
}

/// Queue events for `duration`
async fn buffer_for(
    buffer: &mut UpdateBuffer,
    updates: &mut mpsc::UnboundedReceiver<DepthUpdate>,
    duration: Duration,
) {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break,
            Some(update) = updates.recv() => buffer.push(update),
        }
    }
}

/// Resolves once the stop flag is set; never resolves if the sender is gone
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::types::PriceLevel;

    /// Returns queued responses in order, then timeouts
    #[derive(Debug, Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Snapshot, Error>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Snapshot, Error>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SnapshotSource for ScriptedSource {
        async fn fetch_snapshot(&self, _symbol: &str) -> Result<Snapshot, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().pop_front().unwrap_or(Err(Error::Timeout))
        }
    }

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel::new(price, quantity)
    }

    fn update(first: UpdateId, last: UpdateId) -> DepthUpdate {
        DepthUpdate::new(first, last, vec![], vec![])
    }

    fn snapshot(id: UpdateId) -> Snapshot {
        Snapshot::new(
            id,
            vec![level(dec!(50000), dec!(1))],
            vec![level(dec!(50010), dec!(2))],
        )
    }

    fn fast_config() -> SyncConfig {
        SyncConfig::new()
            .with_warm_up(WarmUp::Fixed(Duration::ZERO))
            .with_retry_delay(Duration::from_millis(1))
    }

    fn controller(
        source: &Arc<ScriptedSource>,
    ) -> (SyncController<Arc<ScriptedSource>>, Arc<OrderBookStore>) {
        let store = Arc::new(OrderBookStore::new("BTCUSDT"));
        let controller =
            SyncController::new("BTCUSDT", Arc::clone(&store), Arc::clone(source), fast_config());
        (controller, store)
    }

    async fn wait_for_sequence(store: &OrderBookStore, id: UpdateId) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.current_sequence() < id {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("sequence never reached");
    }

    #[tokio::test]
    async fn test_buffering_does_not_touch_store() {
        let source = ScriptedSource::new(vec![]);
        let (mut controller, store) = controller(&source);

        assert_eq!(controller.state(), SyncState::Buffering);
        assert_eq!(controller.on_update(update(1, 5)), UpdateDisposition::Buffered);
        assert_eq!(controller.on_update(update(6, 9)), UpdateDisposition::Buffered);

        assert_eq!(controller.buffered(), 2);
        assert!(!store.is_initialized());
        assert_eq!(store.current_sequence(), 0);
    }

    #[tokio::test]
    async fn test_replay_skips_stale_and_applies_rest() {
        let source = ScriptedSource::new(vec![Ok(snapshot(100))]);
        let (mut controller, store) = controller(&source);

        controller.on_update(DepthUpdate::new(95, 100, vec![level(dec!(50000), dec!(9))], vec![]));
        controller.on_update(DepthUpdate::new(101, 105, vec![level(dec!(50000), dec!(0))], vec![]));

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let report = controller.reconcile(&mut rx).await.unwrap();

        assert_eq!(
            report,
            ReplayReport {
                snapshot_id: 100,
                discarded: 1,
                applied: 1,
                gaps: 0,
                handoff_gap: false,
            }
        );
        assert_eq!(controller.state(), SyncState::Live);
        assert_eq!(controller.buffered(), 0);
        assert_eq!(store.current_sequence(), 105);
        assert_eq!(store.best_bid(), None);
        assert_eq!(store.best_ask(), Some(level(dec!(50010), dec!(2))));
    }

    #[tokio::test]
    async fn test_snapshot_older_than_buffer_is_refetched() {
        let source = ScriptedSource::new(vec![Ok(snapshot(40)), Ok(snapshot(55))]);
        let (mut controller, store) = controller(&source);
        controller.on_update(update(50, 60));

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let report = controller.reconcile(&mut rx).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(report.snapshot_id, 55);
        assert_eq!(report.applied, 1);
        assert_eq!(store.current_sequence(), 60);
    }

    #[tokio::test]
    async fn test_stale_snapshot_never_installed() {
        let source = ScriptedSource::new(vec![Ok(snapshot(40)), Ok(snapshot(41)), Ok(snapshot(42))]);
        let (mut controller, store) = controller(&source);
        controller.on_update(update(50, 60));

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let result = controller.reconcile(&mut rx).await;

        assert!(matches!(
            result,
            Err(Error::SnapshotRetriesExhausted { attempts: 3 })
        ));
        assert_eq!(source.calls(), 3);
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_non_transport_fetch_error_is_not_retried() {
        let source = ScriptedSource::new(vec![
            Err(Error::Config("bad endpoint".to_string())),
            Ok(snapshot(100)),
        ]);
        let (mut controller, store) = controller(&source);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let result = controller.reconcile(&mut rx).await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(source.calls(), 1);
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_fetch_failure_counts_against_budget() {
        let source = ScriptedSource::new(vec![Err(Error::Timeout), Ok(snapshot(100))]);
        let (mut controller, store) = controller(&source);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        controller.reconcile(&mut rx).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert!(store.is_initialized());
        assert_eq!(controller.state(), SyncState::Live);
    }

    #[tokio::test]
    async fn test_events_arriving_during_reconcile_are_replayed() {
        let source = ScriptedSource::new(vec![Ok(snapshot(100))]);
        let (mut controller, store) = controller(&source);

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(update(99, 101)).unwrap();
        tx.send(update(102, 104)).unwrap();

        let report = controller.reconcile(&mut rx).await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(store.current_sequence(), 104);
    }

    #[tokio::test]
    async fn test_handoff_gap_is_reported() {
        let source = ScriptedSource::new(vec![Ok(snapshot(100))]);
        let (mut controller, store) = controller(&source);
        // 96..=102 never arrive; the stale event keeps the snapshot acceptable
        controller.on_update(update(90, 95));
        controller.on_update(update(103, 105));

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let report = controller.reconcile(&mut rx).await.unwrap();

        assert_eq!(report.discarded, 1);
        assert!(report.handoff_gap);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.applied, 0);
        assert_eq!(store.current_sequence(), 100);
        assert_eq!(controller.state(), SyncState::Live);

        // the next live event cannot connect either, which forces a resync
        assert_eq!(
            controller.on_update(update(106, 107)),
            UpdateDisposition::ResyncRequired
        );
    }

    #[tokio::test]
    async fn test_live_apply_and_duplicates() {
        let source = ScriptedSource::new(vec![Ok(snapshot(200))]);
        let (mut controller, store) = controller(&source);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        controller.reconcile(&mut rx).await.unwrap();

        assert_eq!(controller.on_update(update(201, 203)), UpdateDisposition::Applied);
        assert_eq!(controller.on_update(update(201, 203)), UpdateDisposition::Stale);
        assert_eq!(store.current_sequence(), 203);
    }

    #[tokio::test]
    async fn test_gap_during_live_returns_to_buffering() {
        let source = ScriptedSource::new(vec![Ok(snapshot(200))]);
        let (mut controller, store) = controller(&source);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        controller.reconcile(&mut rx).await.unwrap();
        let mut states = controller.subscribe_state();
        assert_eq!(*states.borrow_and_update(), SyncState::Live);

        assert_eq!(
            controller.on_update(update(205, 210)),
            UpdateDisposition::ResyncRequired
        );
        assert_eq!(controller.state(), SyncState::Buffering);
        assert!(states.has_changed().unwrap());
        assert_eq!(store.current_sequence(), 200);
        assert!(store.top_levels(5).is_none());

        // the gap event opens the new buffer window
        assert_eq!(controller.buffered(), 1);
        assert_eq!(controller.on_update(update(211, 212)), UpdateDisposition::Buffered);
    }

    #[tokio::test]
    async fn test_resync_rejects_snapshot_older_than_book() {
        let source = ScriptedSource::new(vec![Ok(snapshot(200)), Ok(snapshot(150)), Ok(snapshot(260))]);
        let (mut controller, store) = controller(&source);

        let (_tx, mut rx) = mpsc::unbounded_channel();
        controller.reconcile(&mut rx).await.unwrap();
        controller.begin_resync(None);

        controller.reconcile(&mut rx).await.unwrap();
        assert_eq!(source.calls(), 3);
        assert_eq!(store.current_sequence(), 260);
    }

    #[tokio::test]
    async fn test_first_update_warm_up() {
        let source = ScriptedSource::new(vec![]);
        let store = Arc::new(OrderBookStore::new("BTCUSDT"));
        let config = fast_config().with_warm_up(WarmUp::FirstUpdate {
            timeout: Duration::from_secs(5),
        });
        let mut controller = SyncController::new("BTCUSDT", store, source, config);

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(update(1, 2)).unwrap();

        tokio::time::timeout(Duration::from_secs(1), controller.warm_up(&mut rx))
            .await
            .expect("warm-up should end on the first update");
        assert_eq!(controller.buffered(), 1);
    }

    #[tokio::test]
    async fn test_run_end_to_end_with_resync() {
        let source = ScriptedSource::new(vec![Ok(snapshot(100)), Ok(snapshot(300))]);
        let (controller, store) = controller(&source);
        let mut states = controller.subscribe_state();

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        tx.send(update(95, 100)).unwrap();
        tx.send(update(101, 105)).unwrap();

        let handle = tokio::spawn(controller.run(rx, stop_rx));

        states.wait_for(|s| s.is_live()).await.unwrap();
        wait_for_sequence(&store, 105).await;

        tx.send(update(106, 110)).unwrap();
        wait_for_sequence(&store, 110).await;

        // 111..=204 lost: controller must refetch and land on the new snapshot
        tx.send(update(205, 210)).unwrap();
        wait_for_sequence(&store, 300).await;
        states.wait_for(|s| s.is_live()).await.unwrap();

        tx.send(update(301, 302)).unwrap();
        wait_for_sequence(&store, 302).await;
        assert_eq!(source.calls(), 2);

        stop_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_initialization_failure() {
        let source = ScriptedSource::new(vec![]);
        let (controller, store) = controller(&source);

        let (_tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = controller.run(rx, stop_rx).await;
        assert!(matches!(
            result,
            Err(Error::SnapshotRetriesExhausted { attempts: 3 })
        ));
        assert_eq!(source.calls(), 3);
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_run_ends_when_stream_closes() {
        let source = ScriptedSource::new(vec![Ok(snapshot(100))]);
        let (controller, _store) = controller(&source);

        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        tx.send(update(100, 102)).unwrap();
        drop(tx);

        let result = controller.run(rx, stop_rx).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
