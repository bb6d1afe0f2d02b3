//! Per-book actor.
//!
//! One tokio task per (exchange, symbol) book owns that book's `SyncState`
//! exclusively and is the single writer to it. Everything else talks to
//! the actor through its command mailbox; readers get point-in-time
//! copies back over oneshot channels. Snapshot fetches run as cancellable
//! side tasks so the mailbox keeps draining (and buffering) while a fetch
//! is in flight, with at most one fetch in flight per book.

use crate::publish::BookSink;
use crate::sync::{Effect, SyncConfig, SyncCounters, SyncEvent, SyncState};
use lob_core::{BookKey, BookView, OrderBookSnapshot, SyncPhase};
use lob_rest::{RestResult, SnapshotSource};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Commands accepted by a book actor.
#[derive(Debug)]
pub enum BookCommand {
    /// Decoded incremental update.
    Update(lob_core::IncrementalUpdate),
    /// Point-in-time copy of the current book.
    GetBook(oneshot::Sender<Option<BookView>>),
    /// Externally requested resync.
    ForceResync { reason: &'static str },
    /// Explicit reset; the only exit from the Error phase.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Bootstrap,
    Audit,
}

struct FetchResult {
    kind: FetchKind,
    result: RestResult<OrderBookSnapshot>,
}

pub(crate) struct BookActor<S: SnapshotSource> {
    state: SyncState,
    config: SyncConfig,
    source: Arc<S>,
    sink: Arc<dyn BookSink>,
    /// Shared with the registry for lock-free health reads.
    phase: Arc<RwLock<SyncPhase>>,
    cmd_rx: mpsc::Receiver<BookCommand>,
    fetch_tx: mpsc::Sender<FetchResult>,
    fetch_rx: mpsc::Receiver<FetchResult>,
    cancel: CancellationToken,
    in_flight: Option<FetchKind>,
    /// Bootstrap fetch requested while an audit fetch was in flight.
    pending_bootstrap: Option<Duration>,
}

impl<S: SnapshotSource> BookActor<S> {
    /// Spawn the actor task for one book.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        key: BookKey,
        config: SyncConfig,
        counters: Arc<SyncCounters>,
        phase: Arc<RwLock<SyncPhase>>,
        source: Arc<S>,
        sink: Arc<dyn BookSink>,
        cmd_rx: mpsc::Receiver<BookCommand>,
        cancel: CancellationToken,
    ) {
        let (fetch_tx, fetch_rx) = mpsc::channel(4);
        let actor = Self {
            state: SyncState::new(key, config.clone(), counters),
            config,
            source,
            sink,
            phase,
            cmd_rx,
            fetch_tx,
            fetch_rx,
            cancel,
            in_flight: None,
            pending_bootstrap: None,
        };
        let _ = tokio::spawn(actor.run());
    }

    async fn run(mut self) {
        info!(key = %self.state.key(), "book actor started");
        self.request_fetch(Duration::ZERO, FetchKind::Bootstrap);

        let audit_period = self.config.audit_interval;
        let mut audit =
            tokio::time::interval_at(tokio::time::Instant::now() + audit_period, audit_period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                Some(result) = self.fetch_rx.recv() => self.on_fetch_result(result),
                _ = audit.tick() => self.on_audit_tick(),
            }
        }
        info!(key = %self.state.key(), "book actor stopped");
    }

    fn on_command(&mut self, cmd: BookCommand) {
        match cmd {
            BookCommand::Update(update) => self.drive(SyncEvent::Update(update)),
            BookCommand::GetBook(reply) => {
                let _ = reply.send(self.state.view());
            }
            BookCommand::ForceResync { reason } => self.drive(SyncEvent::ForceResync { reason }),
            BookCommand::Reset => self.drive(SyncEvent::Reset),
        }
    }

    fn on_fetch_result(&mut self, fetch: FetchResult) {
        self.in_flight = None;
        match (fetch.kind, fetch.result) {
            (FetchKind::Bootstrap, Ok(snapshot)) => self.drive(SyncEvent::Snapshot(snapshot)),
            (FetchKind::Bootstrap, Err(error)) => self.drive(SyncEvent::SnapshotFailed {
                error: error.to_string(),
            }),
            (FetchKind::Audit, Ok(snapshot)) => self.drive(SyncEvent::AuditSnapshot(snapshot)),
            (FetchKind::Audit, Err(error)) => {
                // Audit fetches are best-effort; a failed one does not
                // count toward the resync failure budget.
                debug!(key = %self.state.key(), %error, "audit snapshot fetch failed");
            }
        }
        if let Some(delay) = self.pending_bootstrap.take() {
            if self.state.phase().needs_snapshot() {
                self.request_fetch(delay, FetchKind::Bootstrap);
            }
        }
    }

    fn on_audit_tick(&mut self) {
        if self.state.phase() == SyncPhase::Synced && self.in_flight.is_none() {
            debug!(key = %self.state.key(), "running snapshot audit");
            self.request_fetch(Duration::ZERO, FetchKind::Audit);
        }
    }

    fn drive(&mut self, event: SyncEvent) {
        let effects = self.state.handle(event);
        *self.phase.write() = self.state.phase();
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { delay } => self.request_fetch(delay, FetchKind::Bootstrap),
                Effect::Publish(update) => self.sink.publish(update),
                // Phase share already reflects it; the registry surfaces
                // the unhealthy book through health().
                Effect::EnteredError => {}
            }
        }
    }

    fn request_fetch(&mut self, delay: Duration, kind: FetchKind) {
        match self.in_flight {
            Some(FetchKind::Bootstrap) => return,
            Some(FetchKind::Audit) => {
                if kind == FetchKind::Bootstrap {
                    self.pending_bootstrap = Some(delay);
                }
                return;
            }
            None => {}
        }
        self.in_flight = Some(kind);
        if kind == FetchKind::Bootstrap {
            self.state.on_fetch_dispatched();
            *self.phase.write() = self.state.phase();
        }

        let source = Arc::clone(&self.source);
        let key = self.state.key().clone();
        let depth = self.config.snapshot_depth;
        let tx = self.fetch_tx.clone();
        let cancel = self.cancel.child_token();
        let _ = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = source.fetch_snapshot(&key, depth) => {
                    let _ = tx.send(FetchResult { kind, result }).await;
                }
            }
        });
    }
}
