//! Registry of live book actors.
//!
//! The registry is the public entry point of the engine: subscribe and
//! unsubscribe books, route decoded updates to the owning actor, query
//! point-in-time copies, and read per-book health. All mutation happens
//! inside the owning actor; the registry only passes messages.

use crate::actor::{BookActor, BookCommand};
use crate::error::{EngineError, EngineResult};
use crate::publish::BookSink;
use crate::sync::{SymbolHealth, SyncConfig, SyncCounters};
use dashmap::DashMap;
use lob_core::{BookKey, BookView, IncrementalUpdate, SyncPhase};
use lob_rest::SnapshotSource;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command mailbox depth per actor. A full mailbox drops the update; the
/// resulting sequence gap is detected and recovered like any other.
const MAILBOX_CAPACITY: usize = 1024;

struct BookHandle {
    cmd_tx: mpsc::Sender<BookCommand>,
    cancel: CancellationToken,
    phase: Arc<RwLock<SyncPhase>>,
    counters: Arc<SyncCounters>,
}

impl BookHandle {
    fn health(&self) -> SymbolHealth {
        SymbolHealth {
            phase: *self.phase.read(),
            resyncs: self.counters.resyncs(),
            gaps: self.counters.gaps(),
            corruptions: self.counters.corruptions(),
            buffer_discards: self.counters.buffer_discards(),
        }
    }
}

/// Concurrent map of (exchange, symbol) to the owning actor.
pub struct BookRegistry<S: SnapshotSource> {
    books: DashMap<BookKey, BookHandle>,
    source: Arc<S>,
    sink: Arc<dyn BookSink>,
    config: SyncConfig,
}

impl<S: SnapshotSource> BookRegistry<S> {
    pub fn new(source: S, sink: Arc<dyn BookSink>, config: SyncConfig) -> Self {
        Self {
            books: DashMap::new(),
            source: Arc::new(source),
            sink,
            config,
        }
    }

    /// Start synchronizing a book. The actor immediately requests its
    /// first snapshot.
    pub fn subscribe(&self, key: BookKey) -> EngineResult<()> {
        match self.books.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::AlreadySubscribed(key))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (cmd_tx, cmd_rx) = mpsc::channel(MAILBOX_CAPACITY);
                let cancel = CancellationToken::new();
                let counters = Arc::new(SyncCounters::default());
                let phase = Arc::new(RwLock::new(SyncPhase::Unsynced));

                BookActor::spawn(
                    key.clone(),
                    self.config.clone(),
                    Arc::clone(&counters),
                    Arc::clone(&phase),
                    Arc::clone(&self.source),
                    Arc::clone(&self.sink),
                    cmd_rx,
                    cancel.clone(),
                );

                entry.insert(BookHandle {
                    cmd_tx,
                    cancel,
                    phase,
                    counters,
                });
                info!(key = %key, "subscribed");
                Ok(())
            }
        }
    }

    /// Stop synchronizing a book: cancels any in-flight snapshot fetch
    /// and discards the actor state.
    pub fn unsubscribe(&self, key: &BookKey) -> EngineResult<()> {
        let (_, handle) = self
            .books
            .remove(key)
            .ok_or_else(|| EngineError::NotSubscribed(key.clone()))?;
        handle.cancel.cancel();
        info!(key = %key, "unsubscribed");
        Ok(())
    }

    /// Deliver one decoded update to the owning actor.
    pub fn route_update(&self, update: IncrementalUpdate) -> EngineResult<()> {
        let key = update.key.clone();
        let handle = self
            .books
            .get(&key)
            .ok_or_else(|| EngineError::NotSubscribed(key.clone()))?;
        handle
            .cmd_tx
            .try_send(BookCommand::Update(update))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::MailboxFull(key),
                mpsc::error::TrySendError::Closed(_) => EngineError::ActorGone(key),
            })
    }

    /// Point-in-time copy of the current book, `None` while nothing has
    /// ever been synchronized for it.
    pub async fn get_current_book(&self, key: &BookKey) -> EngineResult<Option<BookView>> {
        let cmd_tx = self
            .books
            .get(key)
            .ok_or_else(|| EngineError::NotSubscribed(key.clone()))?
            .cmd_tx
            .clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(BookCommand::GetBook(reply_tx))
            .await
            .map_err(|_| EngineError::ActorGone(key.clone()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::ActorGone(key.clone()))
    }

    /// Force a resync (e.g., after repeated decode failures upstream).
    pub fn force_resync(&self, key: &BookKey, reason: &'static str) -> EngineResult<()> {
        self.send_command(key, BookCommand::ForceResync { reason })
    }

    /// Explicitly reset a book out of the Error phase.
    pub fn reset(&self, key: &BookKey) -> EngineResult<()> {
        self.send_command(key, BookCommand::Reset)
    }

    fn send_command(&self, key: &BookKey, cmd: BookCommand) -> EngineResult<()> {
        let handle = self
            .books
            .get(key)
            .ok_or_else(|| EngineError::NotSubscribed(key.clone()))?;
        handle.cmd_tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EngineError::MailboxFull(key.clone()),
            mpsc::error::TrySendError::Closed(_) => EngineError::ActorGone(key.clone()),
        })
    }

    /// Current phase and counters for one book.
    pub fn health(&self, key: &BookKey) -> Option<SymbolHealth> {
        self.books.get(key).map(|h| h.health())
    }

    /// Health of every subscribed book.
    pub fn all_health(&self) -> Vec<(BookKey, SymbolHealth)> {
        self.books
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().health()))
            .collect()
    }

    /// All subscribed keys.
    pub fn keys(&self) -> Vec<BookKey> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Cancel every actor and clear the registry.
    pub fn shutdown(&self) {
        for entry in self.books.iter() {
            entry.value().cancel.cancel();
        }
        self.books.clear();
        info!("registry shut down");
    }
}
