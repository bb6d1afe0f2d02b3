//! Per-book synchronization state machine.
//!
//! Pure `(state, event) -> effects` transitions over exclusively-owned
//! state: no I/O happens here, which is what makes the reconciliation
//! logic unit-testable without any network mocking. The owning actor
//! executes the returned effects (snapshot fetches, publishes).
//!
//! Phase walk: `Unsynced` buffers updates while a snapshot is requested;
//! `Syncing` covers the window between dispatching the fetch and
//! validating the snapshot against the buffer; `Synced` applies updates
//! live; `Error` is entered after repeated resync failures and only an
//! explicit reset leaves it. A resync is the universal recovery action
//! for every desync condition.

use crate::checksum;
use crate::publish::{BookPayload, BookUpdate};
use lob_core::{BookKey, BookView, IncrementalUpdate, OrderBook, OrderBookSnapshot, SyncPhase};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tuning for one book's synchronization.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pending-update buffer capacity; overflow discards the oldest entry.
    pub buffer_capacity: usize,
    /// Depth requested from the snapshot fetcher.
    pub snapshot_depth: usize,
    /// Consecutive resync failures within `failure_window` before the
    /// book enters the Error phase.
    pub max_resync_failures: u32,
    /// Window over which resync failures are counted.
    pub failure_window: Duration,
    /// Delay before re-requesting a snapshot after a failed fetch.
    pub resync_delay: Duration,
    /// Interval of the periodic self-healing snapshot audit.
    pub audit_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            snapshot_depth: 400,
            max_resync_failures: 5,
            failure_window: Duration::from_secs(60),
            resync_delay: Duration::from_millis(500),
            audit_interval: Duration::from_secs(300),
        }
    }
}

/// Read-only counters for one book, shared with external observers.
#[derive(Debug, Default)]
pub struct SyncCounters {
    resyncs: AtomicU64,
    gaps: AtomicU64,
    corruptions: AtomicU64,
    buffer_discards: AtomicU64,
}

impl SyncCounters {
    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap(&self) {
        self.gaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_discard(&self) {
        self.buffer_discards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn gaps(&self) -> u64 {
        self.gaps.load(Ordering::Relaxed)
    }

    pub fn corruptions(&self) -> u64 {
        self.corruptions.load(Ordering::Relaxed)
    }

    pub fn buffer_discards(&self) -> u64 {
        self.buffer_discards.load(Ordering::Relaxed)
    }
}

/// Point-in-time health of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolHealth {
    pub phase: SyncPhase,
    pub resyncs: u64,
    pub gaps: u64,
    pub corruptions: u64,
    pub buffer_discards: u64,
}

/// Input to the state machine.
#[derive(Debug)]
pub enum SyncEvent {
    /// Decoded incremental update from the feed.
    Update(IncrementalUpdate),
    /// Bootstrap snapshot fetch completed.
    Snapshot(OrderBookSnapshot),
    /// Bootstrap snapshot fetch failed.
    SnapshotFailed { error: String },
    /// Periodic audit snapshot fetch completed.
    AuditSnapshot(OrderBookSnapshot),
    /// Externally requested resync (e.g., repeated decode failures).
    ForceResync { reason: &'static str },
    /// Explicit operator reset; the only exit from the Error phase.
    Reset,
}

/// Side effect requested by a transition; executed by the owning actor.
#[derive(Debug)]
pub enum Effect {
    /// Request a snapshot fetch. The actor keeps at most one in flight.
    FetchSnapshot { delay: Duration },
    /// Deliver a reconciled mutation to the publish sink.
    Publish(BookUpdate),
    /// The book escalated to the Error phase.
    EnteredError,
}

/// Synchronization state for one book. Exclusively owned and mutated by
/// its actor; readers only ever receive copies via [`SyncState::view`].
pub struct SyncState {
    key: BookKey,
    config: SyncConfig,
    phase: SyncPhase,
    book: OrderBook,
    last_applied: u64,
    buffer: VecDeque<IncrementalUpdate>,
    counters: Arc<SyncCounters>,
    /// Recent resync failures, trimmed to `failure_window`.
    failures: VecDeque<Instant>,
    /// Set once per overflow episode so a flooding buffer forces exactly
    /// one re-request instead of one per discarded entry.
    overflow_reported: bool,
    /// Whether `book` has ever held validated contents.
    has_book: bool,
}

impl SyncState {
    pub fn new(key: BookKey, config: SyncConfig, counters: Arc<SyncCounters>) -> Self {
        Self {
            key,
            config,
            phase: SyncPhase::Unsynced,
            book: OrderBook::new(),
            last_applied: 0,
            buffer: VecDeque::new(),
            counters,
            failures: VecDeque::new(),
            overflow_reported: false,
            has_book: false,
        }
    }

    pub fn key(&self) -> &BookKey {
        &self.key
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Point-in-time copy of the book, if there has ever been one. A book
    /// in the Error phase is still served, flagged by its phase, until a
    /// reset rebuilds it.
    pub fn view(&self) -> Option<BookView> {
        if !self.has_book {
            return None;
        }
        Some(self.book.view(self.key.clone(), self.phase, self.last_applied))
    }

    /// Called by the actor when it actually dispatches a snapshot fetch.
    pub fn on_fetch_dispatched(&mut self) {
        if self.phase == SyncPhase::Unsynced {
            self.phase = SyncPhase::Syncing;
        }
    }

    /// Drive one event through the state machine.
    pub fn handle(&mut self, event: SyncEvent) -> Vec<Effect> {
        match event {
            SyncEvent::Update(update) => self.on_update(update),
            SyncEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            SyncEvent::SnapshotFailed { error } => self.on_snapshot_failed(&error),
            SyncEvent::AuditSnapshot(snapshot) => self.on_audit(snapshot),
            SyncEvent::ForceResync { reason } => self.on_force_resync(reason),
            SyncEvent::Reset => self.on_reset(),
        }
    }

    fn on_update(&mut self, update: IncrementalUpdate) -> Vec<Effect> {
        match self.phase {
            SyncPhase::Error => Vec::new(),
            SyncPhase::Unsynced | SyncPhase::Syncing => self.buffer_update(update),
            SyncPhase::Synced => self.apply_live(update),
        }
    }

    fn buffer_update(&mut self, update: IncrementalUpdate) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.buffer.len() >= self.config.buffer_capacity {
            self.buffer.pop_front();
            self.counters.record_buffer_discard();
            // An overflowing buffer can no longer be assumed to span a
            // contiguous range; the snapshot in flight may already be too
            // stale by the time it lands. One re-request per episode.
            if !self.overflow_reported {
                self.overflow_reported = true;
                self.counters.record_resync();
                warn!(key = %self.key, "pending buffer overflow, forcing snapshot refetch");
                effects.push(Effect::FetchSnapshot {
                    delay: Duration::ZERO,
                });
            }
        }
        self.buffer.push_back(update);
        effects
    }

    fn apply_live(&mut self, update: IncrementalUpdate) -> Vec<Effect> {
        if update.is_stale(self.last_applied) {
            // Duplicate or replayed update; applying it again would be
            // harmless but it carries no new information.
            return Vec::new();
        }

        if !update.is_contiguous_after(self.last_applied) {
            self.counters.record_gap();
            warn!(
                key = %self.key,
                last_applied = self.last_applied,
                first = update.first_update_id,
                last = update.last_update_id,
                "sequence gap, forcing resync"
            );
            let effects = self.schedule_resync();
            // The offending update is ahead of us; it may chain onto the
            // next snapshot, so it seeds the new pending buffer.
            self.buffer.push_back(update);
            return effects;
        }

        self.book.apply(&update);
        self.last_applied = update.last_update_id;

        if self.book.is_crossed() {
            self.counters.record_corruption();
            warn!(key = %self.key, sequence = self.last_applied, "book crossed after merge");
            self.book.clear();
            self.has_book = false;
            return self.schedule_resync();
        }

        if let Some(expected) = update.checksum {
            let actual = checksum::book_checksum(&self.book);
            if actual != expected {
                self.counters.record_corruption();
                warn!(
                    key = %self.key,
                    sequence = self.last_applied,
                    expected,
                    actual,
                    "book checksum mismatch"
                );
                self.book.clear();
                self.has_book = false;
                return self.schedule_resync();
            }
        }

        vec![Effect::Publish(BookUpdate {
            key: self.key.clone(),
            sequence: self.last_applied,
            payload: BookPayload::Delta {
                bids: update.bids,
                asks: update.asks,
            },
        })]
    }

    fn on_snapshot(&mut self, snapshot: OrderBookSnapshot) -> Vec<Effect> {
        if matches!(self.phase, SyncPhase::Error | SyncPhase::Synced) {
            debug!(key = %self.key, phase = %self.phase, "ignoring snapshot in current phase");
            return Vec::new();
        }
        self.overflow_reported = false;

        if snapshot.is_crossed() {
            warn!(key = %self.key, sequence = snapshot.sequence, "crossed snapshot rejected");
            return self.fail_resync();
        }

        // Buffered updates arrived in network order; replay happens in
        // sequence order.
        let mut pending: Vec<IncrementalUpdate> = self.buffer.drain(..).collect();
        pending.sort_by_key(|u| u.first_update_id);
        pending.retain(|u| !u.is_stale(snapshot.sequence));

        if let Some(first) = pending.first() {
            if first.first_update_id > snapshot.sequence + 1 {
                // Everything buffered starts after the snapshot's sequence:
                // the snapshot is too stale relative to the buffer.
                self.counters.record_gap();
                warn!(
                    key = %self.key,
                    sequence = snapshot.sequence,
                    oldest_first = first.first_update_id,
                    "snapshot behind buffered updates, refetching"
                );
                self.buffer.extend(pending);
                return self.fail_resync();
            }
        }

        self.book.load_snapshot(&snapshot);
        self.last_applied = snapshot.sequence;

        for (i, update) in pending.iter().enumerate() {
            if update.is_stale(self.last_applied) {
                continue;
            }
            // The first replayed update may overlap the snapshot's
            // sequence; after that the chain is strict.
            let applicable = if self.last_applied == snapshot.sequence {
                update.covers_next(self.last_applied)
            } else {
                update.is_contiguous_after(self.last_applied)
            };
            if !applicable {
                self.counters.record_gap();
                warn!(
                    key = %self.key,
                    last_applied = self.last_applied,
                    first = update.first_update_id,
                    "gap inside buffered replay, refetching"
                );
                self.book.clear();
                self.has_book = false;
                self.buffer.extend(pending.drain(i..));
                return self.fail_resync();
            }
            self.book.apply(update);
            self.last_applied = update.last_update_id;
        }

        if self.book.is_crossed() {
            self.counters.record_corruption();
            warn!(key = %self.key, sequence = self.last_applied, "book crossed after replay");
            self.book.clear();
            self.has_book = false;
            return self.fail_resync();
        }

        self.phase = SyncPhase::Synced;
        self.has_book = true;
        self.failures.clear();
        info!(
            key = %self.key,
            sequence = self.last_applied,
            bids = self.book.bid_depth(),
            asks = self.book.ask_depth(),
            "book synced"
        );

        let view = self.book.view(self.key.clone(), self.phase, self.last_applied);
        vec![Effect::Publish(BookUpdate {
            key: self.key.clone(),
            sequence: self.last_applied,
            payload: BookPayload::Refresh(view),
        })]
    }

    fn on_snapshot_failed(&mut self, error: &str) -> Vec<Effect> {
        if self.phase == SyncPhase::Error {
            return Vec::new();
        }
        warn!(key = %self.key, error, "snapshot fetch failed");
        if self.record_failure() {
            return vec![Effect::EnteredError];
        }
        self.phase = SyncPhase::Unsynced;
        vec![Effect::FetchSnapshot {
            delay: self.config.resync_delay,
        }]
    }

    fn on_audit(&mut self, snapshot: OrderBookSnapshot) -> Vec<Effect> {
        if self.phase != SyncPhase::Synced {
            return Vec::new();
        }
        if snapshot.sequence != self.last_applied {
            // Nothing feasible to compare: the books are at different
            // points of the exchange's mutation history.
            debug!(
                key = %self.key,
                local = self.last_applied,
                remote = snapshot.sequence,
                "audit snapshot at different sequence, skipped"
            );
            return Vec::new();
        }
        match self.book.diff_against_snapshot(&snapshot) {
            None => {
                debug!(key = %self.key, sequence = self.last_applied, "audit clean");
                Vec::new()
            }
            Some(divergence) => {
                self.counters.record_corruption();
                warn!(
                    key = %self.key,
                    sequence = self.last_applied,
                    %divergence,
                    "audit divergence, forcing resync"
                );
                self.book.clear();
                self.has_book = false;
                self.schedule_resync()
            }
        }
    }

    fn on_force_resync(&mut self, reason: &'static str) -> Vec<Effect> {
        match self.phase {
            SyncPhase::Error => Vec::new(),
            SyncPhase::Synced => {
                info!(key = %self.key, reason, "forced resync");
                self.schedule_resync()
            }
            // Already resynchronizing; make sure a fetch is running.
            SyncPhase::Unsynced | SyncPhase::Syncing => vec![Effect::FetchSnapshot {
                delay: Duration::ZERO,
            }],
        }
    }

    fn on_reset(&mut self) -> Vec<Effect> {
        info!(key = %self.key, phase = %self.phase, "explicit reset");
        self.phase = SyncPhase::Unsynced;
        self.failures.clear();
        self.buffer.clear();
        self.overflow_reported = false;
        vec![Effect::FetchSnapshot {
            delay: Duration::ZERO,
        }]
    }

    /// A desync was detected: leave Synced, count the resync, request a
    /// fresh snapshot.
    fn schedule_resync(&mut self) -> Vec<Effect> {
        self.counters.record_resync();
        self.phase = SyncPhase::Unsynced;
        vec![Effect::FetchSnapshot {
            delay: Duration::ZERO,
        }]
    }

    /// A resync attempt failed validation: count it toward the escalation
    /// window, then either retry or enter the Error phase.
    fn fail_resync(&mut self) -> Vec<Effect> {
        if self.record_failure() {
            return vec![Effect::EnteredError];
        }
        self.phase = SyncPhase::Unsynced;
        self.counters.record_resync();
        vec![Effect::FetchSnapshot {
            delay: Duration::ZERO,
        }]
    }

    /// Record one resync failure. Returns true when the failure budget
    /// within the window is exhausted and the book entered Error.
    fn record_failure(&mut self) -> bool {
        let now = Instant::now();
        self.failures.push_back(now);
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > self.config.failure_window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        if self.failures.len() >= self.config.max_resync_failures as usize {
            self.phase = SyncPhase::Error;
            self.buffer.clear();
            warn!(
                key = %self.key,
                failures = self.failures.len(),
                "resync failure budget exhausted, entering ERROR"
            );
            return true;
        }
        false
    }
}
