//! Publish sink for reconciled book mutations.
//!
//! The engine hands every successfully applied mutation to a `BookSink`.
//! Publishing is fire-and-forget: a slow or failing sink must never block
//! or corrupt synchronization state, so sink implementations do their own
//! buffering and drop on overflow.

use lob_core::{BookKey, BookView, PriceLevel};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// Payload of one published mutation.
#[derive(Debug, Clone)]
pub enum BookPayload {
    /// Full book state, published after every completed bootstrap.
    Refresh(BookView),
    /// The diff applied by one steady-state update.
    Delta {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
}

/// One reconciled mutation, delivered after it has been applied.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub key: BookKey,
    /// Sequence the book reached with this mutation.
    pub sequence: u64,
    pub payload: BookPayload,
}

/// Downstream delivery seam. Implementations must not block.
pub trait BookSink: Send + Sync + 'static {
    fn publish(&self, update: BookUpdate);
}

/// Sink that discards everything. Useful in tests and standalone tools.
#[derive(Debug, Default)]
pub struct NullSink;

impl BookSink for NullSink {
    fn publish(&self, _update: BookUpdate) {}
}

/// Sink backed by a bounded channel. Overflow drops the update and counts
/// it; synchronization state is never held up by a slow consumer.
#[derive(Debug)]
pub struct MpscSink {
    tx: mpsc::Sender<BookUpdate>,
    dropped: AtomicU64,
}

impl MpscSink {
    /// Create a sink and the receiving half for the consumer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BookUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Updates dropped because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BookSink for MpscSink {
    fn publish(&self, update: BookUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            let key = match &e {
                mpsc::error::TrySendError::Full(u) | mpsc::error::TrySendError::Closed(u) => {
                    u.key.clone()
                }
            };
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(key = %key, dropped, "publish sink overflow, update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lob_core::{ExchangeId, SyncPhase};

    fn update(seq: u64) -> BookUpdate {
        BookUpdate {
            key: BookKey::new(ExchangeId::Binance, "BTCUSDT"),
            sequence: seq,
            payload: BookPayload::Refresh(BookView {
                key: BookKey::new(ExchangeId::Binance, "BTCUSDT"),
                phase: SyncPhase::Synced,
                sequence: seq,
                bids: vec![],
                asks: vec![],
                captured_at: Utc::now(),
            }),
        }
    }

    #[tokio::test]
    async fn test_mpsc_sink_delivers() {
        let (sink, mut rx) = MpscSink::new(4);
        sink.publish(update(1));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.sequence, 1);
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_mpsc_sink_drops_on_overflow() {
        let (sink, mut rx) = MpscSink::new(1);
        sink.publish(update(1));
        sink.publish(update(2));
        assert_eq!(sink.dropped(), 1);

        // The first update is still intact.
        let got = rx.recv().await.unwrap();
        assert_eq!(got.sequence, 1);
    }
}
