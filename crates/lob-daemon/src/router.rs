//! Raw message routing.
//!
//! Takes deframed text frames from the transport collaborator, runs them
//! through the exchange's decoder, and delivers decoded updates to the
//! owning actor. A malformed message is dropped and counted; repeated
//! consecutive failures on one exchange feed force every book on that
//! exchange to resync, since the stream can no longer be trusted.

use lob_core::ExchangeId;
use lob_engine::{BookRegistry, EngineError};
use lob_feed::{decoder_for, UpdateDecoder};
use lob_rest::SnapshotSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct ExchangeLane {
    decoder: Box<dyn UpdateDecoder>,
    consecutive_failures: AtomicU32,
}

/// Routes raw frames to book actors through per-exchange decoders.
pub struct FeedRouter<S: SnapshotSource> {
    registry: Arc<BookRegistry<S>>,
    lanes: HashMap<ExchangeId, ExchangeLane>,
    decode_failure_limit: u32,
}

impl<S: SnapshotSource> FeedRouter<S> {
    pub fn new(registry: Arc<BookRegistry<S>>, decode_failure_limit: u32) -> Self {
        let lanes = ExchangeId::ALL
            .iter()
            .map(|&exchange| {
                (
                    exchange,
                    ExchangeLane {
                        decoder: decoder_for(exchange),
                        consecutive_failures: AtomicU32::new(0),
                    },
                )
            })
            .collect();
        Self {
            registry,
            lanes,
            decode_failure_limit,
        }
    }

    /// Handle one deframed text frame from an exchange feed.
    pub fn handle_raw(&self, exchange: ExchangeId, raw: &str) {
        let lane = match self.lanes.get(&exchange) {
            Some(lane) => lane,
            None => return,
        };

        match lane.decoder.decode(raw) {
            Ok(Some(update)) => {
                lane.consecutive_failures.store(0, Ordering::Relaxed);
                let key = update.key.clone();
                match self.registry.route_update(update) {
                    Ok(()) => {}
                    // Frames for unsubscribed symbols are normal on shared
                    // streams.
                    Err(EngineError::NotSubscribed(_)) => {
                        debug!(key = %key, "update for unsubscribed book dropped");
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "update delivery failed");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                let failures = lane.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    exchange = %exchange,
                    error = %e,
                    failures,
                    "message dropped: decode failed"
                );
                if failures >= self.decode_failure_limit {
                    lane.consecutive_failures.store(0, Ordering::Relaxed);
                    self.force_resync_exchange(exchange);
                }
            }
        }
    }

    /// The feed can no longer be trusted; resync every book on it.
    fn force_resync_exchange(&self, exchange: ExchangeId) {
        warn!(exchange = %exchange, "repeated decode failures, forcing resync");
        for key in self.registry.keys() {
            if key.exchange == exchange {
                if let Err(e) = self.registry.force_resync(&key, "repeated decode failures") {
                    warn!(key = %key, error = %e, "forced resync failed");
                }
            }
        }
    }

    /// Decode accounting for one exchange feed.
    pub fn decode_stats(&self, exchange: ExchangeId) -> Option<&lob_feed::DecodeStats> {
        self.lanes.get(&exchange).map(|lane| lane.decoder.stats())
    }
}
