//! Main application orchestration.
//!
//! Builds the snapshot client, the actor registry, and the feed router,
//! subscribes every configured book, then consumes raw frames handed in
//! by the transport collaborator until shutdown.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::router::FeedRouter;
use lob_core::{BookKey, ExchangeId};
use lob_engine::{BookRegistry, BookSink, BookUpdate, SymbolHealth};
use lob_rest::SnapshotClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Raw frame capacity between the transport collaborator and the router.
const RAW_CHANNEL_CAPACITY: usize = 4096;

/// One deframed text frame from an exchange feed.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub exchange: ExchangeId,
    pub payload: String,
}

/// Default sink: logs reconciled mutations. Stands in for the downstream
/// message bus when the daemon runs standalone.
struct LogSink;

impl BookSink for LogSink {
    fn publish(&self, update: BookUpdate) {
        debug!(key = %update.key, sequence = update.sequence, "book update published");
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    registry: Arc<BookRegistry<SnapshotClient>>,
    router: FeedRouter<SnapshotClient>,
    raw_tx: mpsc::Sender<RawMessage>,
    raw_rx: mpsc::Receiver<RawMessage>,
}

impl Application {
    /// Create a new application from configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = SnapshotClient::new(config.rest.to_rest_config())?;
        let registry = Arc::new(BookRegistry::new(
            client,
            Arc::new(LogSink),
            config.engine.to_sync_config(),
        ));
        let router = FeedRouter::new(Arc::clone(&registry), config.router.decode_failure_limit);
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            registry,
            router,
            raw_tx,
            raw_rx,
        })
    }

    /// Sender the transport collaborator uses to hand in deframed frames.
    pub fn raw_sender(&self) -> mpsc::Sender<RawMessage> {
        self.raw_tx.clone()
    }

    /// Registry handle for querying books and health.
    pub fn registry(&self) -> Arc<BookRegistry<SnapshotClient>> {
        Arc::clone(&self.registry)
    }

    /// Health of every subscribed book.
    pub fn health(&self) -> Vec<(BookKey, SymbolHealth)> {
        self.registry.all_health()
    }

    /// Subscribe every configured book and consume frames until ctrl-c.
    pub async fn run(mut self) -> AppResult<()> {
        for sub in &self.config.subscriptions {
            let key = BookKey::new(sub.exchange, sub.symbol.as_str());
            self.registry.subscribe(key)?;
        }
        info!(
            books = self.config.subscriptions.len(),
            "application running"
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
                Some(msg) = self.raw_rx.recv() => {
                    self.router.handle_raw(msg.exchange, &msg.payload);
                }
            }
        }

        for (key, health) in self.registry.all_health() {
            info!(
                key = %key,
                phase = %health.phase,
                resyncs = health.resyncs,
                gaps = health.gaps,
                corruptions = health.corruptions,
                buffer_discards = health.buffer_discards,
                "final book health"
            );
        }
        self.registry.shutdown();
        Ok(())
    }
}
