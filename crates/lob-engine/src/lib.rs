//! Order book synchronization engine.
//!
//! Reconciles periodically-fetched full-depth snapshots with continuous
//! incremental diff streams, one actor per (exchange, symbol) book:
//! - `sync`: the pure per-book state machine (phases, buffering, gap and
//!   integrity detection); no I/O, unit-testable in isolation
//! - `actor`: one tokio task per book driving the state machine, owning
//!   snapshot fetches and the periodic self-healing audit
//! - `registry`: the concurrent map of live actors and the only public
//!   entry point; readers receive copies, never live references
//! - `publish`: the sink every successfully applied mutation is handed to

pub mod actor;
pub mod checksum;
pub mod error;
pub mod publish;
pub mod registry;
pub mod sync;

pub use error::{EngineError, EngineResult};
pub use publish::{BookPayload, BookSink, BookUpdate, MpscSink, NullSink};
pub use registry::BookRegistry;
pub use sync::{Effect, SymbolHealth, SyncConfig, SyncCounters, SyncEvent, SyncState};
