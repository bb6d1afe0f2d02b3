//! Order book synchronization daemon.
//!
//! Wires the engine together: configuration, per-exchange decoders, the
//! REST snapshot client, the actor registry, and a publish sink. The
//! WebSocket transport is an external collaborator; it hands deframed
//! text frames to this crate through [`app::RawMessage`] and the sender
//! returned by [`app::Application::raw_sender`].

pub mod app;
pub mod config;
pub mod error;
pub mod router;

pub use app::{Application, RawMessage};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use router::FeedRouter;
