//! Engine error types.
//!
//! Desync conditions (gaps, overflow, corruption) are not errors here:
//! they are counted state transitions whose universal recovery is a
//! resync. These errors cover the registry surface only.

use lob_core::BookKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not subscribed: {0}")]
    NotSubscribed(BookKey),

    #[error("Already subscribed: {0}")]
    AlreadySubscribed(BookKey),

    #[error("Actor gone: {0}")]
    ActorGone(BookKey),

    #[error("Mailbox full: {0}")]
    MailboxFull(BookKey),
}

pub type EngineResult<T> = Result<T, EngineError>;
