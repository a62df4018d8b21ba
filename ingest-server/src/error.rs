//! Crate-wide error kinds.
//!
//! Internal operations return `Result<T, IngestError>`. The facade never
//! lets a raw `IngestError` cross the HTTP boundary — it converts the
//! caller-visible subset into `SubmitOutcome` (see `facade.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed sample: {0}")]
    Malformed(String),

    #[error("rate limited: {0:?}")]
    RateLimited(crate::ratelimit::Denial),

    #[error("queue full")]
    QueueFull,

    #[error("store transient failure: {0}")]
    StoreTransient(String),

    #[error("store permanent failure: {0}")]
    StorePermanent(String),

    #[error("alert create failed: {0}")]
    AlertCreateFailed(String),

    #[error("processor fault in {processor}: {message}")]
    ProcessorFault { processor: String, message: String },
}
