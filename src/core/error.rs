//! Typed error kinds for the retrieval pipeline.
//!
//! Per-key failures travel in-band with results (wrapped in stream values);
//! infrastructure failures (panics, channel overruns) go out-of-band on the
//! error channel. Callers match on these via `downcast_ref`.

use thiserror::Error;

use crate::Id;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Remote returned a non-success status for a path.
    #[error("{path}: unexpected status {status}")]
    FetchFailed { path: String, status: u16 },

    /// The worker-pool queue refused this id at enqueue time.
    #[error("{id}: work queue full")]
    EnqueueRefused { id: Id },

    /// A `do` callback panicked; peers for the same key were still invoked.
    #[error("callback panicked: {0}")]
    CallbackPanic(String),

    /// The underlying getter panicked while fetching a key.
    #[error("getter panicked: {0}")]
    GetterPanic(String),

    /// A stream result could not be delivered (max_in_flight exceeded).
    #[error("result channel full")]
    ResultChannelFull,

    /// The file-cache put channel was full; the write was skipped.
    #[error("file cache put channel full")]
    PutChannelFull,

    /// A cached resource could not be handed out as the requested type.
    #[error("{path}: cached value is not a {expected}")]
    DecodeMismatch {
        path: String,
        expected: &'static str,
    },

    /// Response body carried a different id than the request path.
    #[error("body id {body} does not match requested id {requested}")]
    IdMismatch { requested: Id, body: Id },

    /// The caller's token was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Render a panic payload for error reporting.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
