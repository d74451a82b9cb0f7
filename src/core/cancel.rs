//! Cancellation token handed down through every pipeline layer.
//!
//! Cancellation is cooperative: the fetcher fails fast, the stream driver
//! drains outstanding work and closes its output. There is no partial
//! cancellation; timeouts belong to the fetcher the caller supplies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::CoreError;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Err([`CoreError::Cancelled`]) once cancel has been called.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}
