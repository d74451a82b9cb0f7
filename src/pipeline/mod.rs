//! Streaming retrieval over a growing id set.

pub mod stream;

pub use stream::{ItemStream, StreamValue};
