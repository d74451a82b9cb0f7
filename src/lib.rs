//! Simmer: bulk item retrieval from the HN API with layered caching.
//!
//! The hard part of talking to the API is that its only item primitive is
//! "fetch one item by id". This crate turns that into a throttled,
//! deduplicated, two-tier-cached stream: see [`core`] for the layers,
//! [`pipeline::ItemStream`] for ordered/unordered streaming search with
//! dynamic expansion, and [`Client`] for the wired-up surface.

pub mod active;
pub mod client;
pub mod core;
pub mod engine;
pub mod item_set;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use client::{default_cache_path, Client, ClientBuilder, BASE_URL};
pub use item_set::ItemSet;
pub use types::*;

/// Result alias used by the public simmer API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
