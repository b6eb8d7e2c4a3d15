//! Core types and engines for the Queuecast wait-time service.
//!
//! No HTTP or database dependencies live here.
//! Upstream feeds enter through [`provider::ProviderAdapter`]; historical
//! samples are kept behind [`history::HistoryStore`], implemented here by
//! [`memory::MemoryHistoryStore`] and by `queuecast-store-sqlite`.

// `HistoryStore` impls are written with `async fn`; the trait itself
// declares the `Send` futures.
#![allow(async_fn_in_trait)]

pub mod aggregator;
pub mod attraction;
pub mod baseline;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod history;
pub mod memory;
pub mod nudge;
pub mod opportunity;
pub mod persist;
pub mod provider;
pub mod snapshot;

pub use error::{Error, Result};
