//! SQLite backend for the Queuecast history store.
//!
//! Raw observations are appended to a log; three pre-aggregated tables hold
//! the per-bucket, per-hour and global medians and are rebuilt by
//! [`SqliteHistoryStore::refresh_baselines`]. All database access runs on
//! [`tokio_rusqlite`]'s dedicated thread.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{RefreshReport, SqliteHistoryStore};

#[cfg(test)]
mod tests;
