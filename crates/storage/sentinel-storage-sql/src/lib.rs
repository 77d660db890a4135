//! SQLite persistence for sentinel
//!
//! One adapter implements every store capability over a single pool, so an
//! event append and its audit or checkpoint writes share the same database
//! file and transaction semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod sqlite;

pub use sqlite::SqliteScanStore;
