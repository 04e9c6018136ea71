//! Relational table stores with soft-delete queue semantics.
//!
//! [`TableStore`] turns one table of a shared [`Database`] into a FIFO, LIFO
//! or score-ordered queue whose consumed rows are tombstoned rather than
//! removed, so a crawl can pick up exactly where it stopped.

pub mod error;
pub mod poll;
pub mod pool;
pub mod schema;
pub mod table;

pub use error::StorageError;
pub use pool::Database;
pub use schema::{Dialect, TableSchema};
pub use table::{NewRow, Order, Row, TableStore, DEFAULT_POLL_INTERVAL};
