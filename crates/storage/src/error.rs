use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Store-level failure (connection lost, table dropped underneath us).
    /// Passed through unchanged; nothing here reconnects or recreates schema.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crawlq_core::ConfigError),

    #[error("table {table} has no {column} column")]
    MissingColumn { table: String, column: &'static str },

    #[error("corrupt row {id} in {table}: {reason}")]
    CorruptRow { table: String, id: i64, reason: String },
}
