use thiserror::Error;

/// Configuration problems. Raised at construction/open time and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} cannot be negative")]
    Negative(String),

    #[error("{0} must not be empty")]
    Empty(String),

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("invalid table name {0:?}: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidTableName(String),

    #[error("key {0} not found in table schemas")]
    UnknownSchema(String),

    #[error("unknown queue class: {0}")]
    UnknownQueueClass(String),

    #[error("unknown dupefilter class: {0}")]
    UnknownDupeFilterClass(String),

    #[error("unknown serializer: {0} (expected \"json\" or \"msgpack\")")]
    UnknownSerializer(String),

    #[error("unsupported database url: {0}")]
    UnsupportedDatabase(String),
}

impl ConfigError {
    pub fn invalid(key: &str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures while turning a request into its stored form or back.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}
