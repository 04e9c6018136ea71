//! Encode/decode transforms between [`Request`] and the stored `key` string.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CodecError, ConfigError};
use crate::request::Request;

/// A reversible request <-> string transform.
///
/// Queue ordering never depends on the encoded form, so any implementation
/// that round-trips a [`Request`] can be swapped in.
pub trait RequestCodec: Send + Sync {
    fn encode(&self, request: &Request) -> Result<String, CodecError>;
    fn decode(&self, encoded: &str) -> Result<Request, CodecError>;
}

/// Plain JSON. Readable in the database, larger on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RequestCodec for JsonCodec {
    fn encode(&self, request: &Request) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }

    fn decode(&self, encoded: &str) -> Result<Request, CodecError> {
        Ok(serde_json::from_str(encoded)?)
    }
}

/// MessagePack, hex-wrapped so it fits a text column.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl RequestCodec for MsgpackCodec {
    fn encode(&self, request: &Request) -> Result<String, CodecError> {
        let bytes = rmp_serde::to_vec_named(request)?;
        Ok(hex::encode(bytes))
    }

    fn decode(&self, encoded: &str) -> Result<Request, CodecError> {
        let bytes = hex::decode(encoded)?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }
}

/// Serializer names accepted by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Json,
    Msgpack,
}

impl CodecKind {
    pub fn build(self) -> Arc<dyn RequestCodec> {
        match self {
            CodecKind::Json => Arc::new(JsonCodec),
            CodecKind::Msgpack => Arc::new(MsgpackCodec),
        }
    }
}

impl FromStr for CodecKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CodecKind::Json),
            "msgpack" | "messagepack" | "rmp" => Ok(CodecKind::Msgpack),
            _ => Err(ConfigError::UnknownSerializer(s.to_string())),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::Json => write!(f, "json"),
            CodecKind::Msgpack => write!(f, "msgpack"),
        }
    }
}
