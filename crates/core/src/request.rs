//! The unit of work that flows through queues and the duplicate filter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A pending crawl request.
///
/// Everything a downloader needs to replay the request after a restart is
/// carried here, including the names of the spider callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Header name -> values, in insertion-independent order.
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(default, with = "hex_bytes")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub errback: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Bypass the duplicate filter for this request.
    #[serde(default)]
    pub dont_filter: bool,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub flags: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            callback: None,
            errback: None,
            priority: 0,
            dont_filter: false,
            meta: Map::new(),
            flags: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_errback(mut self, errback: impl Into<String>) -> Self {
        self.errback = Some(errback.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dont_filter(mut self, dont_filter: bool) -> Self {
        self.dont_filter = dont_filter;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.method, self.url)
    }
}

/// Serialize raw bytes as a hex string so textual encodings stay compact.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
