//! Request fingerprints used for duplicate detection.
//!
//! A fingerprint is an opaque, stable hex string. Storage layers compare
//! fingerprints as plain strings and never hash anything themselves.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use url::Url;

use crate::request::Request;

/// Maps a request to its duplicate-detection identity.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, request: &Request) -> String;
}

/// SHA-256 over method, canonical URL, body and an allow-list of headers.
#[derive(Debug, Clone, Default)]
pub struct RequestFingerprinter {
    include_headers: Vec<String>,
}

impl RequestFingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers (case-insensitive) whose values take part in the fingerprint.
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include_headers = headers
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        self
    }
}

impl Fingerprinter for RequestFingerprinter {
    fn fingerprint(&self, request: &Request) -> String {
        let mut headers: BTreeMap<String, &Vec<String>> = BTreeMap::new();
        for (name, values) in &request.headers {
            let lower = name.to_ascii_lowercase();
            if self.include_headers.contains(&lower) {
                headers.insert(lower, values);
            }
        }

        // serde_json maps are sorted, so this encoding is deterministic.
        let canonical = serde_json::json!({
            "method": request.method.to_ascii_uppercase(),
            "url": canonicalize_url(&request.url),
            "body": hex::encode(&request.body),
            "headers": headers,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        format!("{digest:x}")
    }
}

/// Drop the fragment and sort query pairs. Unparseable URLs are used verbatim.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(req: &Request) -> String {
        RequestFingerprinter::new().fingerprint(req)
    }

    #[test]
    fn same_request_same_fingerprint() {
        let a = Request::new("https://example.com");
        let b = Request::new("https://example.com");
        assert_eq!(fp(&a), fp(&b));
        assert_eq!(fp(&a).len(), 64);
    }

    #[test]
    fn method_and_url_change_fingerprint() {
        let base = Request::new("https://example.com");
        let post = Request::new("https://example.com").with_method("POST");
        let other = Request::new("https://example2.com");
        assert_ne!(fp(&base), fp(&post));
        assert_ne!(fp(&base), fp(&other));
    }

    #[test]
    fn query_order_and_fragment_are_ignored() {
        let a = Request::new("https://example.com/p?b=2&a=1#top");
        let b = Request::new("https://example.com/p?a=1&b=2");
        assert_eq!(fp(&a), fp(&b));
    }

    #[test]
    fn headers_only_count_when_listed() {
        let plain = Request::new("https://example.com");
        let with_lang = Request::new("https://example.com").with_header("Accept-Language", "de");
        assert_eq!(fp(&plain), fp(&with_lang));

        let fper = RequestFingerprinter::new().with_headers(["accept-language"]);
        assert_ne!(fper.fingerprint(&plain), fper.fingerprint(&with_lang));
    }

    #[test]
    fn canonicalize_keeps_unparseable_input() {
        assert_eq!(canonicalize_url("not a url"), "not a url");
        assert_eq!(canonicalize_url("https://example.com/?"), "https://example.com/");
    }
}
