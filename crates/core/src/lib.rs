pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod request;

pub use codec::{CodecKind, JsonCodec, MsgpackCodec, RequestCodec};
pub use config::Config;
pub use error::*;
pub use fingerprint::{Fingerprinter, RequestFingerprinter};
pub use request::Request;
