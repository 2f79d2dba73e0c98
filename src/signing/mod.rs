//! Akamai G2O request signing
//!
//! The legacy upload protocol authenticates each request with an HMAC over
//! the auth-data header, the encoded request path and the action string.

pub mod action;
pub mod g2o;

pub use action::{ActionBuilder, ActionKind, API_VERSION};
pub use g2o::{sign, G2oVersion, SignedHeaders, SigningContext};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left untouched in request paths: alphanumerics plus `/ _ . -`.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'_')
    .remove(b'.')
    .remove(b'-');

/// Percent-encode a request path. The same string goes on the request line
/// and into the signature.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE_SET).to_string()
}
