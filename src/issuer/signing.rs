//! HMAC-SHA256 request signing for the communication identity API.
//!
//! String to sign: `VERB\n<path-and-query>\n<x-ms-date>;<host>;<x-ms-content-sha256>`,
//! keyed with the decoded access key from the connection string.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::IssuerError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNED_HEADER_NAMES: &str = "x-ms-date;host;x-ms-content-sha256";

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub date: String,
    pub content_hash: String,
    pub authorization: String,
}

#[derive(Clone)]
pub struct HmacSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").field("key", &"<redacted>").finish()
    }
}

impl HmacSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn sign(
        &self,
        method: &str,
        path_and_query: &str,
        host: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, IssuerError> {
        let date = rfc1123(now);
        let content_hash = content_hash(body);
        let string_to_sign = format!("{}\n{}\n{};{};{}", method.to_ascii_uppercase(), path_and_query, date, host, content_hash);
        let signature = self.signature(&string_to_sign)?;
        Ok(SignedHeaders {
            authorization: format!("HMAC-SHA256 SignedHeaders={SIGNED_HEADER_NAMES}&Signature={signature}"),
            date,
            content_hash,
        })
    }

    fn signature(&self, string_to_sign: &str) -> Result<String, IssuerError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| IssuerError::Signing(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }
}

pub fn content_hash(body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(body))
}

/// `Tue, 03 Oct 2023 12:00:00 GMT`
pub fn rfc1123(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
