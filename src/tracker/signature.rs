//! Webhook signature verification.
//!
//! LINE signs every webhook body with HMAC-SHA256 keyed by the channel
//! secret and sends the base64 digest in `X-Line-Signature`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Header is not valid base64.
    Malformed,
    /// Digest does not match the body.
    Mismatch,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::Malformed => write!(f, "malformed signature header"),
            SignatureError::Mismatch => write!(f, "signature mismatch"),
        }
    }
}

impl std::error::Error for SignatureError {}

fn mac(channel_secret: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(channel_secret.as_bytes()).expect("HMAC key length");
    mac.update(body);
    mac
}

/// Base64 signature of `body`, as LINE would send it.
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    BASE64.encode(mac(channel_secret, body).finalize().into_bytes())
}

/// Check `signature` against `body`. Comparison is constant-time.
pub fn verify(channel_secret: &str, body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let expected = BASE64
        .decode(signature.trim())
        .map_err(|_| SignatureError::Malformed)?;
    mac(channel_secret, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
