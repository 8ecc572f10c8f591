//! HMAC-SHA256 body signatures

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(key: &str) -> Result<HmacSha256, CryptoError> {
    // HMAC accepts keys of any length; the error branch is unreachable in practice
    HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::BadSignature)
}

/// Sign `payload`, returning lower-case hex. An empty key disables signing.
pub fn sign(payload: &[u8], key: &str) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    let mut mac = mac_for(key).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature in constant time
///
/// Undecodable hex, a wrong length and a wrong digest all yield
/// [`CryptoError::BadSignature`].
pub fn verify(payload: &[u8], key: &str, signature: &str) -> Result<(), CryptoError> {
    let expected = hex::decode(signature.trim()).map_err(|_| CryptoError::BadSignature)?;

    let mut mac = mac_for(key)?;
    mac.update(payload);
    let actual = mac.finalize().into_bytes();

    if actual.len() != expected.len() {
        return Err(CryptoError::BadSignature);
    }
    if bool::from(actual.as_slice().ct_eq(expected.as_slice())) {
        Ok(())
    } else {
        Err(CryptoError::BadSignature)
    }
}
