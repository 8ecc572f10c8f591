//! Hybrid RSA-OAEP / AES-256-GCM envelope
//!
//! Layout: `RSA-OAEP(SHA-256)(aes_key) || nonce(12) || AES-GCM(ciphertext || tag)`.
//! The wrapped key is exactly the RSA modulus size, so the receiver splits
//! on its own key size.

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::protocol::{AES_KEY_LEN, NONCE_LEN};

/// Seal `plaintext` under a fresh AES key wrapped for `public_key`
pub fn hybrid_encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aes_key = Aes256Gcm::generate_key(&mut OsRng);
    let cipher = Aes256Gcm::new(&aes_key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal failed: {}", e)))?;

    let wrapped_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), aes_key.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP key wrap failed: {}", e)))?;

    let mut out = Vec::with_capacity(wrapped_key.len() + NONCE_LEN + sealed.len());
    out.extend_from_slice(&wrapped_key);
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open an envelope produced by [`hybrid_encrypt`]
///
/// Any failure (short input, wrong key, tampered bytes) is reported as
/// [`CryptoError::Decryption`]; no partial plaintext is ever returned.
pub fn hybrid_decrypt(private_key: &RsaPrivateKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key_len = private_key.size();
    if blob.len() < key_len + NONCE_LEN {
        return Err(CryptoError::Decryption(format!(
            "payload of {} bytes is shorter than the envelope header",
            blob.len()
        )));
    }

    let (wrapped_key, rest) = blob.split_at(key_len);
    let aes_key = private_key
        .decrypt(Oaep::new::<Sha256>(), wrapped_key)
        .map_err(|_| CryptoError::Decryption("RSA-OAEP key unwrap failed".to_string()))?;
    if aes_key.len() != AES_KEY_LEN {
        return Err(CryptoError::Decryption(format!(
            "unwrapped key has {} bytes",
            aes_key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(&aes_key)
        .map_err(|_| CryptoError::Decryption("invalid AES key".to_string()))?;
    let (nonce, sealed) = rest.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption("AES-GCM authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_keypair;
    use std::sync::OnceLock;

    fn test_keys() -> &'static (RsaPrivateKey, RsaPublicKey) {
        static KEYS: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
        KEYS.get_or_init(|| generate_keypair(1024).unwrap())
    }

    #[test]
    fn test_roundtrip() {
        let (private, public) = test_keys();
        let blob = hybrid_encrypt(public, b"compressed batch").unwrap();
        assert_eq!(hybrid_decrypt(private, &blob).unwrap(), b"compressed batch");
    }

    #[test]
    fn test_layout() {
        let (_, public) = test_keys();
        let blob = hybrid_encrypt(public, &[1u8; 10]).unwrap();
        // wrapped key + nonce + plaintext + 16-byte tag
        assert_eq!(blob.len(), public.size() + NONCE_LEN + 10 + 16);
    }

    #[test]
    fn test_fresh_key_per_message() {
        let (_, public) = test_keys();
        let a = hybrid_encrypt(public, b"same").unwrap();
        let b = hybrid_encrypt(public, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let (private, public) = test_keys();
        let mut blob = hybrid_encrypt(public, b"compressed batch").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            hybrid_decrypt(private, &blob),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_short_input_fails_closed() {
        let (private, _) = test_keys();
        assert!(matches!(
            hybrid_decrypt(private, b"short"),
            Err(CryptoError::Decryption(_))
        ));
    }
}
