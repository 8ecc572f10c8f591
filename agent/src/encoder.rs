//! Batch encoding for the wire
//!
//! JSON, then gzip, then an optional HMAC over the compressed bytes, then
//! optional hybrid encryption. The collector undoes the layers in reverse.

use metrics_core::crypto::{hybrid_encrypt, sign, RsaPublicKey};
use metrics_core::{codec, MetricRecord};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// A batch ready to be POSTed
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub body: Vec<u8>,
    /// Hex HMAC for the `HashSHA256` header
    pub hash: Option<String>,
    pub encrypted: bool,
}

pub struct BatchEncoder {
    key: String,
    public_key: Option<Arc<RsaPublicKey>>,
}

impl BatchEncoder {
    pub fn new(key: impl Into<String>, public_key: Option<Arc<RsaPublicKey>>) -> Self {
        Self {
            key: key.into(),
            public_key,
        }
    }

    /// Build from the configured key and public key path; empty values disable the layer
    pub fn from_config(key: &str, crypto_key: &str) -> Result<Self> {
        let public_key = if crypto_key.is_empty() {
            None
        } else {
            Some(Arc::new(metrics_core::crypto::load_public_key(Path::new(
                crypto_key,
            ))?))
        };
        Ok(Self::new(key, public_key))
    }

    pub fn encode(&self, records: &[MetricRecord]) -> Result<EncodedBatch> {
        let json = serde_json::to_vec(records)?;
        let compressed = codec::compress(&json)?;
        let hash = sign(&compressed, &self.key);

        let (body, encrypted) = match &self.public_key {
            Some(public_key) => (hybrid_encrypt(public_key, &compressed)?, true),
            None => (compressed, false),
        };

        Ok(EncodedBatch {
            body,
            hash,
            encrypted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_core::crypto::{generate_keypair, hybrid_decrypt, verify};

    fn batch() -> Vec<MetricRecord> {
        vec![
            MetricRecord::gauge("RandomValue", 0.25),
            MetricRecord::counter("PollCount", 4),
        ]
    }

    #[test]
    fn test_plain_encoding() {
        let encoded = BatchEncoder::new("", None).encode(&batch()).unwrap();
        assert!(encoded.hash.is_none());
        assert!(!encoded.encrypted);

        let json = codec::decompress(&encoded.body).unwrap();
        let decoded: Vec<MetricRecord> = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, batch());
    }

    #[test]
    fn test_signed_and_encrypted() {
        let (private_key, public_key) = generate_keypair(1024).unwrap();
        let encoder = BatchEncoder::new("secret", Some(Arc::new(public_key)));
        let encoded = encoder.encode(&batch()).unwrap();
        assert!(encoded.encrypted);

        let compressed = hybrid_decrypt(&private_key, &encoded.body).unwrap();
        verify(&compressed, "secret", encoded.hash.as_deref().unwrap()).unwrap();
        let decoded: Vec<MetricRecord> =
            serde_json::from_slice(&codec::decompress(&compressed).unwrap()).unwrap();
        assert_eq!(decoded, batch());
    }

    #[test]
    fn test_missing_public_key_file() {
        assert!(BatchEncoder::from_config("", "/nonexistent/public.pem").is_err());
    }
}
