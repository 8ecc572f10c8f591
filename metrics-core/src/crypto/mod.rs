//! Payload protection
//!
//! Two independent layers, both optional:
//! - HMAC-SHA256 signing with a shared key ([`signing`])
//! - hybrid RSA-OAEP / AES-256-GCM encryption with one keypair ([`hybrid`])
//!
//! Key files are bootstrapped and loaded through [`keys`].

pub mod hybrid;
pub mod keys;
pub mod signing;

pub use hybrid::{hybrid_decrypt, hybrid_encrypt};
pub use keys::{ensure_keypair, generate_keypair, load_private_key, load_public_key};
pub use signing::{sign, verify};

pub use rsa::{RsaPrivateKey, RsaPublicKey};
