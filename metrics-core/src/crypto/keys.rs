//! RSA key files: bootstrap, generation and loading

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::CryptoError;

/// File name of the PKCS#1 private key written by [`ensure_keypair`]
pub const PRIVATE_KEY_FILE: &str = "private.pem";
/// File name of the PKIX public key written by [`ensure_keypair`]
pub const PUBLIC_KEY_FILE: &str = "public.pem";
/// Modulus size of bootstrapped keypairs
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Generate a fresh keypair with a `bits`-sized modulus
pub fn generate_keypair(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey), CryptoError> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

fn key_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Make sure a keypair exists next to `path`
///
/// When `private.pem` is absent from the directory containing `path`, the
/// directory is created and a [`DEFAULT_KEY_BITS`] keypair is written.
/// Returns `true` if a keypair was generated. An empty path is a no-op.
pub fn ensure_keypair(path: &Path) -> Result<bool, CryptoError> {
    ensure_keypair_with_bits(path, DEFAULT_KEY_BITS)
}

/// [`ensure_keypair`] with an explicit modulus size
pub fn ensure_keypair_with_bits(path: &Path, bits: usize) -> Result<bool, CryptoError> {
    if path.as_os_str().is_empty() {
        return Ok(false);
    }

    let dir = key_dir(path);
    let private_path = dir.join(PRIVATE_KEY_FILE);
    if private_path.exists() {
        return Ok(false);
    }

    fs::create_dir_all(&dir)?;
    let (private, public) = generate_keypair(bits)?;

    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    write_pem(&private_path, private_pem.as_bytes(), 0o600)?;
    write_pem(&dir.join(PUBLIC_KEY_FILE), public_pem.as_bytes(), 0o644)?;

    info!("Generated {}-bit RSA keypair in {}", bits, dir.display());
    Ok(true)
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn write_pem(path: &Path, contents: &[u8], mode: u32) -> Result<(), CryptoError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// Load a private key, PKCS#1 first and PKCS#8 as a fallback
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, CryptoError> {
    let pem = fs::read_to_string(path)?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| CryptoError::InvalidKey(format!("{}: {}", path.display(), e)))
}

/// Load a PKIX ("PUBLIC KEY") public key
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, CryptoError> {
    let pem = fs::read_to_string(path)?;
    RsaPublicKey::from_public_key_pem(&pem)
        .map_err(|e| CryptoError::InvalidKey(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_path_is_noop() {
        assert!(!ensure_keypair(Path::new("")).unwrap());
    }

    #[test]
    fn test_missing_key_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_public_key(&dir.path().join("absent.pem")),
            Err(CryptoError::Io(_))
        ));
    }

    #[test]
    fn test_garbage_key_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("private.pem");
        fs::write(&path, "-----BEGIN NOTHING-----\n").unwrap();
        assert!(matches!(
            load_private_key(&path),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
