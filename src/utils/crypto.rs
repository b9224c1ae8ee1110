//! Digests and symmetric encryption for the hash, crypt and form directives.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{self, Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported algorithm `{0}`, use one of: md5, sha1, sha256, sha512, blake3")]
    UnsupportedAlgorithm(String),

    #[error("unsupported output format `{0}`, use one of: hex, base64")]
    UnsupportedEncoding(String),

    #[error("key must be 16, 24 or 32 bytes long, got {0}")]
    InvalidKey(usize),

    #[error("ciphertext is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("ciphertext could not be decrypted with the given key")]
    Cipher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Hex,
    Base64,
}

impl std::str::FromStr for Encoding {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            _ => Err(CryptoError::UnsupportedEncoding(s.to_owned())),
        }
    }
}

// ============================================================================
// Digests
// ============================================================================

pub fn digest(input: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Md5 => Md5::digest(input).to_vec(),
        HashAlgorithm::Sha1 => Sha1::digest(input).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(input).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(input).to_vec(),
        HashAlgorithm::Blake3 => blake3::hash(input).as_bytes().to_vec(),
    }
}

/// Hash `input` and encode the digest.
pub fn hash(input: &str, algorithm: HashAlgorithm, encoding: Encoding) -> String {
    let bytes = digest(input.as_bytes(), algorithm);
    match encoding {
        Encoding::Hex => hex::encode(bytes),
        Encoding::Base64 => STANDARD.encode(bytes),
    }
}

// ============================================================================
// AES-GCM
// ============================================================================

/// Encrypt `text` with the raw bytes of `key`.
///
/// Output is standard base64 of `nonce || ciphertext`.
pub fn encrypt(text: &str, key: &str) -> Result<String, CryptoError> {
    let nonce_and_ciphertext = match key.len() {
        16 => seal::<Aes128Gcm>(text, key.as_bytes())?,
        24 => seal::<Aes192Gcm>(text, key.as_bytes())?,
        32 => seal::<Aes256Gcm>(text, key.as_bytes())?,
        len => return Err(CryptoError::InvalidKey(len)),
    };
    Ok(STANDARD.encode(nonce_and_ciphertext))
}

/// Reverse [`encrypt`].
pub fn decrypt(encoded: &str, key: &str) -> Result<String, CryptoError> {
    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(CryptoError::InvalidKey(key.len()));
    }
    let data = STANDARD.decode(encoded.trim())?;
    if data.len() < NONCE_LEN {
        return Err(CryptoError::Cipher);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);

    let plain = match key.len() {
        16 => open::<Aes128Gcm>(nonce, ciphertext, key.as_bytes())?,
        24 => open::<Aes192Gcm>(nonce, ciphertext, key.as_bytes())?,
        _ => open::<Aes256Gcm>(nonce, ciphertext, key.as_bytes())?,
    };
    String::from_utf8(plain).map_err(|_| CryptoError::Cipher)
}

fn seal<C>(text: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, text.as_bytes())
        .map_err(|_| CryptoError::Cipher)?;

    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open<C>(nonce: &[u8], ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    cipher
        .decrypt(aead::Nonce::<C>::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Cipher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            hash("abc", HashAlgorithm::Md5, Encoding::Hex),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(
            hash("abc", HashAlgorithm::Sha1, Encoding::Hex),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_base64_output() {
        assert_eq!(
            hash("abc", HashAlgorithm::Md5, Encoding::Base64),
            "kAFQmDzST7DWlj99KOF/cg=="
        );
    }

    #[test]
    fn test_parse_algorithm_and_encoding() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
        assert_eq!("Base64".parse::<Encoding>().unwrap(), Encoding::Base64);
        assert!("binary".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_encrypt_then_decrypt_with_every_key_size() {
        for key in [
            "0123456789abcdef",
            "0123456789abcdef01234567",
            "0123456789abcdef0123456789abcdef",
        ] {
            let sealed = encrypt("secret text", key).unwrap();
            assert_ne!(sealed, "secret text");
            assert_eq!(decrypt(&sealed, key).unwrap(), "secret text");
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt("x", "0123456789abcdef").unwrap();
        assert!(matches!(
            decrypt(&sealed, "fedcba9876543210"),
            Err(CryptoError::Cipher)
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(encrypt("x", "short"), Err(CryptoError::InvalidKey(5))));
        assert!(matches!(
            decrypt("AAAA", "0123456789abcdef0123"),
            Err(CryptoError::InvalidKey(20))
        ));
    }
}
