use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Error type for secret codec operations.
///
/// Messages never include plaintext, key material or derived key bytes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Encryption failed")]
    Encrypt,
    #[error("Secret could not be authenticated (wrong key or tampered data)")]
    Authentication,
    #[error("Malformed secret blob: {0}")]
    Format(String),
}

/// Derive the 256-bit cipher key from the caller's raw key bytes.
fn derive_key(key: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(key.as_bytes());
    *Key::<Aes256Gcm>::from_slice(digest.as_slice())
}

/// Encrypt `plaintext` under `key`, returning base64(`nonce ‖ ciphertext ‖ tag`).
///
/// A fresh random nonce is drawn for every call, so encrypting the same
/// plaintext twice yields different blobs.
pub fn encrypt(plaintext: &str, key: &str) -> Result<String, CodecError> {
    let cipher = Aes256Gcm::new(&derive_key(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CodecError::Encrypt)?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(nonce.as_slice());
    combined.extend_from_slice(&ciphertext);

    Ok(B64.encode(combined))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Fails with [`CodecError::Format`] when the blob cannot be decoded or is too
/// short to hold a nonce and tag, and with [`CodecError::Authentication`] when
/// the tag does not verify.
pub fn decrypt(blob: &str, key: &str) -> Result<String, CodecError> {
    let combined = B64
        .decode(blob.trim())
        .map_err(|e| CodecError::Format(format!("invalid base64: {}", e)))?;

    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(CodecError::Format(format!(
            "blob is {} bytes, expected at least {}",
            combined.len(),
            NONCE_LEN + TAG_LEN
        )));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&derive_key(key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CodecError::Authentication)?;

    String::from_utf8(plaintext)
        .map_err(|_| CodecError::Format("decrypted secret is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "correct horse battery staple";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let long = "x".repeat(4096);
        for plaintext in ["hf_abcdefghijklmnop", "", "Grüße, 世界 🔐", long.as_str()] {
            let blob = encrypt(plaintext, KEY).unwrap();
            assert_eq!(decrypt(&blob, KEY).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_key_of_any_length_is_accepted() {
        let long = "long key material ".repeat(20);
        for key in ["", "k", long.as_str()] {
            let blob = encrypt("token", key).unwrap();
            assert_eq!(decrypt(&blob, key).unwrap(), "token");
        }
    }

    #[test]
    fn test_encrypt_produces_unique_blobs() {
        let first = encrypt("same input", KEY).unwrap();
        let second = encrypt("same input", KEY).unwrap();
        assert_ne!(first, second);

        let first_raw = B64.decode(&first).unwrap();
        let second_raw = B64.decode(&second).unwrap();
        assert_ne!(first_raw[..NONCE_LEN], second_raw[..NONCE_LEN]);
    }

    #[test]
    fn test_blob_layout_is_nonce_ciphertext_tag() {
        let blob = encrypt("abc", KEY).unwrap();
        let raw = B64.decode(blob).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn test_tampered_byte_fails_authentication() {
        let blob = encrypt("secret token value", KEY).unwrap();
        let raw = B64.decode(&blob).unwrap();

        for index in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[index] ^= 0x01;
            let result = decrypt(&B64.encode(&tampered), KEY);
            assert!(
                matches!(result, Err(CodecError::Authentication)),
                "byte {} flip was not detected",
                index
            );
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let blob = encrypt("secret", KEY).unwrap();
        assert!(matches!(
            decrypt(&blob, "another key"),
            Err(CodecError::Authentication)
        ));
    }

    #[test]
    fn test_invalid_base64_is_format_error() {
        assert!(matches!(
            decrypt("not base64 at all!!", KEY),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_short_blob_is_format_error() {
        let short = B64.encode([0u8; NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(decrypt(&short, KEY), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_errors_do_not_leak_plaintext() {
        let blob = encrypt("do-not-print-me", KEY).unwrap();
        let err = decrypt(&blob, "wrong").unwrap_err();
        assert!(!err.to_string().contains("do-not-print-me"));
        assert!(!format!("{:?}", err).contains("do-not-print-me"));
    }
}
