//! Sensitive value encryption: AES-256-GCM behind the `Cipher` trait

use crate::ports::Cipher;
use crate::{Result, SentinelError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive a 256-bit encryption key from a password using Argon2
fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let argon2 = Argon2::default();
    let salt_string = SaltString::encode_b64(salt)
        .map_err(|e| SentinelError::cipher(format!("Failed to encode salt: {}", e)))?;

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt_string)
        .map_err(|e| SentinelError::cipher(format!("Failed to derive key: {}", e)))?;

    let hash_output = password_hash
        .hash
        .ok_or_else(|| SentinelError::cipher("No hash produced"))?;
    let hash_bytes = hash_output.as_bytes();

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);
    Ok(key)
}

/// AES-256-GCM cipher keyed by a password
///
/// Ciphertext layout: base64(salt(16) || nonce(12) || ciphertext). Both the
/// salt and the nonce are random per encryption, so identical plaintexts
/// produce distinct ciphertexts.
pub struct AesGcmCipher {
    key: String,
}

impl AesGcmCipher {
    /// New cipher with the given key material
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        if key.len() < 32 {
            tracing::warn!("Cipher key is shorter than 32 characters");
        }
        Self { key }
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, value: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let derived_key = derive_key(&self.key, &salt)?;
        let cipher = Aes256Gcm::new(&derived_key.into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| SentinelError::cipher(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&salt);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&result))
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        let decoded = BASE64
            .decode(encrypted)
            .map_err(|e| SentinelError::cipher(format!("Failed to decode base64: {}", e)))?;

        if decoded.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(SentinelError::cipher("Invalid encrypted data: too short"));
        }

        let salt = &decoded[0..SALT_LEN];
        let nonce_bytes = &decoded[SALT_LEN..SALT_LEN + NONCE_LEN];
        let ciphertext = &decoded[SALT_LEN + NONCE_LEN..];

        let derived_key = derive_key(&self.key, salt)?;
        let cipher = Aes256Gcm::new(&derived_key.into());
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SentinelError::cipher(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| SentinelError::cipher(format!("Invalid UTF-8 in decrypted data: {}", e)))
    }

    fn is_encrypted(&self, value: &str) -> bool {
        if value.len() < 4 || value.contains(char::is_whitespace) {
            return false;
        }
        match BASE64.decode(value) {
            Ok(decoded) => decoded.len() >= SALT_LEN + NONCE_LEN + TAG_LEN,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::new("a-test-key-of-at-least-32-characters")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let c = cipher();
        let plaintext = "Contact: john@example.com";
        let encrypted = c.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_randomized() {
        let c = cipher();
        let e1 = c.encrypt("same value").unwrap();
        let e2 = c.encrypt("same value").unwrap();
        assert_ne!(e1, e2);
        assert_eq!(c.decrypt(&e1).unwrap(), "same value");
        assert_eq!(c.decrypt(&e2).unwrap(), "same value");
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let encrypted = cipher().encrypt("secret").unwrap();
        let wrong = AesGcmCipher::new("another-key-that-is-also-32-chars!!");
        assert!(wrong.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_decrypt_invalid_data() {
        let c = cipher();
        assert!(c.decrypt("dGVzdA==").is_err());
        assert!(c.decrypt("not-valid-base64!!!").is_err());
    }

    #[test]
    fn test_is_encrypted_probe() {
        let c = cipher();
        let encrypted = c.encrypt("probe me").unwrap();
        assert!(c.is_encrypted(&encrypted));
        assert!(!c.is_encrypted("plain text with spaces"));
        assert!(!c.is_encrypted("short"));
        assert!(!c.is_encrypted(""));
    }

    #[test]
    fn test_unicode_roundtrip() {
        let c = cipher();
        let plaintext = "téléphone 06 11 22 33 44 / 東京";
        let encrypted = c.encrypt(plaintext).unwrap();
        assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
    }
}
