//! Secret-at-rest encryption for sensitive payloads, such as the free-text answers collected in
//! ticket channels.
//!
//! AES-256-GCM with a random 12-byte nonce and the 16-byte authentication tag, packed as
//! `nonce ∥ tag ∥ ciphertext` and base64url-encoded. The key is derived from the configured key
//! material: if it base64-decodes to at least 32 bytes, the first 32 bytes are the key
//! (pre-generated key); otherwise the key is the SHA-256 of the raw material (passphrase).

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Any failure in sealing or opening a secret. Deliberately carries no detail: decryption
/// failures must be indistinguishable to callers.
#[derive(Debug, Clone, Error)]
#[error("The secret payload could not be processed.")]
pub struct SecretPayloadError;

#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; KEY_LEN],
}

impl SecretCipher {
    pub fn from_key_material(material: &str) -> Self {
        let key = match base64::decode(material.trim()) {
            Ok(bytes) if bytes.len() >= KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes[..KEY_LEN]);
                key
            },
            _ => Sha256::digest(material.as_bytes()).into(),
        };
        Self { key }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<String, SecretPayloadError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| SecretPayloadError)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        // aes-gcm appends the tag to the ciphertext; repack as nonce || tag || ciphertext
        let sealed = cipher.encrypt(Nonce::from_slice(&nonce), plaintext).map_err(|_| SecretPayloadError)?;
        let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut packed = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(tag);
        packed.extend_from_slice(body);
        Ok(base64::encode_config(packed, base64::URL_SAFE_NO_PAD))
    }

    pub fn open(&self, packed: &str) -> Result<Vec<u8>, SecretPayloadError> {
        let bytes = base64::decode_config(packed, base64::URL_SAFE_NO_PAD).map_err(|_| SecretPayloadError)?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(SecretPayloadError);
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (tag, body) = rest.split_at(TAG_LEN);
        let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| SecretPayloadError)?;
        cipher.decrypt(Nonce::from_slice(nonce), sealed.as_ref()).map_err(|_| SecretPayloadError)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = SecretCipher::from_key_material("a passphrase, not a key");
        let sealed = cipher.seal(b"sk_live_abc123").unwrap();
        assert_eq!(cipher.open(&sealed).unwrap(), b"sk_live_abc123");
    }

    #[test]
    fn nonces_are_random() {
        let cipher = SecretCipher::from_key_material("a passphrase");
        let a = cipher.seal(b"same plaintext").unwrap();
        let b = cipher.seal(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn any_tampered_byte_fails() {
        let cipher = SecretCipher::from_key_material("a passphrase");
        let sealed = cipher.seal(b"payload").unwrap();
        let mut bytes = base64::decode_config(&sealed, base64::URL_SAFE_NO_PAD).unwrap();
        for i in 0..bytes.len() {
            bytes[i] ^= 0x01;
            let tampered = base64::encode_config(&bytes, base64::URL_SAFE_NO_PAD);
            assert!(cipher.open(&tampered).is_err(), "tampered byte {i} was accepted");
            bytes[i] ^= 0x01;
        }
    }

    #[test]
    fn base64_key_material_uses_the_raw_key() {
        let key = [7u8; 32];
        let cipher_a = SecretCipher::from_key_material(&base64::encode(key));
        let cipher_b = SecretCipher::from_key_material(&base64::encode(key));
        let sealed = cipher_a.seal(b"shared").unwrap();
        assert_eq!(cipher_b.open(&sealed).unwrap(), b"shared");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = SecretCipher::from_key_material("key one").seal(b"payload").unwrap();
        assert!(SecretCipher::from_key_material("key two").open(&sealed).is_err());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let cipher = SecretCipher::from_key_material("a passphrase");
        assert!(cipher.open("not base64 at all !!!").is_err());
        assert!(cipher.open("c2hvcnQ").is_err());
    }
}
