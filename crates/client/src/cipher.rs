// ============================
// crates/client/src/cipher.rs
// ============================
//! Scene encryption with the room key.
//!
//! The room key is 16 random bytes carried in share links as unpadded
//! base64url. Every encryption draws a fresh 12-byte IV; IV and ciphertext
//! travel as standard base64.
use crate::error::ClientError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::{rngs::OsRng, RngCore};

pub const ROOM_KEY_BYTES: usize = 16;
pub const IV_BYTES: usize = 12;

/// One encrypted payload, both halves base64
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: String,
    pub ciphertext: String,
}

#[derive(Clone)]
pub struct SceneCipher {
    cipher: Aes128Gcm,
}

impl std::fmt::Debug for SceneCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SceneCipher(..)")
    }
}

/// A fresh random room key in share-link form
pub fn generate_room_key() -> String {
    let mut key = [0u8; ROOM_KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    URL_SAFE_NO_PAD.encode(key)
}

impl SceneCipher {
    pub fn from_room_key(room_key: &str) -> Result<Self, ClientError> {
        let key = URL_SAFE_NO_PAD
            .decode(room_key)
            .map_err(|e| ClientError::Crypto(format!("room key is not base64url: {e}")))?;
        if key.len() != ROOM_KEY_BYTES {
            return Err(ClientError::Crypto(format!(
                "room key must be {ROOM_KEY_BYTES} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes128Gcm::new_from_slice(&key)
            .map_err(|e| ClientError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, ClientError> {
        let mut iv = [0u8; IV_BYTES];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| ClientError::Crypto(e.to_string()))?;
        Ok(Sealed {
            iv: STANDARD.encode(iv),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    pub fn decrypt(&self, iv: &str, ciphertext: &str) -> Result<Vec<u8>, ClientError> {
        let iv = STANDARD
            .decode(iv)
            .map_err(|e| ClientError::Crypto(format!("iv is not base64: {e}")))?;
        if iv.len() != IV_BYTES {
            return Err(ClientError::Crypto(format!(
                "iv must be {IV_BYTES} bytes, got {}",
                iv.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| ClientError::Crypto(format!("ciphertext is not base64: {e}")))?;

        // aead errors carry no detail
        self.cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| ClientError::Crypto("decryption failed".to_string()))
    }
}
