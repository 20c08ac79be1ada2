//! Relay frame encryption
//!
//! Encrypted relay links seal every frame body with AES-256-GCM. The key is
//! derived from the configured passphrase and salt with PBKDF2-HMAC-SHA256,
//! so both ends only need to share the two strings.
//!
//! Sealed body layout:
//! ```text
//! +-----------+---------------------------+----------+
//! | Nonce(12) | Ciphertext(N)             | Tag(16)  |
//! +-----------+---------------------------+----------+
//! ```

use std::num::NonZeroU32;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::TransportError;

/// PBKDF2 iteration count for relay key derivation
pub const PBKDF2_ITERATIONS: u32 = 4096;

/// Bytes added to every sealed body (nonce + tag)
pub const SEAL_OVERHEAD: usize = NONCE_LEN + 16;

/// Relay encryption settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCrypto {
    /// Shared passphrase
    pub key: String,
    /// Shared salt
    pub salt: String,
}

impl RelayCrypto {
    pub fn new(key: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            salt: salt.into(),
        }
    }

    /// Encryption is only used when both key and salt are set
    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty() && !self.salt.is_empty()
    }
}

/// AES-256-GCM cipher for relay frames
pub struct RelayCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl RelayCipher {
    /// Derive a cipher from passphrase and salt
    pub fn new(key: &str, salt: &str) -> Result<Self, TransportError> {
        let mut derived = [0u8; 32];
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or(TransportError::Crypto("invalid iteration count"))?;
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt.as_bytes(),
            key.as_bytes(),
            &mut derived,
        );

        let unbound = UnboundKey::new(&AES_256_GCM, &derived)
            .map_err(|_| TransportError::Crypto("failed to create AES-256-GCM key"))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build a cipher from config, `None` when encryption is disabled
    pub fn from_config(crypto: &RelayCrypto) -> Result<Option<Self>, TransportError> {
        if !crypto.is_enabled() {
            return Ok(None);
        }
        Self::new(&crypto.key, &crypto.salt).map(Some)
    }

    /// Encrypt a frame body, prefixing a fresh random nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| TransportError::Crypto("system RNG failed to generate nonce"))?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| TransportError::Crypto("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Decrypt a sealed frame body
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, TransportError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(TransportError::Crypto("sealed frame too short"));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&sealed[..NONCE_LEN]);

        let mut in_out = sealed[NONCE_LEN..].to_vec();
        let plaintext = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| TransportError::Crypto("authentication failed"))?;

        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for RelayCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCipher").finish_non_exhaustive()
    }
}
