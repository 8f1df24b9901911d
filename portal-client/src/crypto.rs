//! Cryptographic primitives for Clipboard Portal.
//!
//! This module provides:
//! - [`Identity`]: the long-term X25519 keypair of this installation
//! - [`CryptoSession`]: per-friend key derivation plus seal/open
//!
//! # Security Notes
//!
//! - Pair key = HKDF-SHA256(X25519(ours, theirs), salt = app constant, info = "")
//! - ChaCha20-Poly1305 with a random 96-bit nonce per message; the output is
//!   `nonce || ciphertext || tag`
//! - Only the two holders of the matching private keys can derive the pair
//!   key, so a successful open also authenticates the sender

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use clipportal_types::{PublicKeyBytes, PUBLIC_KEY_SIZE};
use hkdf::Hkdf;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size.
pub const TAG_SIZE: usize = 16;

/// Salt for the pair-key HKDF. Shared with every other client of the relay.
pub const KEY_DERIVATION_SALT: &[u8] = b"de.pschwind.ClipboardPortal";

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The tag did not verify: tampering or the wrong key.
    #[error("The received encrypted data is invalid (authentication). It might have been tampered with.")]
    AuthenticationFailed,

    /// Too short to hold a nonce and a tag.
    #[error("The received encrypted data is invalid (malformed, {len} bytes). It might have been tampered with.")]
    MalformedCiphertext {
        /// Length of the rejected input.
        len: usize,
    },

    /// The peer key produced a non-contributory shared secret.
    #[error("invalid peer public key")]
    InvalidPeerKey,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

/// The long-term keypair of this installation.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild from stored private key bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Private key bytes, for writing to the secure store only.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Our public key, as handed to the relay and to friends.
    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes::new(*self.public.as_bytes())
    }
}

// Don't leak secret in debug output
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_key())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A derived per-pair key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Seals and opens messages between us and one peer at a time.
#[derive(Debug, Clone)]
pub struct CryptoSession {
    identity: Arc<Identity>,
}

impl CryptoSession {
    /// Create a session over our identity.
    pub fn new(identity: Arc<Identity>) -> Self {
        Self { identity }
    }

    /// Our identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Derive the pair key shared with `peer`.
    pub fn shared_secret(&self, peer: &PublicKeyBytes) -> Result<SymmetricKey, CryptoError> {
        let peer_key: [u8; PUBLIC_KEY_SIZE] = *peer.as_bytes();
        let shared = self
            .identity
            .secret
            .diffie_hellman(&PublicKey::from(peer_key));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPeerKey);
        }

        let hkdf = Hkdf::<Sha256>::new(Some(KEY_DERIVATION_SALT), shared.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(&[], &mut key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        Ok(SymmetricKey(key))
    }

    /// Encrypt `plaintext` for `peer`.
    ///
    /// Returns `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8], peer: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError> {
        let key = self.shared_secret(peer)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed("aead encrypt failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt and authenticate a message from `peer`.
    pub fn open(&self, sealed: &[u8], peer: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedCiphertext { len: sealed.len() });
        }
        let key = self.shared_secret(peer)?;

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}
