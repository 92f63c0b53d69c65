//! Content keys and device identities.
//!
//! Provides X25519 key agreement and the symmetric key material the vault
//! encrypts with. Secret types zero their memory on drop.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use keyward_core::{DevicePublicKey, KeyId};

use crate::error::{Result, VaultError};

/// Derivation context for key-id computation.
const KEY_ID_CONTEXT: &str = "keyward-vault-v1-key-id";

/// A 256-bit symmetric content key.
///
/// Generated fresh per asset, independent of any device material. Zeroed
/// on drop. The key never appears in logs or error messages; use [`id`]
/// when a reference to it must be recorded.
///
/// [`id`]: ContentKey::id
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the opaque custody handle for this key.
    ///
    /// A truncated domain-separated Blake3 of the key bytes. The handle is
    /// safe to store in content records and logs; it reveals nothing about
    /// the key.
    pub fn id(&self) -> KeyId {
        let mut hasher = blake3::Hasher::new_derive_key(KEY_ID_CONTEXT);
        hasher.update(&self.0);
        let digest = hasher.finalize();
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&digest.as_bytes()[..16]);
        KeyId(arr)
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentKey({})", self.id())
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// An X25519 device private key.
///
/// The secret half of a device identity. Returned to the client exactly
/// once at registration; the server keeps only the public half. Only for
/// key agreement, not signing.
pub struct DevicePrivateKey(StaticSecret);

impl DevicePrivateKey {
    /// Generate a new random private key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let secret = Self(StaticSecret::from(bytes));
        bytes.zeroize();
        secret
    }

    /// Create from raw bytes (e.g. restored from client-side storage).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get the raw bytes for client-side storage.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(arr))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> DevicePublicKey {
        DevicePublicKey(*PublicKey::from(&self.0).as_bytes())
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &DevicePublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&PublicKey::from(peer_public.0));
        SharedKey(*shared.as_bytes())
    }
}

impl std::fmt::Debug for DevicePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevicePrivateKey({:?})", self.public_key())
    }
}

/// Generate a fresh device identity.
///
/// The private half goes to the client once; the public half is what the
/// registry persists.
pub fn generate_device_identity() -> (DevicePrivateKey, DevicePublicKey) {
    let secret = DevicePrivateKey::generate();
    let public = secret.public_key();
    (secret, public)
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a wrap key from this shared secret.
    ///
    /// Blake3 derive-key for domain separation; the context binds the wrap
    /// to a specific sender/recipient pair.
    pub fn derive_wrap_key(&self, context: &[u8]) -> ContentKey {
        let mut hasher = blake3::Hasher::new_derive_key("keyward-vault-v1-wrap");
        hasher.update(&self.0);
        hasher.update(context);
        ContentKey(*hasher.finalize().as_bytes())
    }
}

/// Ephemeral key pair for one-time key agreement.
pub(crate) struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: DevicePublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub(crate) fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = DevicePublicKey(*PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Get the public key.
    pub(crate) fn public_key(&self) -> DevicePublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub(crate) fn diffie_hellman(self, peer_public: &DevicePublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public.0));
        SharedKey(*shared.as_bytes())
    }
}
