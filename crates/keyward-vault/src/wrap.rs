//! Per-device key wrapping via X25519 key agreement.
//!
//! A content key is never delivered in the clear: on every grant it is
//! re-wrapped under the requesting device's public key. The wrap is
//! one-shot ECIES: ephemeral X25519 agreement, a Blake3-derived wrap key
//! bound to both public keys, then ChaCha20-Poly1305 over the 32-byte
//! content key. Only the holder of the device private key can unwrap.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use keyward_core::DevicePublicKey;

use crate::error::{Result, VaultError};
use crate::keys::{ContentKey, DevicePrivateKey, EncryptionNonce, EphemeralKeyPair};

/// Wire size of a wrapped key: ephemeral public (32) + nonce (12) +
/// ciphertext with tag (48).
pub const WRAPPED_KEY_LEN: usize = 32 + 12 + 48;

/// A content key wrapped for one device.
///
/// Single-use and device-bound: a fresh wrap is produced per grant, and a
/// wrap for one device is useless to every other device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: DevicePublicKey,

    /// Nonce used for the wrap.
    pub nonce: EncryptionNonce,

    /// The content key, encrypted with the derived wrap key (includes tag).
    pub encrypted_key: Vec<u8>,
}

impl WrappedKey {
    /// Serialize to the fixed wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WRAPPED_KEY_LEN);
        buf.extend_from_slice(&self.ephemeral_public.0);
        buf.extend_from_slice(&self.nonce.0);
        buf.extend_from_slice(&self.encrypted_key);
        buf
    }

    /// Parse from the fixed wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != WRAPPED_KEY_LEN {
            return Err(VaultError::CryptoFailure(format!(
                "wrapped key must be {} bytes, got {}",
                WRAPPED_KEY_LEN,
                bytes.len()
            )));
        }

        let mut ephemeral = [0u8; 32];
        ephemeral.copy_from_slice(&bytes[..32]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[32..44]);

        Ok(Self {
            ephemeral_public: DevicePublicKey(ephemeral),
            nonce: EncryptionNonce(nonce),
            encrypted_key: bytes[44..].to_vec(),
        })
    }

    /// Encode as base64 text, safe for JSON and URLs.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Parse from base64 text.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| VaultError::CryptoFailure(format!("invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Wrap a content key for one device.
pub fn wrap_for_device(key: &ContentKey, device_public: &DevicePublicKey) -> WrappedKey {
    // Generate ephemeral key pair
    let ephemeral = EphemeralKeyPair::generate();
    let ephemeral_public = ephemeral.public_key();

    // Derive shared secret
    let shared = ephemeral.diffie_hellman(device_public);

    // Bind the wrap key to both public keys
    let mut context = Vec::with_capacity(64);
    context.extend_from_slice(&ephemeral_public.0);
    context.extend_from_slice(&device_public.0);
    let wrap_key = shared.derive_wrap_key(&context);

    // Encrypt the content key
    let nonce = EncryptionNonce::generate();
    let encrypted_key = wrap_key
        .encrypt(key.as_bytes(), &nonce)
        .expect("encryption should not fail with valid key");

    WrappedKey {
        ephemeral_public,
        nonce,
        encrypted_key,
    }
}

/// Unwrap a content key with the device's private key.
///
/// The client-side inverse of [`wrap_for_device`]; the serve path never
/// calls this.
pub fn unwrap_with_device(
    wrapped: &WrappedKey,
    device_secret: &DevicePrivateKey,
) -> Result<ContentKey> {
    // Derive shared secret from the sender's ephemeral public
    let shared = device_secret.diffie_hellman(&wrapped.ephemeral_public);

    // Re-derive the wrap key with the same binding
    let mut context = Vec::with_capacity(64);
    context.extend_from_slice(&wrapped.ephemeral_public.0);
    context.extend_from_slice(&device_secret.public_key().0);
    let wrap_key = shared.derive_wrap_key(&context);

    // Decrypt the content key
    let key_bytes = wrap_key.decrypt(&wrapped.encrypted_key, &wrapped.nonce)?;

    if key_bytes.len() != 32 {
        return Err(VaultError::CryptoFailure(format!(
            "invalid key length: expected 32, got {}",
            key_bytes.len()
        )));
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&key_bytes);
    Ok(ContentKey::from_bytes(arr))
}
