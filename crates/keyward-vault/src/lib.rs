//! # Keyward Vault
//!
//! Key generation, bulk payload encryption, key wrapping, and key custody.
//!
//! ## Overview
//!
//! The vault implements the cryptographic core of key delivery. Every asset
//! is encrypted under its own fresh content key; the content key is held in
//! custody server side and released to a device only in wrapped form, bound
//! to that device's public key.
//!
//! ## Key Concepts
//!
//! - **ContentKey**: A symmetric key (ChaCha20-Poly1305) that encrypts one asset
//! - **Device identity**: An X25519 keypair; the private half leaves the server
//!   exactly once, at registration
//! - **WrappedKey**: A content key encrypted to a single device via ephemeral
//!   X25519 ECDH
//! - **KeyCustody**: Durable storage for content keys, sealed at rest
//!
//! ## Encryption Model
//!
//! Bulk payloads are encrypted in bounded chunks, each authenticated and
//! pinned to its position in the stream, so tampering, reordering, and
//! truncation all fail decryption outright.
//!
//! Wrapping uses an ephemeral keypair per wrap:
//!
//! 1. Ephemeral X25519 ECDH against the device public key
//! 2. Wrap key derived from the shared secret, bound to both public keys
//! 3. Content key encrypted under the wrap key
//!
//! Only the holder of the device private key can recover the content key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_vault::{
//!     ContentKey, DirCustody, CustodySecret, KeyCustody,
//!     encrypt_stream, wrap_for_device, DEFAULT_CHUNK_SIZE,
//! };
//!
//! // Encrypt an asset
//! // let key = ContentKey::generate();
//! // encrypt_stream(&key, source, sink, DEFAULT_CHUNK_SIZE)?;
//!
//! // Hold the key in custody
//! // custody.put(&key).await?;
//!
//! // Release it to a device
//! // let wrapped = wrap_for_device(&key, &device.public_key);
//! ```

pub mod bulk;
pub mod custody;
pub mod error;
pub mod keys;
pub mod wrap;

pub use bulk::{decrypt_stream, encrypt_stream, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use custody::{CustodySecret, DirCustody, KeyCustody, MemoryCustody};
pub use error::{Result, VaultError};
pub use keys::{
    generate_device_identity, ContentKey, DevicePrivateKey, EncryptionNonce, SharedKey,
};
pub use wrap::{unwrap_with_device, wrap_for_device, WrappedKey, WRAPPED_KEY_LEN};
