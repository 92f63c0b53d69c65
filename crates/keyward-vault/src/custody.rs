//! Custody backends for content keys.
//!
//! Content keys never touch disk in the clear. [`DirCustody`] seals each
//! key under a key derived from the custody secret and the key id, so a
//! leaked custody directory is useless without the secret and a record
//! cannot be silently swapped between key ids. [`MemoryCustody`] backs
//! tests and ephemeral deployments.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

use keyward_core::KeyId;

use crate::error::{Result, VaultError};
use crate::keys::{ContentKey, EncryptionNonce};

/// Derivation context for per-key sealing keys.
const CUSTODY_CONTEXT: &str = "keyward-custody-v1";

/// Sealed record length: nonce || ciphertext || tag.
const SEALED_KEY_LEN: usize = 12 + 32 + 16;

/// Root secret a custody directory is sealed under.
///
/// Operators persist this out of band; losing it makes every sealed key
/// unrecoverable.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CustodySecret([u8; 32]);

impl CustodySecret {
    /// Generate a fresh random custody secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        CustodySecret(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        CustodySecret(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Derive the sealing key for one custody record.
    fn sealing_key(&self, id: &KeyId) -> ContentKey {
        let mut hasher = blake3::Hasher::new_derive_key(CUSTODY_CONTEXT);
        hasher.update(&self.0);
        hasher.update(id.as_bytes());
        ContentKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl std::fmt::Debug for CustodySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustodySecret(..)")
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────

/// Durable storage for content keys, addressed by [`KeyId`].
///
/// `put` is idempotent for the same key material. A record that exists
/// under the key's id with different material is a conflict, never an
/// overwrite.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    /// Store a key under its derived id.
    async fn put(&self, key: &ContentKey) -> Result<()>;

    /// Fetch a key by id, or `None` if no record exists.
    async fn fetch(&self, id: &KeyId) -> Result<Option<ContentKey>>;

    /// Check whether a record exists for the id.
    async fn contains(&self, id: &KeyId) -> Result<bool>;
}

// ─────────────────────────────────────────────────────────────────────────
// Sealed directory backend
// ─────────────────────────────────────────────────────────────────────────

/// File-per-key custody directory, sealed under a [`CustodySecret`].
///
/// Each record is stored at `<root>/<key-id-hex>.key` as
/// `nonce || ciphertext || tag`, encrypted under a key derived from the
/// custody secret and the key id. Writes go through a temp file and
/// rename, so a crash never leaves a partial record under a final name.
pub struct DirCustody {
    root: PathBuf,
    secret: CustodySecret,
}

impl DirCustody {
    /// Open a custody directory, creating it if missing.
    pub async fn open(root: impl AsRef<Path>, secret: CustodySecret) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dir = root.clone();
        tokio::task::spawn_blocking(move || std::fs::create_dir_all(&dir))
            .await
            .map_err(join_error)??;
        Ok(DirCustody { root, secret })
    }

    fn key_path(&self, id: &KeyId) -> PathBuf {
        self.root.join(format!("{}.key", id.to_hex()))
    }
}

#[async_trait]
impl KeyCustody for DirCustody {
    async fn put(&self, key: &ContentKey) -> Result<()> {
        let id = key.id();
        let path = self.key_path(&id);
        let seal_key = self.secret.sealing_key(&id);
        let key = key.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            if path.exists() {
                let sealed = std::fs::read(&path)?;
                let existing = unseal(&seal_key, &id, &sealed)?;
                return if existing.as_bytes() == key.as_bytes() {
                    Ok(())
                } else {
                    Err(VaultError::CustodyConflict(id))
                };
            }

            let sealed = seal(&seal_key, &key)?;
            let tmp = path.with_extension("key.tmp");
            std::fs::write(&tmp, &sealed)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn fetch(&self, id: &KeyId) -> Result<Option<ContentKey>> {
        let path = self.key_path(id);
        let seal_key = self.secret.sealing_key(id);
        let id = *id;

        tokio::task::spawn_blocking(move || -> Result<Option<ContentKey>> {
            let sealed = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let key = unseal(&seal_key, &id, &sealed)?;
            if key.id() != id {
                return Err(VaultError::MalformedCustodyRecord(
                    id,
                    "key id mismatch".into(),
                ));
            }
            Ok(Some(key))
        })
        .await
        .map_err(join_error)?
    }

    async fn contains(&self, id: &KeyId) -> Result<bool> {
        let path = self.key_path(id);
        tokio::task::spawn_blocking(move || Ok(path.exists()))
            .await
            .map_err(join_error)?
    }
}

fn seal(seal_key: &ContentKey, key: &ContentKey) -> Result<Vec<u8>> {
    let nonce = EncryptionNonce::generate();
    let ciphertext = seal_key.encrypt(key.as_bytes(), &nonce)?;
    let mut sealed = Vec::with_capacity(SEALED_KEY_LEN);
    sealed.extend_from_slice(nonce.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn unseal(seal_key: &ContentKey, id: &KeyId, sealed: &[u8]) -> Result<ContentKey> {
    if sealed.len() != SEALED_KEY_LEN {
        return Err(VaultError::MalformedCustodyRecord(
            *id,
            format!("expected {} bytes, got {}", SEALED_KEY_LEN, sealed.len()),
        ));
    }

    let mut nonce_bytes = [0u8; 12];
    nonce_bytes.copy_from_slice(&sealed[..12]);
    let nonce = EncryptionNonce::from_bytes(nonce_bytes);

    let plaintext = seal_key
        .decrypt(&sealed[12..], &nonce)
        .map_err(|_| VaultError::MalformedCustodyRecord(*id, "authentication failed".into()))?;

    let bytes: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::MalformedCustodyRecord(*id, "wrong key length".into()))?;
    Ok(ContentKey::from_bytes(bytes))
}

fn join_error(e: tokio::task::JoinError) -> VaultError {
    VaultError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("spawn_blocking failed: {}", e),
    ))
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────

/// In-memory custody for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryCustody {
    keys: RwLock<HashMap<KeyId, ContentKey>>,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyCustody for MemoryCustody {
    async fn put(&self, key: &ContentKey) -> Result<()> {
        let id = key.id();
        let mut keys = self.keys.write().unwrap();
        match keys.get(&id) {
            Some(existing) if existing.as_bytes() == key.as_bytes() => Ok(()),
            Some(_) => Err(VaultError::CustodyConflict(id)),
            None => {
                keys.insert(id, key.clone());
                Ok(())
            }
        }
    }

    async fn fetch(&self, id: &KeyId) -> Result<Option<ContentKey>> {
        Ok(self.keys.read().unwrap().get(id).cloned())
    }

    async fn contains(&self, id: &KeyId) -> Result<bool> {
        Ok(self.keys.read().unwrap().contains_key(id))
    }
}
