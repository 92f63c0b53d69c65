//! Content ingest and catalog management.
//!
//! Ingest is the only place plaintext is ever read: the source file is
//! streamed through bulk encryption into the storage root, the content
//! key goes to custody, and the catalog row is written last. An asset
//! that exists in the catalog therefore always has its payload on disk
//! and its key in custody.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyward_core::{ContentAsset, ContentDigest, ContentId, ContentKind};
use keyward_store::{ContentInsert, Store, StoreError};
use keyward_vault::{encrypt_stream, ContentKey, KeyCustody, DEFAULT_CHUNK_SIZE};

use crate::error::{KeywardError, Result};

/// File extension for encrypted payloads.
const PAYLOAD_EXT: &str = "kwp";

/// Configuration for the content manager.
#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// Directory that receives encrypted payloads.
    pub storage_root: PathBuf,
    /// Plaintext chunk size for bulk encryption.
    pub chunk_size: usize,
}

impl ContentConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Description of an asset to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub description: String,
    pub kind: ContentKind,
    pub source: PathBuf,
    pub duration_secs: Option<u32>,
    pub thumbnail_path: Option<PathBuf>,
}

impl IngestRequest {
    /// Start from the required fields.
    pub fn new(title: impl Into<String>, kind: ContentKind, source: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind,
            source: source.into(),
            duration_secs: None,
            thumbnail_path: None,
        }
    }

    /// Set the display description.
    pub fn description(mut self, d: impl Into<String>) -> Self {
        self.description = d.into();
        self
    }

    /// Set the playback length for audio/video.
    pub fn duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Set the preview image shown in listings. The thumbnail is not
    /// protected content and is never encrypted.
    pub fn thumbnail_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }
}

/// Brings assets under protection and manages the catalog.
pub struct ContentManager<S: Store, K: KeyCustody> {
    store: Arc<S>,
    custody: Arc<K>,
    config: ContentConfig,
}

impl<S: Store, K: KeyCustody> ContentManager<S, K> {
    /// Create a manager over a shared store and custody backend.
    pub fn new(store: Arc<S>, custody: Arc<K>, config: ContentConfig) -> Self {
        Self {
            store,
            custody,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring a source file under protection.
    ///
    /// Generates a fresh content key, encrypts the source into
    /// `<storage_root>/<content-id>.kwp`, stores the key in custody, and
    /// persists the catalog record. The content id is the hash of the
    /// encrypted payload, computed while it streams to disk. On failure
    /// no partial payload is left behind.
    pub async fn ingest(&self, request: IngestRequest) -> Result<ContentAsset> {
        let key = ContentKey::generate();
        let now = now_millis();

        // Encryption is CPU-bound sync I/O; keep it off the runtime.
        let stage_key = key.clone();
        let source = request.source.clone();
        let config = self.config.clone();
        let staged = tokio::task::spawn_blocking(move || stage_payload(&stage_key, &source, &config))
            .await
            .map_err(join_failed)??;

        // Key into custody before the catalog row: a cataloged asset must
        // always be openable.
        if let Err(e) = self.custody.put(&key).await {
            discard_payload(staged.final_path).await;
            return Err(e.into());
        }

        let asset = ContentAsset {
            id: staged.content_id,
            title: request.title,
            description: request.description,
            kind: request.kind,
            payload_path: staged.final_path.clone(),
            size_bytes: staged.size_bytes,
            duration_secs: request.duration_secs,
            thumbnail_path: request.thumbnail_path,
            key_id: key.id(),
            is_active: true,
            created_at: now,
        };

        match self.store.insert_content(&asset).await {
            Ok(ContentInsert::Inserted) => {
                tracing::info!(
                    "ingested {} asset {} ({} bytes) as content {}",
                    asset.kind,
                    asset.title,
                    asset.size_bytes,
                    asset.id
                );
                Ok(asset)
            }
            // Identical ciphertext means an identical prior ingest; the
            // existing record already points at this payload and key.
            Ok(ContentInsert::AlreadyExists) => {
                let existing = self.store.get_content(&staged.content_id).await?.ok_or_else(|| {
                    StoreError::InvalidData("content exists but catalog row is missing".into())
                })?;
                Ok(existing)
            }
            Err(e) => {
                discard_payload(staged.final_path).await;
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up an asset by content id, active or not.
    pub async fn get(&self, id: &ContentId) -> Result<Option<ContentAsset>> {
        Ok(self.store.get_content(id).await?)
    }

    /// List assets currently being served, oldest first.
    pub async fn list_active(&self) -> Result<Vec<ContentAsset>> {
        Ok(self.store.list_active_content().await?)
    }

    /// Take an asset out of service. Idempotent.
    ///
    /// Soft delete: the payload, the key in custody, and all recorded
    /// access events stay in place.
    pub async fn deactivate(&self, id: &ContentId) -> Result<bool> {
        let deactivated = self.store.deactivate_content(id).await?;
        if deactivated {
            tracing::info!("deactivated content {}", id);
        }
        Ok(deactivated)
    }
}

struct StagedPayload {
    content_id: ContentId,
    final_path: PathBuf,
    size_bytes: u64,
}

/// Encrypt `source` into the storage root under a temp name, then rename
/// it to its content address. Removes the temp file on any failure.
fn stage_payload(key: &ContentKey, source: &Path, config: &ContentConfig) -> Result<StagedPayload> {
    let source_file = match File::open(source) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("ingest refused: source {} does not exist", source.display());
            return Err(KeywardError::SourceNotFound(source.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    fs::create_dir_all(&config.storage_root)?;

    // The final name is the content address, which is only known once the
    // ciphertext has streamed through; stage under the key id, unique per
    // ingest.
    let tmp_path = config
        .storage_root
        .join(format!(".ingest-{}.tmp", key.id()));

    let staged = write_encrypted(key, source_file, &tmp_path, config.chunk_size).and_then(
        |(content_id, size_bytes)| {
            let final_path = config
                .storage_root
                .join(format!("{}.{}", content_id.to_hex(), PAYLOAD_EXT));
            fs::rename(&tmp_path, &final_path)?;
            Ok(StagedPayload {
                content_id,
                final_path,
                size_bytes,
            })
        },
    );

    if staged.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    staged
}

fn write_encrypted(
    key: &ContentKey,
    source: File,
    tmp_path: &Path,
    chunk_size: usize,
) -> Result<(ContentId, u64)> {
    let out = File::create(tmp_path)?;
    let mut writer = DigestWriter {
        inner: BufWriter::new(out),
        digest: ContentDigest::new(),
    };
    let size = encrypt_stream(key, BufReader::new(source), &mut writer, chunk_size)?;
    Ok((writer.digest.finalize(), size))
}

/// Tees everything written to the payload file into the content digest.
struct DigestWriter<W> {
    inner: W,
    digest: ContentDigest,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

async fn discard_payload(path: PathBuf) {
    let _ = tokio::task::spawn_blocking(move || fs::remove_file(path)).await;
}

fn join_failed(e: tokio::task::JoinError) -> KeywardError {
    KeywardError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("spawn_blocking failed: {}", e),
    ))
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
