//! Chunked authenticated encryption for bulk payloads.
//!
//! Assets are encrypted in bounded chunks so memory use is independent of
//! asset size. Wire format:
//!
//! ```text
//! [nonce prefix: 7 bytes, random]
//! frame := [last: u8][ct_len: u32 BE][ciphertext || tag]
//! ```
//!
//! The per-chunk nonce is `prefix || counter (u32 BE) || last`, so frames
//! cannot be reordered, dropped, duplicated, or truncated without failing
//! authentication: the counter pins each frame to its position and the
//! last flag pins the end of the stream. Decryption rejects any trailing
//! bytes after the final frame.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use std::io::{Read, Write};

use crate::error::{Result, VaultError};
use crate::keys::ContentKey;

/// Default plaintext chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the plaintext chunk size accepted by either direction.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Poly1305 authentication tag length.
const TAG_LEN: usize = 16;

/// Random per-stream nonce prefix length.
const NONCE_PREFIX_LEN: usize = 7;

/// Encrypt a stream in chunks of `chunk_size` plaintext bytes.
///
/// Returns the total number of ciphertext bytes written, including the
/// nonce prefix and frame headers.
pub fn encrypt_stream<R: Read, W: Write>(
    key: &ContentKey,
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> Result<u64> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(VaultError::CryptoFailure(format!(
            "chunk size must be between 1 and {}",
            MAX_CHUNK_SIZE
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;

    let mut prefix = [0u8; NONCE_PREFIX_LEN];
    rand::thread_rng().fill_bytes(&mut prefix);
    writer.write_all(&prefix)?;
    let mut written = NONCE_PREFIX_LEN as u64;

    // One chunk of lookahead so the final chunk is flagged as last.
    let mut current = vec![0u8; chunk_size];
    let mut next = vec![0u8; chunk_size];
    let mut current_len = read_full(&mut reader, &mut current)?;
    let mut counter: u32 = 0;

    loop {
        let next_len = read_full(&mut reader, &mut next)?;
        let last = next_len == 0;

        let nonce = chunk_nonce(&prefix, counter, last);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &current[..current_len])
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;

        writer.write_all(&[last as u8])?;
        writer.write_all(&(ciphertext.len() as u32).to_be_bytes())?;
        writer.write_all(&ciphertext)?;
        written += 1 + 4 + ciphertext.len() as u64;

        if last {
            break;
        }

        counter = counter
            .checked_add(1)
            .ok_or_else(|| VaultError::CryptoFailure("chunk counter overflow".into()))?;
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }

    writer.flush()?;
    Ok(written)
}

/// Decrypt a stream produced by [`encrypt_stream`].
///
/// Hard failure on any tamper evidence: a bad tag, a reordered or missing
/// frame, truncation before the final frame, or trailing bytes after it.
/// No partial plaintext escapes: each chunk is written only after its tag
/// verifies, and callers must discard the destination on error.
///
/// Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    key: &ContentKey,
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;

    let mut prefix = [0u8; NONCE_PREFIX_LEN];
    read_exact_or_truncated(&mut reader, &mut prefix)?;

    let mut counter: u32 = 0;
    let mut written: u64 = 0;

    loop {
        let mut flag = [0u8; 1];
        read_exact_or_truncated(&mut reader, &mut flag)?;
        let last = match flag[0] {
            0 => false,
            1 => true,
            other => {
                return Err(VaultError::CryptoFailure(format!(
                    "invalid frame flag: {}",
                    other
                )));
            }
        };

        let mut len_bytes = [0u8; 4];
        read_exact_or_truncated(&mut reader, &mut len_bytes)?;
        let ct_len = u32::from_be_bytes(len_bytes) as usize;
        if ct_len < TAG_LEN {
            return Err(VaultError::CryptoFailure("frame too short".into()));
        }
        if ct_len > MAX_CHUNK_SIZE + TAG_LEN {
            return Err(VaultError::CryptoFailure(
                "frame exceeds maximum chunk size".into(),
            ));
        }

        let mut ciphertext = vec![0u8; ct_len];
        read_exact_or_truncated(&mut reader, &mut ciphertext)?;

        let nonce = chunk_nonce(&prefix, counter, last);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| VaultError::CryptoFailure("authentication failed".into()))?;

        writer.write_all(&plaintext)?;
        written += plaintext.len() as u64;

        if last {
            break;
        }

        counter = counter
            .checked_add(1)
            .ok_or_else(|| VaultError::CryptoFailure("chunk counter overflow".into()))?;
    }

    // The last flag authenticates the end of stream; anything after it is
    // tamper evidence.
    if !at_eof(&mut reader)? {
        return Err(VaultError::CryptoFailure(
            "trailing data after final chunk".into(),
        ));
    }

    writer.flush()?;
    Ok(written)
}

/// Build the 12-byte chunk nonce: prefix || counter || last flag.
fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_LEN], counter: u32, last: bool) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_PREFIX_LEN + 4].copy_from_slice(&counter.to_be_bytes());
    nonce[11] = last as u8;
    nonce
}

/// Read until the buffer is full or EOF. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Like `read_exact`, but EOF mid-structure is a crypto failure rather
/// than an I/O error.
fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            VaultError::CryptoFailure("truncated ciphertext".into())
        }
        _ => VaultError::Io(e),
    })
}

/// Check that the reader is exhausted.
fn at_eof<R: Read>(reader: &mut R) -> Result<bool> {
    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(0) => return Ok(true),
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(VaultError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(data: &[u8], chunk_size: usize) -> Vec<u8> {
        let key = ContentKey::generate();
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(data), &mut ciphertext, chunk_size).unwrap();

        let mut plaintext = Vec::new();
        decrypt_stream(&key, Cursor::new(&ciphertext), &mut plaintext).unwrap();
        plaintext
    }

    #[test]
    fn test_roundtrip_single_chunk() {
        let data = b"a short secret payload";
        assert_eq!(roundtrip(data, DEFAULT_CHUNK_SIZE), data);
    }

    #[test]
    fn test_roundtrip_multiple_chunks() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(roundtrip(&data, 64), data);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        assert_eq!(roundtrip(b"", 64), b"");
    }

    #[test]
    fn test_roundtrip_exact_chunk_multiple() {
        // Payload length is an exact multiple of the chunk size
        let data = vec![0x7fu8; 128];
        assert_eq!(roundtrip(&data, 64), data);
    }

    #[test]
    fn test_ciphertext_differs_per_encryption() {
        let key = ContentKey::generate();
        let data = b"same payload";

        let mut c1 = Vec::new();
        let mut c2 = Vec::new();
        encrypt_stream(&key, Cursor::new(data), &mut c1, 64).unwrap();
        encrypt_stream(&key, Cursor::new(data), &mut c2, 64).unwrap();

        // Random nonce prefix per stream
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_reported_lengths() {
        let key = ContentKey::generate();
        let data = vec![0xaau8; 100];

        let mut ciphertext = Vec::new();
        let ct_len = encrypt_stream(&key, Cursor::new(&data), &mut ciphertext, 64).unwrap();
        assert_eq!(ct_len, ciphertext.len() as u64);

        let mut plaintext = Vec::new();
        let pt_len = decrypt_stream(&key, Cursor::new(&ciphertext), &mut plaintext).unwrap();
        assert_eq!(pt_len, 100);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = ContentKey::generate();
        let other = ContentKey::generate();

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(b"secret"), &mut ciphertext, 64).unwrap();

        let mut out = Vec::new();
        assert!(decrypt_stream(&other, Cursor::new(&ciphertext), &mut out).is_err());
    }

    #[test]
    fn test_flipped_body_byte_fails() {
        let key = ContentKey::generate();
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(b"secret payload"), &mut ciphertext, 64).unwrap();

        // Flip a byte inside the first frame's ciphertext
        let idx = NONCE_PREFIX_LEN + 1 + 4 + 2;
        ciphertext[idx] ^= 0x01;

        let mut out = Vec::new();
        let err = decrypt_stream(&key, Cursor::new(&ciphertext), &mut out).unwrap_err();
        assert!(matches!(err, VaultError::CryptoFailure(_)));
    }

    #[test]
    fn test_flipped_tag_byte_fails() {
        let key = ContentKey::generate();
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(b"secret payload"), &mut ciphertext, 64).unwrap();

        // The tag is the final 16 bytes of the only frame
        let idx = ciphertext.len() - 1;
        ciphertext[idx] ^= 0x80;

        let mut out = Vec::new();
        assert!(decrypt_stream(&key, Cursor::new(&ciphertext), &mut out).is_err());
    }

    #[test]
    fn test_truncation_fails() {
        let key = ContentKey::generate();
        let data = vec![0x11u8; 300];
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(&data), &mut ciphertext, 64).unwrap();

        // Drop the final frame entirely
        let truncated = &ciphertext[..ciphertext.len() - (1 + 4 + 44 + TAG_LEN)];

        let mut out = Vec::new();
        let err = decrypt_stream(&key, Cursor::new(truncated), &mut out).unwrap_err();
        assert!(matches!(err, VaultError::CryptoFailure(_)));
    }

    #[test]
    fn test_partial_final_frame_fails() {
        let key = ContentKey::generate();
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(b"secret payload"), &mut ciphertext, 64).unwrap();

        let truncated = &ciphertext[..ciphertext.len() - 3];
        let mut out = Vec::new();
        assert!(decrypt_stream(&key, Cursor::new(truncated), &mut out).is_err());
    }

    #[test]
    fn test_trailing_data_fails() {
        let key = ContentKey::generate();
        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(b"secret payload"), &mut ciphertext, 64).unwrap();

        ciphertext.extend_from_slice(b"junk");

        let mut out = Vec::new();
        let err = decrypt_stream(&key, Cursor::new(&ciphertext), &mut out).unwrap_err();
        assert!(matches!(err, VaultError::CryptoFailure(_)));
    }

    #[test]
    fn test_swapped_frames_fail() {
        let key = ContentKey::generate();
        // Two equal-sized chunks produce two equal-sized frames
        let mut data = vec![0xaau8; 32];
        data.extend_from_slice(&[0xbbu8; 32]);

        let mut ciphertext = Vec::new();
        encrypt_stream(&key, Cursor::new(&data), &mut ciphertext, 32).unwrap();

        let frame_len = 1 + 4 + 32 + TAG_LEN;
        let f0 = NONCE_PREFIX_LEN;
        let f1 = f0 + frame_len;
        assert_eq!(ciphertext.len(), f1 + frame_len);

        let mut swapped = ciphertext[..f0].to_vec();
        swapped.extend_from_slice(&ciphertext[f1..f1 + frame_len]);
        swapped.extend_from_slice(&ciphertext[f0..f1]);

        let mut out = Vec::new();
        assert!(decrypt_stream(&key, Cursor::new(&swapped), &mut out).is_err());
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let key = ContentKey::generate();
        let mut out = Vec::new();
        assert!(encrypt_stream(&key, Cursor::new(b"x"), &mut out, 0).is_err());
    }

    #[test]
    fn test_rejects_oversized_chunk_size() {
        let key = ContentKey::generate();
        let mut out = Vec::new();
        assert!(encrypt_stream(&key, Cursor::new(b"x"), &mut out, MAX_CHUNK_SIZE + 1).is_err());
    }
}
