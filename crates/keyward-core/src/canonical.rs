//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for the
//! subset Keyward needs (text-keyed maps of text values):
//! - Map keys sorted by encoded byte comparison
//! - Definite lengths only, in their smallest valid encoding
//! - Text keys and text values, nothing else
//!
//! The canonical encoding is critical: it ensures that the same attribute
//! set produces identical bytes (and thus identical fingerprints) across
//! all platforms, regardless of map insertion order.

use ciborium::value::Value;
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Encode a text-to-text map to canonical CBOR bytes.
pub fn canonical_map_bytes(map: &BTreeMap<String, String>) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_map_canonical(&mut buf, map);
    buf
}

/// Decode canonical CBOR bytes back to a text-to-text map.
pub fn decode_map(bytes: &[u8]) -> Result<BTreeMap<String, String>, ValidationError> {
    let cursor = std::io::Cursor::new(bytes);
    let value: Value = ciborium::from_reader(cursor)
        .map_err(|e| ValidationError::MalformedAttributes(e.to_string()))?;

    let entries = match value {
        Value::Map(m) => m,
        _ => return Err(ValidationError::MalformedAttributes("expected map".into())),
    };

    let mut map = BTreeMap::new();
    for (k, v) in entries {
        match (k, v) {
            (Value::Text(k), Value::Text(v)) => {
                map.insert(k, v);
            }
            _ => {
                return Err(ValidationError::MalformedAttributes(
                    "expected text keys and values".into(),
                ));
            }
        }
    }
    Ok(map)
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a text-keyed, text-valued map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison, not by the source
/// map's own ordering: a shorter key encodes a smaller length header and
/// sorts ahead of any longer key.
fn encode_map_canonical(buf: &mut Vec<u8>, map: &BTreeMap<String, String>) {
    // Encode all keys first to sort by encoded bytes
    let mut key_value_pairs: Vec<(Vec<u8>, &str)> = map
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_text(&mut key_buf, k);
            (key_buf, v.as_str())
        })
        .collect();

    // Sort by encoded key bytes (lexicographic)
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    // Write map header
    encode_uint(buf, 5, key_value_pairs.len() as u64);

    // Write sorted key-value pairs
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_text(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("platform".to_string(), "android".to_string());
        map.insert("model".to_string(), "Pixel 8".to_string());
        map.insert("os_version".to_string(), "14".to_string());
        map.insert("hardware_id".to_string(), "a1b2c3d4".to_string());
        map
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let map = sample_map();
        let bytes1 = canonical_map_bytes(&map);
        let bytes2 = canonical_map_bytes(&map);
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn test_map_roundtrip() {
        let map = sample_map();
        let bytes = canonical_map_bytes(&map);
        let decoded = decode_map(&bytes).unwrap();
        assert_eq!(map, decoded);
    }

    #[test]
    fn test_integer_encoding() {
        // Test smallest encoding for various integer sizes
        let mut buf = Vec::new();

        // 0-23: single byte
        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        // 24-255: two bytes
        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 255);
        assert_eq!(buf, vec![0x18, 255]);

        // 256-65535: three bytes
        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 65535);
        assert_eq!(buf, vec![0x19, 0xff, 0xff]);
    }

    #[test]
    fn test_text_key_ordering() {
        // RFC 8949: keys sort by encoded bytes, so shorter keys come first
        let mut map = BTreeMap::new();
        map.insert("zz".to_string(), "1".to_string());
        map.insert("aaa".to_string(), "2".to_string());
        let bytes = canonical_map_bytes(&map);

        // Map header (2 entries)
        assert_eq!(bytes[0], 0xa2);
        // First key: "zz" (length 2 encodes before length 3)
        assert_eq!(bytes[1], 0x62);
        assert_eq!(&bytes[2..4], b"zz");
        // First value: "1"
        assert_eq!(bytes[4], 0x61);
        assert_eq!(bytes[5], b'1');
        // Second key: "aaa"
        assert_eq!(bytes[6], 0x63);
        assert_eq!(&bytes[7..10], b"aaa");
    }

    #[test]
    fn test_exact_map_encoding() {
        let mut map = BTreeMap::new();
        map.insert("os".to_string(), "14".to_string());
        map.insert("model".to_string(), "a".to_string());
        let bytes = canonical_map_bytes(&map);

        let expected = [
            0xa2, // map, 2 entries
            0x62, b'o', b's', 0x62, b'1', b'4', // "os": "14"
            0x65, b'm', b'o', b'd', b'e', b'l', 0x61, b'a', // "model": "a"
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_long_text_uses_extended_length_header() {
        let mut map = BTreeMap::new();
        map.insert("ua".to_string(), "x".repeat(300));
        let bytes = canonical_map_bytes(&map);

        // One entry; the 300-byte value needs a two-byte length (0x79)
        assert_eq!(&bytes[..4], &[0xa1, 0x62, b'u', b'a']);
        assert_eq!(&bytes[4..7], &[0x79, 0x01, 0x2c]);
        assert_eq!(bytes.len(), 7 + 300);
        assert_eq!(decode_map(&bytes).unwrap()["ua"].len(), 300);
    }

    #[test]
    fn test_decode_rejects_non_map() {
        // 0x41 0x00 is a one-byte byte string
        assert!(decode_map(&[0x41, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_non_text_values() {
        // {"k": 1} has an integer value
        let mut buf = Vec::new();
        encode_uint(&mut buf, 5, 1);
        encode_text(&mut buf, "k");
        encode_uint(&mut buf, 0, 1);
        assert!(decode_map(&buf).is_err());
    }

    #[test]
    fn test_empty_map() {
        let map = BTreeMap::new();
        let bytes = canonical_map_bytes(&map);
        assert_eq!(bytes, vec![0xa0]);
        assert_eq!(decode_map(&bytes).unwrap(), map);
    }
}
