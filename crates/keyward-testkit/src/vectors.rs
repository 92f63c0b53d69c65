//! Golden fingerprint vectors for cross-platform verification.
//!
//! Client libraries compute the device fingerprint locally before
//! registering; these vectors pin the canonicalization so every
//! implementation produces identical device ids.

use keyward_core::{fingerprint, DeviceAttributes, DeviceId};

/// A golden fingerprint vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Required attributes.
    pub platform: &'static str,
    pub model: &'static str,
    pub os_version: &'static str,
    pub hardware_id: &'static str,
    /// Optional attributes.
    pub screen: Option<&'static str>,
    pub timezone: Option<&'static str>,
    pub locale: Option<&'static str>,
    /// Free-form attributes.
    pub extra: &'static [(&'static str, &'static str)],
    /// Expected device id (hex). Empty until pinned against a second
    /// implementation.
    pub expected_device_id: &'static str,
}

/// Get all golden fingerprint vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "minimal ios device",
            platform: "ios",
            model: "iPhone 15",
            os_version: "17.2",
            hardware_id: "A1B2C3D4",
            screen: None,
            timezone: None,
            locale: None,
            extra: &[],
            expected_device_id: "",
        },
        GoldenVector {
            name: "laptop with all optional fields",
            platform: "macos",
            model: "MacBook Air M3",
            os_version: "14.3",
            hardware_id: "SN-0042",
            screen: Some("2560x1664"),
            timezone: Some("Europe/Berlin"),
            locale: Some("de-DE"),
            extra: &[],
            expected_device_id: "",
        },
        GoldenVector {
            name: "web client with extra attributes",
            platform: "web",
            model: "Chrome 121",
            os_version: "121.0",
            hardware_id: "fp-7f3a9c",
            screen: Some("1920x1080"),
            timezone: None,
            locale: Some("en-US"),
            extra: &[
                ("user_agent", "Mozilla/5.0"),
                ("addr_hash", "9e107d9d372bb682"),
            ],
            expected_device_id: "",
        },
        GoldenVector {
            name: "android with unicode model",
            platform: "android",
            model: "Pixel 9 Pro \u{2013} DE",
            os_version: "15",
            hardware_id: "IMEI-358240051111110",
            screen: None,
            timezone: Some("Asia/Tokyo"),
            locale: None,
            extra: &[],
            expected_device_id: "",
        },
    ]
}

/// Build the attribute set described by a vector.
pub fn attributes_from_vector(vector: &GoldenVector) -> DeviceAttributes {
    let mut attrs = DeviceAttributes::new(
        vector.platform,
        vector.model,
        vector.os_version,
        vector.hardware_id,
    );
    if let Some(v) = vector.screen {
        attrs = attrs.screen(v);
    }
    if let Some(v) = vector.timezone {
        attrs = attrs.timezone(v);
    }
    if let Some(v) = vector.locale {
        attrs = attrs.locale(v);
    }
    for (k, v) in vector.extra {
        attrs = attrs.extra(*k, *v);
    }
    attrs
}

/// Compute the device id for a vector.
pub fn device_id_from_vector(vector: &GoldenVector) -> DeviceId {
    let (id, _) = fingerprint(&attributes_from_vector(vector)).expect("vector attributes are valid");
    id
}

/// Verify all golden vectors produce consistent device ids.
///
/// Call this to verify your implementation matches the reference.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = device_id_from_vector(v).to_hex();

            // If expected is empty, just report what we got
            let matches = v.expected_device_id.is_empty() || hex == v.expected_device_id;

            (v.name.to_string(), matches, hex)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_are_deterministic() {
        for vector in all_vectors() {
            let id1 = device_id_from_vector(&vector);
            let id2 = device_id_from_vector(&vector);

            assert_eq!(
                id1, id2,
                "vector '{}' produced different ids on regeneration",
                vector.name
            );
        }
    }

    #[test]
    fn test_vectors_are_distinct() {
        let ids: Vec<DeviceId> = all_vectors().iter().map(device_id_from_vector).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_extra_insertion_order_is_irrelevant() {
        let vector = all_vectors()
            .into_iter()
            .find(|v| !v.extra.is_empty())
            .expect("at least one vector with extras");

        let forward = attributes_from_vector(&vector);

        let mut reversed = DeviceAttributes::new(
            vector.platform,
            vector.model,
            vector.os_version,
            vector.hardware_id,
        );
        if let Some(v) = vector.screen {
            reversed = reversed.screen(v);
        }
        if let Some(v) = vector.timezone {
            reversed = reversed.timezone(v);
        }
        if let Some(v) = vector.locale {
            reversed = reversed.locale(v);
        }
        for (k, v) in vector.extra.iter().rev() {
            reversed = reversed.extra(*k, *v);
        }

        let (id1, _) = fingerprint(&forward).unwrap();
        let (id2, _) = fingerprint(&reversed).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_verify_all_vectors_passes() {
        for (name, ok, _hex) in verify_all_vectors() {
            assert!(ok, "vector '{}' does not match its pinned id", name);
        }
    }
}
