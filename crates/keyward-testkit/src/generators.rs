//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyward_core::{
    AccessKind, ContentId, ContentKind, DeviceAttributes, DeviceClass, DeviceId, KeyId, UserId,
};

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    any::<u64>().prop_map(UserId::new)
}

/// Generate a random DeviceId.
pub fn device_id() -> impl Strategy<Value = DeviceId> {
    any::<[u8; 32]>().prop_map(DeviceId::from_bytes)
}

/// Generate a random ContentId.
pub fn content_id() -> impl Strategy<Value = ContentId> {
    any::<[u8; 32]>().prop_map(ContentId::from_bytes)
}

/// Generate a random KeyId.
pub fn key_id() -> impl Strategy<Value = KeyId> {
    any::<[u8; 16]>().prop_map(KeyId::from_bytes)
}

/// Generate a device class.
pub fn device_class() -> impl Strategy<Value = DeviceClass> {
    prop_oneof![Just(DeviceClass::Mobile), Just(DeviceClass::Laptop)]
}

/// Generate a content kind.
pub fn content_kind() -> impl Strategy<Value = ContentKind> {
    prop_oneof![
        Just(ContentKind::Video),
        Just(ContentKind::Pdf),
        Just(ContentKind::Audio),
    ]
}

/// Generate an access kind.
pub fn access_kind() -> impl Strategy<Value = AccessKind> {
    prop_oneof![
        Just(AccessKind::Download),
        Just(AccessKind::Stream),
        Just(AccessKind::View),
    ]
}

/// Generate a non-empty attribute value.
pub fn attribute_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9._ -]{1,24}".prop_map(String::from)
}

/// Generate a free-form attribute key that avoids the named fields.
pub fn extra_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_filter("reserved attribute name", |k| {
        !matches!(
            k.as_str(),
            "platform" | "model" | "os_version" | "hardware_id" | "screen" | "timezone" | "locale"
        )
    })
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Parameters for generating a device attribute set.
#[derive(Debug, Clone)]
pub struct AttributeParams {
    pub platform: String,
    pub model: String,
    pub os_version: String,
    pub hardware_id: String,
    pub screen: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl Arbitrary for AttributeParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            attribute_value(),
            attribute_value(),
            attribute_value(),
            attribute_value(),
            prop::option::of(attribute_value()),
            prop::option::of(attribute_value()),
            prop::option::of(attribute_value()),
            prop::collection::vec((extra_key(), attribute_value()), 0..4),
        )
            .prop_map(
                |(platform, model, os_version, hardware_id, screen, timezone, locale, extra)| {
                    AttributeParams {
                        platform,
                        model,
                        os_version,
                        hardware_id,
                        screen,
                        timezone,
                        locale,
                        extra,
                    }
                },
            )
            .boxed()
    }
}

/// Build a DeviceAttributes from parameters.
pub fn attributes_from_params(params: &AttributeParams) -> DeviceAttributes {
    let mut attrs = DeviceAttributes::new(
        &params.platform,
        &params.model,
        &params.os_version,
        &params.hardware_id,
    );
    if let Some(v) = &params.screen {
        attrs = attrs.screen(v);
    }
    if let Some(v) = &params.timezone {
        attrs = attrs.timezone(v);
    }
    if let Some(v) = &params.locale {
        attrs = attrs.locale(v);
    }
    for (k, v) in &params.extra {
        attrs = attrs.extra(k, v);
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::fingerprint;
    use keyward_vault::{unwrap_with_device, wrap_for_device, ContentKey, DevicePrivateKey};

    proptest! {
        #[test]
        fn test_fingerprint_deterministic(params: AttributeParams) {
            let a1 = attributes_from_params(&params);
            let a2 = attributes_from_params(&params);

            let (id1, bytes1) = fingerprint(&a1).unwrap();
            let (id2, bytes2) = fingerprint(&a2).unwrap();

            prop_assert_eq!(id1, id2);
            prop_assert_eq!(bytes1.as_bytes(), bytes2.as_bytes());
        }

        #[test]
        fn test_fingerprint_sensitive_to_hardware_id(
            params: AttributeParams,
            suffix in "[a-z]{1,8}",
        ) {
            let changed = AttributeParams {
                hardware_id: format!("{}{}", params.hardware_id, suffix),
                ..params.clone()
            };

            let (id1, _) = fingerprint(&attributes_from_params(&params)).unwrap();
            let (id2, _) = fingerprint(&attributes_from_params(&changed)).unwrap();

            prop_assert_ne!(id1, id2);
        }

        #[test]
        fn test_wrap_roundtrip_for_any_key(
            key_bytes in any::<[u8; 32]>(),
            device_bytes in any::<[u8; 32]>(),
        ) {
            let key = ContentKey::from_bytes(key_bytes);
            let device = DevicePrivateKey::from_bytes(device_bytes);

            let wrapped = wrap_for_device(&key, &device.public_key());
            let unwrapped = unwrap_with_device(&wrapped, &device).unwrap();

            prop_assert_eq!(unwrapped.as_bytes(), key.as_bytes());
        }
    }
}
