use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::entity::{EntityKind, UsergridEntity};

pub const DEVICE_TYPE: &str = "device";

pub const DEVICE_MODEL: &str = "deviceModel";
pub const DEVICE_PLATFORM: &str = "devicePlatform";
pub const DEVICE_OS_VERSION: &str = "deviceOSVersion";

const NOTIFIER_ID_SUFFIX: &str = ".notifier.id";

/// A `device` entity. Model, platform and OS version are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsergridDevice {
    #[serde(deserialize_with = "deserialize_device_entity")]
    entity: UsergridEntity,
}

impl UsergridDevice {
    pub fn new(
        model: impl Into<String>,
        platform: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        let mut entity = UsergridEntity::new(DEVICE_TYPE);
        entity.set_kind(EntityKind::Device);
        entity.set_unchecked(DEVICE_MODEL, Value::String(model.into()));
        entity.set_unchecked(DEVICE_PLATFORM, Value::String(platform.into()));
        entity.set_unchecked(DEVICE_OS_VERSION, Value::String(os_version.into()));
        Self { entity }
    }

    /// A device describing the host this library runs on, with a fresh uuid
    pub fn for_current_host() -> Self {
        let mut device = Self::new(
            std::env::consts::ARCH,
            std::env::consts::OS,
            std::env::consts::FAMILY,
        );
        device.entity.assign_uuid(uuid::Uuid::new_v4().to_string());
        device
    }

    pub fn from_entity(mut entity: UsergridEntity) -> Self {
        entity.set_kind(EntityKind::Device);
        Self { entity }
    }

    pub fn entity(&self) -> &UsergridEntity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut UsergridEntity {
        &mut self.entity
    }

    pub fn into_entity(self) -> UsergridEntity {
        self.entity
    }

    pub fn uuid(&self) -> Option<&str> {
        self.entity.uuid()
    }

    pub fn model(&self) -> Option<String> {
        self.entity.get_str(DEVICE_MODEL)
    }

    pub fn platform(&self) -> Option<String> {
        self.entity.get_str(DEVICE_PLATFORM)
    }

    pub fn os_version(&self) -> Option<String> {
        self.entity.get_str(DEVICE_OS_VERSION)
    }

    /// `<notifier>.notifier.id`
    pub fn push_token_key(notifier_id: &str) -> String {
        format!("{}{}", notifier_id, NOTIFIER_ID_SUFFIX)
    }

    /// Record a push token for a notifier locally, as lowercase hex
    pub fn apply_push_token(&mut self, push_token: &[u8], notifier_id: &str) {
        self.entity.set(
            &Self::push_token_key(notifier_id),
            Value::String(hex::encode(push_token)),
        );
    }

    pub fn push_token(&self, notifier_id: &str) -> Option<String> {
        self.entity.get_str(&Self::push_token_key(notifier_id))
    }
}

impl From<UsergridDevice> for UsergridEntity {
    fn from(device: UsergridDevice) -> Self {
        device.entity
    }
}

fn deserialize_device_entity<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<UsergridEntity, D::Error> {
    let mut entity = UsergridEntity::deserialize(deserializer)?;
    entity.set_kind(EntityKind::Device);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_immutable_device_properties() {
        let mut device = UsergridDevice::new("Pixel", "Android", "14");
        assert!(!device.entity_mut().set(DEVICE_MODEL, json!("iPhone")));
        assert_eq!(device.model().as_deref(), Some("Pixel"));
        assert!(device.entity_mut().set("nickname", json!("work phone")));
    }

    #[test]
    fn test_push_token_hex() {
        let mut device = UsergridDevice::new("m", "p", "v");
        device.apply_push_token(&[0xde, 0xad, 0xbe, 0xef], "apple-dev");
        assert_eq!(device.push_token("apple-dev").as_deref(), Some("deadbeef"));
        assert_eq!(
            device.entity().to_json()["apple-dev.notifier.id"],
            json!("deadbeef")
        );
    }

    #[test]
    fn test_current_host_has_uuid() {
        let device = UsergridDevice::for_current_host();
        assert!(device.uuid().is_some_and(crate::query::is_uuid));

        let restored: UsergridDevice =
            serde_json::from_str(&serde_json::to_string(&device).unwrap()).unwrap();
        assert_eq!(restored, device);
    }
}
