//! Entity model
//!
//! An entity is a typed backend object with optional identity (`uuid` or
//! `name`), server timestamps, an optional location and any number of
//! free-form JSON properties. All property reads and writes go through
//! [`UsergridEntity::get`] / [`UsergridEntity::set`], which consult a single
//! table of reserved keys to decide whether a key may be written and how its
//! value is coerced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::asset::UsergridAsset;

pub const TYPE: &str = "type";
pub const UUID: &str = "uuid";
pub const NAME: &str = "name";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";
pub const LOCATION: &str = "location";
pub const FILE_METADATA: &str = "file-metadata";

/// Device properties fixed at construction
pub const DEVICE_IMMUTABLE_KEYS: [&str; 3] = ["deviceModel", "devicePlatform", "deviceOSVersion"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EntityError {
    #[error("entity JSON must be an object")]
    NotAnObject,

    #[error("entity JSON has no \"type\" property")]
    MissingType,
}

/// Whether a reserved key can be written by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Never,
    Always,
    UserOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedKey {
    Type,
    Uuid,
    Name,
    Created,
    Modified,
    Location,
}

const RESERVED_KEYS: [(&str, ReservedKey, Mutability); 6] = [
    (TYPE, ReservedKey::Type, Mutability::Never),
    (UUID, ReservedKey::Uuid, Mutability::Never),
    (NAME, ReservedKey::Name, Mutability::UserOnly),
    (CREATED, ReservedKey::Created, Mutability::Never),
    (MODIFIED, ReservedKey::Modified, Mutability::Never),
    (LOCATION, ReservedKey::Location, Mutability::Always),
];

impl ReservedKey {
    /// Case-insensitive lookup in the reserved key table
    pub fn lookup(key: &str) -> Option<(ReservedKey, Mutability)> {
        RESERVED_KEYS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, reserved, mutability)| (*reserved, *mutability))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedKey::Type => TYPE,
            ReservedKey::Uuid => UUID,
            ReservedKey::Name => NAME,
            ReservedKey::Created => CREATED,
            ReservedKey::Modified => MODIFIED,
            ReservedKey::Location => LOCATION,
        }
    }
}

/// Behavioural flavour of an entity, chosen by the type registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityKind {
    #[default]
    Entity,
    User,
    Device,
}

impl EntityKind {
    /// Kind implied by the built-in types
    pub fn for_type(entity_type: &str) -> Self {
        match entity_type {
            "user" => EntityKind::User,
            "device" => EntityKind::Device,
            _ => EntityKind::Entity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            latitude: obj.get("latitude")?.as_f64()?,
            longitude: obj.get("longitude")?.as_f64()?,
        })
    }
}

/// Metadata the backend attaches to entities that carry an asset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(rename = "content-type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "content-length", default)]
    pub content_length: u64,
    #[serde(rename = "last-modified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl FileMetaData {
    pub fn last_modified_date(&self) -> Option<DateTime<Utc>> {
        self.last_modified.and_then(DateTime::from_timestamp_millis)
    }
}

/// A mutable reserved field that can be explicitly cleared
#[derive(Debug, Clone, PartialEq)]
enum Slot<T> {
    Unset,
    Cleared,
    Set(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Unset
    }
}

impl<T> Slot<T> {
    fn get(&self) -> Option<&T> {
        match self {
            Slot::Set(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsergridEntity {
    entity_type: String,
    kind: EntityKind,
    uuid: Option<String>,
    name: Slot<String>,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
    location: Slot<Location>,
    file_metadata: Option<FileMetaData>,
    properties: Map<String, Value>,
    asset: Option<UsergridAsset>,
}

impl UsergridEntity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self {
            kind: EntityKind::for_type(&entity_type),
            entity_type,
            uuid: None,
            name: Slot::Unset,
            created: None,
            modified: None,
            location: Slot::Unset,
            file_metadata: None,
            properties: Map::new(),
            asset: None,
        }
    }

    pub fn with_name(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        let mut entity = Self::new(entity_type);
        entity.name = Slot::Set(name.into());
        entity
    }

    /// Build an entity with an initial set of properties.
    ///
    /// Reserved keys in `properties` go through the usual mutability rules.
    pub fn with_properties(
        entity_type: impl Into<String>,
        name: Option<String>,
        properties: Map<String, Value>,
    ) -> Self {
        let mut entity = Self::new(entity_type);
        if let Some(name) = name {
            entity.name = Slot::Set(name);
        }
        entity.put_properties(properties);
        entity
    }

    /// Hydrate from a server JSON object. Requires a `type` property.
    pub fn from_json(value: Value) -> Result<Self, EntityError> {
        let Value::Object(obj) = value else {
            return Err(EntityError::NotAnObject);
        };

        let entity_type = match obj.get(TYPE) {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            _ => return Err(EntityError::MissingType),
        };

        let mut entity = Self::new(entity_type);

        for (key, value) in obj {
            if key == FILE_METADATA {
                match serde_json::from_value::<FileMetaData>(value.clone()) {
                    Ok(meta) => entity.file_metadata = Some(meta),
                    Err(e) => {
                        debug!("Ignoring unparseable file metadata: {}", e);
                        entity.properties.insert(key, value);
                    }
                }
                continue;
            }

            match ReservedKey::lookup(&key) {
                Some((ReservedKey::Type, _)) => {}
                Some((ReservedKey::Uuid, _)) => {
                    entity.uuid = value.as_str().map(str::to_string);
                }
                Some((ReservedKey::Name, _)) => {
                    if let Some(name) = value.as_str() {
                        entity.name = Slot::Set(name.to_string());
                    }
                }
                Some((ReservedKey::Created, _)) => entity.created = timestamp_from_value(&value),
                Some((ReservedKey::Modified, _)) => entity.modified = timestamp_from_value(&value),
                Some((ReservedKey::Location, _)) => {
                    if let Some(location) = Location::from_value(&value) {
                        entity.location = Slot::Set(location);
                    }
                }
                None => {
                    entity.properties.insert(key, value);
                }
            }
        }

        Ok(entity)
    }

    /// Serialize for the wire. Cleared properties are emitted as `null`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(TYPE.to_string(), Value::String(self.entity_type.clone()));
        if let Some(uuid) = &self.uuid {
            obj.insert(UUID.to_string(), Value::String(uuid.clone()));
        }
        match &self.name {
            Slot::Set(name) => {
                obj.insert(NAME.to_string(), Value::String(name.clone()));
            }
            Slot::Cleared => {
                obj.insert(NAME.to_string(), Value::Null);
            }
            Slot::Unset => {}
        }
        if let Some(created) = self.created {
            obj.insert(CREATED.to_string(), Value::from(created.timestamp_millis()));
        }
        if let Some(modified) = self.modified {
            obj.insert(MODIFIED.to_string(), Value::from(modified.timestamp_millis()));
        }
        match &self.location {
            Slot::Set(location) => {
                obj.insert(LOCATION.to_string(), location_value(location));
            }
            Slot::Cleared => {
                obj.insert(LOCATION.to_string(), Value::Null);
            }
            Slot::Unset => {}
        }
        if let Some(meta) = &self.file_metadata {
            if let Ok(value) = serde_json::to_value(meta) {
                obj.insert(FILE_METADATA.to_string(), value);
            }
        }
        for (key, value) in &self.properties {
            obj.insert(key.clone(), value.clone());
        }
        Value::Object(obj)
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: EntityKind) {
        self.kind = kind;
    }

    pub fn is_user(&self) -> bool {
        self.kind == EntityKind::User
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn location(&self) -> Option<Location> {
        self.location.get().copied()
    }

    pub fn set_location(&mut self, location: Option<Location>) {
        self.location = match location {
            Some(location) => Slot::Set(location),
            None => Slot::Cleared,
        };
    }

    pub fn file_metadata(&self) -> Option<&FileMetaData> {
        self.file_metadata.as_ref()
    }

    pub fn asset(&self) -> Option<&UsergridAsset> {
        self.asset.as_ref()
    }

    pub fn attach_asset(&mut self, asset: UsergridAsset) {
        self.asset = Some(asset);
    }

    pub fn has_asset(&self) -> bool {
        self.asset.is_some()
            || self
                .file_metadata
                .as_ref()
                .is_some_and(|meta| meta.content_length > 0)
    }

    /// The uuid if present, else the name
    pub fn uuid_or_name(&self) -> Option<&str> {
        self.uuid()
            .filter(|uuid| !uuid.is_empty())
            .or_else(|| self.name().filter(|name| !name.is_empty()))
    }

    /// Two entities refer to the same backend object
    pub fn same_identity(&self, other: &UsergridEntity) -> bool {
        match (self.uuid_or_name(), other.uuid_or_name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Read a property. Cleared and missing properties both yield `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        match ReservedKey::lookup(key) {
            Some((ReservedKey::Type, _)) => Some(Value::String(self.entity_type.clone())),
            Some((ReservedKey::Uuid, _)) => self.uuid.clone().map(Value::String),
            Some((ReservedKey::Name, _)) => self.name().map(|n| Value::String(n.to_string())),
            Some((ReservedKey::Created, _)) => {
                self.created.map(|t| Value::from(t.timestamp_millis()))
            }
            Some((ReservedKey::Modified, _)) => {
                self.modified.map(|t| Value::from(t.timestamp_millis()))
            }
            Some((ReservedKey::Location, _)) => self.location().map(|l| location_value(&l)),
            None => self.properties.get(key).filter(|v| !v.is_null()).cloned(),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Write a property.
    ///
    /// `Value::Null` clears the property and leaves a tombstone so the next
    /// PUT removes it on the server. Returns `false` when the key is
    /// immutable for this entity or the value has the wrong shape.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        if let Some((reserved, mutability)) = ReservedKey::lookup(key) {
            let writable = match mutability {
                Mutability::Never => false,
                Mutability::Always => true,
                Mutability::UserOnly => self.is_user(),
            };
            if !writable {
                debug!("Ignoring write to immutable property '{}'", key);
                return false;
            }
            return match (reserved, value) {
                (ReservedKey::Name, Value::Null) => {
                    self.name = Slot::Cleared;
                    true
                }
                (ReservedKey::Name, Value::String(name)) => {
                    self.name = Slot::Set(name);
                    true
                }
                (ReservedKey::Location, Value::Null) => {
                    self.location = Slot::Cleared;
                    true
                }
                (ReservedKey::Location, value) => match Location::from_value(&value) {
                    Some(location) => {
                        self.location = Slot::Set(location);
                        true
                    }
                    None => false,
                },
                _ => false,
            };
        }

        if self.kind == EntityKind::Device && DEVICE_IMMUTABLE_KEYS.contains(&key) {
            debug!("Ignoring write to immutable device property '{}'", key);
            return false;
        }

        self.properties.insert(key.to_string(), value);
        true
    }

    pub(crate) fn assign_uuid(&mut self, uuid: String) {
        self.uuid = Some(uuid);
    }

    /// Write bypassing mutability checks, for values fixed at construction
    pub(crate) fn set_unchecked(&mut self, key: &str, value: Value) {
        self.properties.insert(key.to_string(), value);
    }

    pub fn put_properties(&mut self, properties: Map<String, Value>) {
        for (key, value) in properties {
            self.set(&key, value);
        }
    }

    pub fn remove_property(&mut self, key: &str) -> bool {
        self.set(key, Value::Null)
    }

    pub fn remove_properties<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.remove_property(key.as_ref());
        }
    }

    /// Custom properties that currently hold a value
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter().filter(|(_, v)| !v.is_null())
    }

    /// Append to an array property, creating it when missing
    pub fn append(&mut self, key: &str, value: Value) {
        let len = self.array_len(key);
        self.insert(key, value, len);
    }

    /// Insert into an array property at `index` (clamped to the length).
    ///
    /// An array `value` is spliced element-wise. A scalar existing value is
    /// promoted to a one-element array first.
    pub fn insert(&mut self, key: &str, value: Value, index: usize) {
        if ReservedKey::lookup(key).is_some() {
            return;
        }
        let mut items = match self.properties.remove(key) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        let at = index.min(items.len());
        let incoming = match value {
            Value::Array(values) => values,
            other => vec![other],
        };
        items.splice(at..at, incoming);
        self.properties.insert(key.to_string(), Value::Array(items));
    }

    /// Remove the last element of an array property
    pub fn pop(&mut self, key: &str) -> Option<Value> {
        match self.properties.get_mut(key) {
            Some(Value::Array(items)) => items.pop(),
            _ => None,
        }
    }

    /// Remove the first element of an array property
    pub fn shift(&mut self, key: &str) -> Option<Value> {
        match self.properties.get_mut(key) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.remove(0)),
            _ => None,
        }
    }

    fn array_len(&self, key: &str) -> usize {
        match self.properties.get(key) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }

    /// Replace all server-visible state with `other`'s, keeping the local
    /// asset and behavioural kind.
    pub fn copy_internals_from(&mut self, other: &UsergridEntity) {
        self.entity_type = other.entity_type.clone();
        self.uuid = other.uuid.clone();
        self.name = other.name.clone();
        self.created = other.created;
        self.modified = other.modified;
        self.location = other.location.clone();
        self.file_metadata = other.file_metadata.clone();
        self.properties = other.properties.clone();
    }
}

impl Serialize for UsergridEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UsergridEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        UsergridEntity::from_json(value).map_err(serde::de::Error::custom)
    }
}

fn location_value(location: &Location) -> Value {
    serde_json::json!({
        "latitude": location.latitude,
        "longitude": location.longitude,
    })
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp_millis(millis)
}
