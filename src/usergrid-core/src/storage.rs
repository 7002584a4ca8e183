//! Credential storage
//!
//! The client persists the shared device and the current user through a
//! [`CredentialStore`]. Platform secure storage is supplied by the host;
//! [`MemoryCredentialStore`] keeps values for the lifetime of the process.

use std::collections::HashMap;
use std::sync::RwLock;

pub const SHARED_DEVICE_SERVICE: &str = "SharedDevice";
pub const CURRENT_USER_SERVICE: &str = "CurrentUser";

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("stored value could not be decoded: {0}")]
    Corrupt(String),
}

/// Byte-oriented key/value storage for credentials
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// `<service>.<org>.<app>`
pub fn storage_key(service: &str, org_id: &str, app_id: &str) -> String {
    format!("{}.{}.{}", service, org_id, app_id)
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    items: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let items = self
            .items
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        items.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        items.remove(key);
        Ok(())
    }
}
