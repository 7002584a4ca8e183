use std::sync::Arc;
use tracing::{debug, warn};
use usergrid_core::storage::{storage_key, CURRENT_USER_SERVICE, SHARED_DEVICE_SERVICE};
use usergrid_core::{CredentialStore, UsergridDevice, UsergridUser};

use crate::Result;

/// Persists the current user and the shared device for one org/app pair
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn CredentialStore>,
    user_key: String,
    device_key: String,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CredentialStore>, org_id: &str, app_id: &str) -> Self {
        Self {
            store,
            user_key: storage_key(CURRENT_USER_SERVICE, org_id, app_id),
            device_key: storage_key(SHARED_DEVICE_SERVICE, org_id, app_id),
        }
    }

    pub fn load_current_user(&self) -> Result<Option<UsergridUser>> {
        match self.store.get(&self.user_key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn save_current_user(&self, user: &UsergridUser) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        self.store.set(&self.user_key, &bytes)?;
        debug!("Persisted current user under {}", self.user_key);
        Ok(())
    }

    pub fn clear_current_user(&self) -> Result<()> {
        self.store.delete(&self.user_key)?;
        Ok(())
    }

    /// The stored shared device, or a new one for this host. A stored value
    /// that no longer decodes is replaced.
    pub fn load_or_create_shared_device(&self) -> Result<UsergridDevice> {
        if let Some(bytes) = self.store.get(&self.device_key)? {
            match serde_json::from_slice::<UsergridDevice>(&bytes) {
                Ok(device) => return Ok(device),
                Err(e) => {
                    warn!("Discarding unreadable shared device: {}", e);
                    self.store.delete(&self.device_key)?;
                }
            }
        }

        let device = UsergridDevice::for_current_host();
        self.save_shared_device(&device)?;
        Ok(device)
    }

    pub fn save_shared_device(&self, device: &UsergridDevice) -> Result<()> {
        let bytes = serde_json::to_vec(device)?;
        self.store.set(&self.device_key, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("user_key", &self.user_key)
            .field("device_key", &self.device_key)
            .finish()
    }
}
