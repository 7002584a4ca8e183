//! Process-wide client instance
//!
//! For applications that talk to a single Usergrid app. Everything here is a
//! thin wrapper over an explicitly built [`UsergridClient`].

use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::warn;
use usergrid_core::ClientConfig;

use crate::client::UsergridClient;
use crate::Result;

pub type SharedClient = Arc<Mutex<UsergridClient>>;

static SHARED: OnceLock<SharedClient> = OnceLock::new();

/// Build the shared client from `config` on the current runtime. Only the
/// first call installs a client; later calls return the existing one.
pub fn init_shared_instance(config: ClientConfig) -> Result<SharedClient> {
    if let Some(existing) = SHARED.get() {
        warn!("Shared Usergrid client already initialized");
        return Ok(existing.clone());
    }
    let client = UsergridClient::builder(config).build()?;
    Ok(install(client))
}

/// Install an already built client as the shared instance
pub fn install(client: UsergridClient) -> SharedClient {
    SHARED.get_or_init(|| Arc::new(Mutex::new(client))).clone()
}

pub fn shared_instance() -> Option<SharedClient> {
    SHARED.get().cloned()
}

pub fn is_initialized() -> bool {
    SHARED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackContext;

    #[tokio::test]
    async fn test_first_instance_wins() {
        let first = UsergridClient::builder(ClientConfig::new("org-one", "app"))
            .callbacks(CallbackContext::from_fn(|job| job()))
            .build()
            .unwrap();
        let installed = install(first);
        assert!(is_initialized());

        let again = init_shared_instance(ClientConfig::new("org-two", "app")).unwrap();
        assert!(Arc::ptr_eq(&installed, &again));
        assert_eq!(again.lock().await.config().org_id, "org-one");
        assert!(shared_instance().is_some());
    }
}
