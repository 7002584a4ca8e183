use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::AuthMode;

/// Client configuration, loadable from a JSON file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub org_id: String,
    pub app_id: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Store the current user in the credential store after login
    #[serde(default = "default_persist_current_user")]
    pub persist_current_user: bool,

    #[serde(default)]
    pub app_auth: Option<AppCredentials>,

    /// Seconds subtracted from a grant's `expires_in`
    #[serde(default = "default_token_expiry_margin")]
    pub token_expiry_margin_secs: i64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

fn default_base_url() -> String {
    "https://api.usergrid.com".to_string()
}

fn default_persist_current_user() -> bool {
    true
}

fn default_token_expiry_margin() -> i64 {
    5000
}

fn default_request_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("usergrid-rust/v{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    pub fn new(org_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            app_id: app_id.into(),
            base_url: default_base_url(),
            auth_mode: AuthMode::default(),
            persist_current_user: default_persist_current_user(),
            app_auth: None,
            token_expiry_margin_secs: default_token_expiry_margin(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: ClientConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path))?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    pub fn with_app_auth(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.app_auth = Some(AppCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        self
    }

    pub fn with_persist_current_user(mut self, persist: bool) -> Self {
        self.persist_current_user = persist;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// `<base_url>/<org>/<app>`
    pub fn app_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.org_id,
            self.app_id
        )
    }
}
