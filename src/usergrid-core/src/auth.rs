//! Credentials and the token lifecycle
//!
//! A [`Credential`] moves through `Unset -> Valid -> Expired`, and back to
//! `Unset` when destroyed. Validity is a pure function of the stored token,
//! its expiry and the clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token, either never acquired or destroyed
    Unset,
    Valid,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
    /// Set when the token was supplied directly rather than granted
    #[serde(default)]
    using_token: bool,
}

impl Credential {
    /// A credential with no token
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token. Without an expiry it never expires.
    pub fn from_token(access_token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            expiry,
            using_token: true,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn has_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now,
            None => !self.using_token,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.has_token() && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> AuthState {
        if !self.has_token() {
            AuthState::Unset
        } else if self.is_expired_at(now) {
            AuthState::Expired
        } else {
            AuthState::Valid
        }
    }

    pub fn state(&self) -> AuthState {
        self.state_at(Utc::now())
    }

    /// Store a granted token. The expiry is `now + max(expires_in - margin, 0)`
    /// seconds; a grant without `expires_in` is treated as already expired.
    pub fn apply_token_response(
        &mut self,
        access_token: impl Into<String>,
        expires_in: Option<i64>,
        margin_secs: i64,
    ) {
        self.apply_token_response_at(access_token, expires_in, margin_secs, Utc::now());
    }

    pub fn apply_token_response_at(
        &mut self,
        access_token: impl Into<String>,
        expires_in: Option<i64>,
        margin_secs: i64,
        now: DateTime<Utc>,
    ) {
        self.access_token = Some(access_token.into());
        self.using_token = false;
        self.expiry = expires_in
            .map(|secs| now + Duration::seconds(secs.saturating_sub(margin_secs).max(0)));
    }

    pub fn destroy(&mut self) {
        self.access_token = None;
        self.expiry = None;
        self.using_token = false;
    }
}

/// Application-level credential (`client_credentials` grant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAuth {
    pub client_id: String,
    #[serde(skip)]
    client_secret: String,
    #[serde(flatten)]
    pub credential: Credential,
}

impl AppAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            credential: Credential::new(),
        }
    }

    pub fn grant_payload(&self) -> Value {
        json!({
            "grant_type": "client_credentials",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        })
    }
}

/// User-level credential (`password` grant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAuth {
    pub username: String,
    #[serde(skip)]
    password: String,
    #[serde(flatten)]
    pub credential: Credential,
}

impl UserAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            credential: Credential::new(),
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn grant_payload(&self) -> Value {
        json!({
            "grant_type": "password",
            "username": self.username,
            "password": self.password,
        })
    }
}

/// Any credential the client can attach to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "auth", rename_all = "lowercase")]
pub enum UsergridAuth {
    Token(Credential),
    App(AppAuth),
    User(UserAuth),
}

impl UsergridAuth {
    pub fn credential(&self) -> &Credential {
        match self {
            UsergridAuth::Token(credential) => credential,
            UsergridAuth::App(app) => &app.credential,
            UsergridAuth::User(user) => &user.credential,
        }
    }

    pub fn credential_mut(&mut self) -> &mut Credential {
        match self {
            UsergridAuth::Token(credential) => credential,
            UsergridAuth::App(app) => &mut app.credential,
            UsergridAuth::User(user) => &mut user.credential,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.credential().is_valid()
    }

    /// Grant body for the token endpoint. Bare tokens have none.
    pub fn grant_payload(&self) -> Option<Value> {
        match self {
            UsergridAuth::Token(_) => None,
            UsergridAuth::App(app) => Some(app.grant_payload()),
            UsergridAuth::User(user) => Some(user.grant_payload()),
        }
    }
}

impl From<AppAuth> for UsergridAuth {
    fn from(app: AppAuth) -> Self {
        UsergridAuth::App(app)
    }
}

impl From<UserAuth> for UsergridAuth {
    fn from(user: UserAuth) -> Self {
        UsergridAuth::User(user)
    }
}

impl From<Credential> for UsergridAuth {
    fn from(credential: Credential) -> Self {
        UsergridAuth::Token(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_boundary() {
        let now = Utc::now();

        let valid = Credential::from_token("t", Some(now + Duration::milliseconds(1)));
        assert!(valid.is_valid_at(now));
        assert_eq!(valid.state_at(now), AuthState::Valid);

        let expired = Credential::from_token("t", Some(now - Duration::milliseconds(1)));
        assert!(!expired.is_valid_at(now));
        assert_eq!(expired.state_at(now), AuthState::Expired);
    }

    #[test]
    fn test_explicit_token_without_expiry_valid_until_destroyed() {
        let mut credential = Credential::from_token("abc", None);
        let far_future = Utc::now() + Duration::days(3650);
        assert!(credential.is_valid_at(far_future));

        credential.destroy();
        assert!(!credential.is_valid());
        assert_eq!(credential.state(), AuthState::Unset);
        assert_eq!(credential.access_token(), None);
        assert_eq!(credential.expiry(), None);
    }

    #[test]
    fn test_empty_credential_is_unset() {
        let credential = Credential::new();
        assert!(!credential.is_valid());
        assert_eq!(credential.state(), AuthState::Unset);
    }

    #[test]
    fn test_apply_token_response_margin() {
        let now = Utc::now();
        let mut credential = Credential::new();
        credential.apply_token_response_at("tok", Some(604800), 5000, now);

        assert_eq!(credential.expiry(), Some(now + Duration::seconds(599800)));
        assert!(credential.is_valid_at(now));

        // Shorter than the margin: expires immediately
        credential.apply_token_response_at("tok", Some(60), 5000, now);
        assert!(!credential.is_valid_at(now));

        // No expires_in: a granted token without expiry is expired
        credential.apply_token_response_at("tok", None, 5000, now);
        assert!(!credential.is_valid_at(now));
    }

    #[test]
    fn test_serialization_round_trip() {
        let expiry = Utc::now() + Duration::hours(1);
        let auth = UsergridAuth::User(UserAuth {
            username: "jane".into(),
            password: "secret".into(),
            credential: Credential::from_token("abc", Some(expiry)),
        });

        let encoded = serde_json::to_string(&auth).unwrap();
        assert!(!encoded.contains("secret"));

        let decoded: UsergridAuth = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.credential(), auth.credential());
        assert_eq!(decoded.credential().expiry(), Some(expiry));
        assert!(decoded.is_valid());
    }

    #[test]
    fn test_grant_payloads() {
        let app = UsergridAuth::from(AppAuth::new("id", "secret"));
        assert_eq!(
            app.grant_payload().unwrap(),
            json!({"grant_type": "client_credentials", "client_id": "id", "client_secret": "secret"})
        );

        let user = UsergridAuth::from(UserAuth::new("jane", "pw"));
        assert_eq!(
            user.grant_payload().unwrap(),
            json!({"grant_type": "password", "username": "jane", "password": "pw"})
        );

        assert!(UsergridAuth::from(Credential::from_token("t", None))
            .grant_payload()
            .is_none());
    }
}
