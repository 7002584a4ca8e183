use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::auth::UserAuth;
use crate::entity::{EntityKind, UsergridEntity};

pub const USER_TYPE: &str = "user";

pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const EMAIL: &str = "email";
pub const AGE: &str = "age";
pub const ACTIVATED: &str = "activated";
pub const DISABLED: &str = "disabled";
pub const PICTURE: &str = "picture";

/// A `user` entity plus its credential once authenticated.
///
/// The password is write-only: it is sent when the user is created and is
/// never read back or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsergridUser {
    #[serde(deserialize_with = "deserialize_user_entity")]
    entity: UsergridEntity,
    #[serde(skip)]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<UserAuth>,
}

impl UsergridUser {
    pub fn new(username: impl Into<String>) -> Self {
        let mut user = Self::from_entity(UsergridEntity::new(USER_TYPE));
        user.set_username(username);
        user
    }

    /// Wrap any entity, treating it as a user
    pub fn from_entity(mut entity: UsergridEntity) -> Self {
        entity.set_kind(EntityKind::User);
        Self {
            entity,
            password: None,
            auth: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.set_email(email);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.set_password(password);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.entity.set(crate::entity::NAME, Value::String(name.into()));
        self
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

    pub fn name(&self) -> Option<&str> {
        self.entity.name()
    }

    pub fn username(&self) -> Option<String> {
        self.entity.get_str(USERNAME)
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.entity.set(USERNAME, Value::String(username.into()));
    }

    pub fn email(&self) -> Option<String> {
        self.entity.get_str(EMAIL)
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.entity.set(EMAIL, Value::String(email.into()));
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn age(&self) -> Option<i64> {
        self.entity.get(AGE).and_then(|v| v.as_i64())
    }

    pub fn set_age(&mut self, age: i64) {
        self.entity.set(AGE, Value::from(age));
    }

    pub fn activated(&self) -> bool {
        self.flag(ACTIVATED)
    }

    pub fn set_activated(&mut self, activated: bool) {
        self.entity.set(ACTIVATED, Value::Bool(activated));
    }

    pub fn disabled(&self) -> bool {
        self.flag(DISABLED)
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.entity.set(DISABLED, Value::Bool(disabled));
    }

    pub fn picture(&self) -> Option<String> {
        self.entity.get_str(PICTURE)
    }

    pub fn set_picture(&mut self, picture: impl Into<String>) {
        self.entity.set(PICTURE, Value::String(picture.into()));
    }

    fn flag(&self, key: &str) -> bool {
        match self.entity.get(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            Some(Value::String(s)) => s == "true" || s == "1",
            _ => false,
        }
    }

    /// The uuid if present, else the username
    pub fn uuid_or_username(&self) -> Option<String> {
        self.uuid()
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| self.username().filter(|u| !u.is_empty()))
    }

    /// The username if present, else the email
    pub fn username_or_email(&self) -> Option<String> {
        self.username()
            .filter(|u| !u.is_empty())
            .or_else(|| self.email().filter(|e| !e.is_empty()))
    }

    pub fn auth(&self) -> Option<&UserAuth> {
        self.auth.as_ref()
    }

    pub fn auth_mut(&mut self) -> Option<&mut UserAuth> {
        self.auth.as_mut()
    }

    pub fn set_auth(&mut self, auth: Option<UserAuth>) {
        self.auth = auth;
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.as_ref().is_some_and(|a| a.credential.is_valid())
    }

    /// Body for `POST users`: the entity plus the password, if set
    pub fn create_payload(&self) -> Value {
        let mut json = self.entity.to_json();
        if let (Some(password), Value::Object(obj)) = (&self.password, &mut json) {
            obj.insert(PASSWORD.to_string(), Value::String(password.clone()));
        }
        json
    }
}

impl From<UsergridUser> for UsergridEntity {
    fn from(user: UsergridUser) -> Self {
        user.entity
    }
}

fn deserialize_user_entity<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<UsergridEntity, D::Error> {
    let mut entity = UsergridEntity::deserialize(deserializer)?;
    entity.set_kind(EntityKind::User);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use serde_json::json;

    #[test]
    fn test_identity_helpers() {
        let user = UsergridUser::new("jane").with_email("jane@example.com");
        assert_eq!(user.uuid_or_username().as_deref(), Some("jane"));
        assert_eq!(user.username_or_email().as_deref(), Some("jane"));

        let mut by_email = UsergridUser::from_entity(UsergridEntity::new(USER_TYPE));
        by_email.set_email("a@b.c");
        assert_eq!(by_email.username_or_email().as_deref(), Some("a@b.c"));
        assert_eq!(by_email.uuid_or_username(), None);
    }

    #[test]
    fn test_password_is_write_only() {
        let user = UsergridUser::new("jane").with_password("hunter2");
        assert!(user.has_password());
        assert_eq!(user.entity().get(PASSWORD), None);
        assert_eq!(user.create_payload()["password"], json!("hunter2"));

        let persisted = serde_json::to_string(&user).unwrap();
        assert!(!persisted.contains("hunter2"));
    }

    #[test]
    fn test_persisted_user_keeps_credential() {
        let mut user = UsergridUser::new("jane").with_name("Jane Doe");
        let mut auth = UserAuth::new("jane", "pw");
        auth.credential = Credential::from_token("tok", None);
        user.set_auth(Some(auth));

        let restored: UsergridUser =
            serde_json::from_str(&serde_json::to_string(&user).unwrap()).unwrap();
        assert_eq!(restored.name(), Some("Jane Doe"));
        assert!(restored.entity().is_user());
        assert!(restored.is_authenticated());
        assert!(!restored.has_password());
    }

    #[test]
    fn test_flags() {
        let mut user = UsergridUser::new("jane");
        assert!(!user.activated());
        user.set_activated(true);
        user.set_age(33);
        assert!(user.activated());
        assert_eq!(user.age(), Some(33));

        user.entity_mut().set(DISABLED, json!(1));
        assert!(user.disabled());
    }
}
