use serde_json::{json, Map, Value};
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use usergrid_core::user::{EMAIL, USERNAME};
use usergrid_core::{
    AppAuth, AssetUploadRequest, AuthMode, ClientConfig, Credential, CredentialStore, Direction,
    EntityKind, HttpMethod, MemoryCredentialStore, ResponseError, TypeRegistry, UserAuth,
    UsergridAsset, UsergridDevice, UsergridEntity, UsergridQuery, UsergridRequest,
    UsergridResponse, UsergridUser,
};

use crate::callback::{CallbackContext, DEFAULT_CALLBACK_THREAD};
use crate::manager::{DownloadResult, RequestManager};
use crate::session::SessionStore;
use crate::transfer::ProgressCallback;
use crate::{ClientError, Result};

const DEVICES: &str = "devices";
const USERS: &str = "users";

/// Usergrid application client
///
/// Owns the credentials for one org/app pair. Operations that change
/// authentication state take `&mut self`; everything else takes `&self`.
pub struct UsergridClient {
    config: ClientConfig,
    manager: RequestManager,
    session: SessionStore,
    registry: Arc<RwLock<TypeRegistry>>,
    app_auth: Option<AppAuth>,
    current_user: Option<UsergridUser>,
}

pub struct UsergridClientBuilder {
    config: ClientConfig,
    runtime: Option<Handle>,
    callbacks: Option<CallbackContext>,
    store: Option<Arc<dyn CredentialStore>>,
    registry: Option<TypeRegistry>,
}

impl UsergridClientBuilder {
    /// Runtime the client spawns network work on. Defaults to the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Where callback-style completions run. Defaults to a dedicated thread.
    pub fn callbacks(mut self, callbacks: CallbackContext) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<UsergridClient> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ClientError::NoRuntime)?,
        };
        let callbacks = match self.callbacks {
            Some(callbacks) => callbacks,
            None => CallbackContext::dedicated_thread(DEFAULT_CALLBACK_THREAD)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let registry = Arc::new(RwLock::new(self.registry.unwrap_or_default()));

        let manager = RequestManager::new(&self.config, registry.clone(), callbacks, runtime)?;
        let session = SessionStore::new(store, &self.config.org_id, &self.config.app_id);

        let current_user = if self.config.persist_current_user {
            match session.load_current_user() {
                Ok(user) => user,
                Err(e) => {
                    warn!("Could not restore current user: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let app_auth = self
            .config
            .app_auth
            .as_ref()
            .map(|app| AppAuth::new(app.client_id.clone(), app.client_secret.clone()));

        info!(
            "Usergrid client initialized for {}/{}",
            self.config.org_id, self.config.app_id
        );

        Ok(UsergridClient {
            config: self.config,
            manager,
            session,
            registry,
            app_auth,
            current_user,
        })
    }
}

impl UsergridClient {
    pub fn builder(config: ClientConfig) -> UsergridClientBuilder {
        UsergridClientBuilder {
            config,
            runtime: None,
            callbacks: None,
            store: None,
            registry: None,
        }
    }

    /// Client with default settings on the current runtime
    pub fn new(org_id: impl Into<String>, app_id: impl Into<String>) -> Result<Self> {
        Self::builder(ClientConfig::new(org_id, app_id)).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn app_url(&self) -> String {
        self.config.app_url()
    }

    pub fn request_manager(&self) -> &RequestManager {
        &self.manager
    }

    pub fn set_auth_mode(&mut self, mode: AuthMode) {
        self.config.auth_mode = mode;
    }

    pub fn app_auth(&self) -> Option<&AppAuth> {
        self.app_auth.as_ref()
    }

    pub fn set_app_auth(&mut self, auth: Option<AppAuth>) {
        self.app_auth = auth;
    }

    pub fn current_user(&self) -> Option<&UsergridUser> {
        self.current_user.as_ref()
    }

    /// Replace the current user, persisting it when configured to
    pub fn set_current_user(&mut self, user: Option<UsergridUser>) {
        if self.config.persist_current_user {
            let persisted = match &user {
                Some(user) => self.session.save_current_user(user),
                None => self.session.clear_current_user(),
            };
            if let Err(e) = persisted {
                warn!("Could not persist current user: {}", e);
            }
        }
        self.current_user = user;
    }

    /// Treat entities of `entity_type` as `kind` when parsing responses
    pub fn register_entity_type(&self, entity_type: &str, kind: EntityKind) {
        if let Ok(mut registry) = self.registry.write() {
            registry.map_kind(entity_type, kind);
        }
    }

    /// The credential attached to requests under the current auth mode
    pub fn auth_for_requests(&self) -> Option<Credential> {
        match self.config.auth_mode {
            AuthMode::None => None,
            AuthMode::User => self
                .current_user
                .as_ref()
                .and_then(UsergridUser::auth)
                .map(|auth| auth.credential.clone())
                .filter(Credential::is_valid),
            AuthMode::App => self
                .app_auth
                .as_ref()
                .map(|auth| auth.credential.clone())
                .filter(Credential::is_valid),
        }
    }

    /// A request against `<base>/<org>/<app>` carrying the current credential
    pub fn request(&self, method: HttpMethod) -> UsergridRequest {
        UsergridRequest::new(method, self.app_url()).auth(self.auth_for_requests())
    }

    fn token_request(&self, payload: Value) -> UsergridRequest {
        UsergridRequest::new(HttpMethod::Post, self.app_url())
            .path("token")
            .json(&payload)
    }

    // ----- authentication -----

    /// Run the `client_credentials` grant with the configured app credential
    pub async fn authenticate_app(&mut self) -> UsergridResponse {
        let Some(auth) = self.app_auth.clone() else {
            return invalid("no_app_auth", "No app credential has been configured.");
        };
        self.authenticate_app_with(auth).await
    }

    pub async fn authenticate_app_with(&mut self, auth: AppAuth) -> UsergridResponse {
        let request = self.token_request(auth.grant_payload());
        let outcome = self.manager.authenticate_app(request, auth).await;
        if outcome.response.ok() {
            self.app_auth = Some(outcome.auth);
        }
        outcome.response
    }

    /// Run the `password` grant. On success the user can become the current
    /// user, which also persists it.
    pub async fn authenticate_user(&mut self, auth: UserAuth, set_as_current: bool) -> UsergridResponse {
        let request = self.token_request(auth.grant_payload());
        let outcome = self.manager.authenticate_user(request, auth).await;
        if set_as_current {
            if let Some(user) = outcome.user {
                self.set_current_user(Some(user));
            }
        }
        outcome.response
    }

    /// Authenticate without touching the current user
    pub async fn login(&self, auth: UserAuth) -> (Option<UsergridUser>, UsergridResponse) {
        let request = self.token_request(auth.grant_payload());
        let outcome = self.manager.authenticate_user(request, auth).await;
        (outcome.user, outcome.response)
    }

    /// Repeat the current user's grant with the password held in memory
    pub async fn reauthenticate_current_user(&mut self) -> UsergridResponse {
        let Some(auth) = self
            .current_user
            .as_ref()
            .and_then(UsergridUser::auth)
            .filter(|auth| auth.has_password())
            .cloned()
        else {
            return invalid(
                "no_current_user",
                "No current user with a password to reauthenticate.",
            );
        };
        self.authenticate_user(auth, true).await
    }

    pub async fn logout_current_user(&mut self) -> UsergridResponse {
        let Some(user) = self.current_user.clone() else {
            return invalid("no_current_user", "No current user to log out.");
        };
        let (Some(id), Some(token)) = (
            user.uuid_or_username(),
            user.auth()
                .and_then(|auth| auth.credential.access_token())
                .map(str::to_string),
        ) else {
            return invalid("logout_failed", "Logout Failed.");
        };

        let response = self.logout_user(&id, Some(&token)).await;
        if response.ok() {
            info!("Logged out current user {}", id);
            self.set_current_user(None);
        }
        response
    }

    /// Revoke `token` for a user, or every token when `None`
    pub async fn logout_user(&self, uuid_or_username: &str, token: Option<&str>) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Put)
            .paths([USERS, uuid_or_username]);
        let request = match token {
            Some(token) => request.path("revoketoken").query_param("token", token),
            None => request.path("revoketokens"),
        };
        self.manager.send(request).await
    }

    pub async fn logout_user_all_tokens(&self, uuid_or_username: &str) -> UsergridResponse {
        self.logout_user(uuid_or_username, None).await
    }

    pub async fn reset_password(
        &self,
        user: &UsergridUser,
        old_password: &str,
        new_password: &str,
    ) -> UsergridResponse {
        let Some(id) = user.uuid_or_username() else {
            return invalid("reset_password_failed", "User has neither a uuid nor a username.");
        };
        let request = self
            .request(HttpMethod::Put)
            .paths([USERS, id.as_str(), "password"])
            .json(&json!({"oldpassword": old_password, "newpassword": new_password}));
        self.manager.send(request).await
    }

    /// `true` when no user has the given email or username
    pub async fn check_user_availability(
        &self,
        email: Option<&str>,
        username: Option<&str>,
    ) -> std::result::Result<bool, ResponseError> {
        let query = match (email, username) {
            (Some(email), Some(username)) => {
                UsergridQuery::new(USERS).eq(EMAIL, email).or().eq(USERNAME, username)
            }
            (Some(email), None) => UsergridQuery::new(USERS).eq(EMAIL, email),
            (None, Some(username)) => UsergridQuery::new(USERS).eq(USERNAME, username),
            (None, None) => {
                return Err(ResponseError::validation(
                    "availability_check_failed",
                    "An email or username is required.",
                ))
            }
        };
        let response = self.get_query(query).await;
        match response.error {
            Some(error) => Err(error),
            None => Ok(response.entities.is_empty()),
        }
    }

    pub async fn create_user(&self, user: &UsergridUser) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Post)
            .path(USERS)
            .json(&user.create_payload());
        self.manager.send(request).await
    }

    // ----- reads -----

    pub async fn get(&self, collection: &str) -> UsergridResponse {
        self.get_query(UsergridQuery::new(collection)).await
    }

    pub async fn get_by_id(&self, entity_type: &str, uuid_or_name: &str) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Get)
            .paths([entity_type, uuid_or_name]);
        self.manager.send(request).await
    }

    pub async fn get_query(&self, query: UsergridQuery) -> UsergridResponse {
        let Some(collection) = query.collection_name().map(str::to_string) else {
            return invalid("invalid_query", "Query has no collection.");
        };
        let request = self
            .request(HttpMethod::Get)
            .paths(collection.split('/'))
            .query(query);
        self.manager.send_paged(request).await
    }

    // ----- writes -----

    /// PUT an entity by uuid or name
    pub async fn put(&self, entity: &UsergridEntity) -> UsergridResponse {
        let Some(id) = entity.uuid_or_name() else {
            return no_identity();
        };
        self.put_by_id(entity.entity_type(), id, entity.to_json()).await
    }

    pub async fn put_by_id(&self, entity_type: &str, uuid_or_name: &str, body: Value) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Put)
            .paths([entity_type, uuid_or_name])
            .json(&body);
        self.manager.send(request).await
    }

    /// Apply `updates` to every entity matching `query`
    pub async fn put_query(&self, query: UsergridQuery, updates: Map<String, Value>) -> UsergridResponse {
        let Some(collection) = query.collection_name().map(str::to_string) else {
            return invalid("invalid_query", "Query has no collection.");
        };
        let request = self
            .request(HttpMethod::Put)
            .paths(collection.split('/'))
            .query(query)
            .json(&updates);
        self.manager.send(request).await
    }

    pub async fn post(&self, entity: &UsergridEntity) -> UsergridResponse {
        self.post_json(entity.entity_type(), entity.to_json()).await
    }

    /// POST several entities of one type in a single request
    pub async fn post_many(&self, entities: &[UsergridEntity]) -> UsergridResponse {
        let Some(first) = entities.first() else {
            return invalid("invalid_entities", "No entities to create.");
        };
        let entity_type = first.entity_type().to_string();
        if entities.iter().any(|e| e.entity_type() != entity_type) {
            return invalid("invalid_entities", "Entities must share one type.");
        }
        let body: Vec<Value> = entities.iter().map(UsergridEntity::to_json).collect();
        self.post_json(&entity_type, Value::Array(body)).await
    }

    /// POST a raw body to a collection path such as `users/me/activities`
    pub async fn post_json(&self, entity_type: &str, body: Value) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Post)
            .paths(entity_type.split('/'))
            .json(&body);
        self.manager.send(request).await
    }

    pub async fn delete(&self, entity: &UsergridEntity) -> UsergridResponse {
        let Some(id) = entity.uuid_or_name() else {
            return no_identity();
        };
        self.delete_by_id(entity.entity_type(), id).await
    }

    pub async fn delete_by_id(&self, entity_type: &str, uuid_or_name: &str) -> UsergridResponse {
        let request = self
            .request(HttpMethod::Delete)
            .paths([entity_type, uuid_or_name]);
        self.manager.send(request).await
    }

    pub async fn delete_query(&self, query: UsergridQuery) -> UsergridResponse {
        let Some(collection) = query.collection_name().map(str::to_string) else {
            return invalid("invalid_query", "Query has no collection.");
        };
        let request = self
            .request(HttpMethod::Delete)
            .paths(collection.split('/'))
            .query(query);
        self.manager.send(request).await
    }

    // ----- entity lifecycle -----

    /// PUT when the entity has a uuid, POST otherwise; then adopt the
    /// server's copy
    pub async fn save(&self, entity: &mut UsergridEntity) -> UsergridResponse {
        let response = if entity.uuid().is_some_and(|u| !u.is_empty()) {
            self.put(entity).await
        } else {
            self.post(entity).await
        };
        adopt_first(entity, &response);
        response
    }

    pub async fn reload(&self, entity: &mut UsergridEntity) -> UsergridResponse {
        let Some(id) = entity.uuid_or_name().map(str::to_string) else {
            return invalid("entity_not_reloadable", "Entity cannot be reloaded.");
        };
        let response = self.get_by_id(entity.entity_type(), &id).await;
        adopt_first(entity, &response);
        response
    }

    pub async fn remove(&self, entity: &UsergridEntity) -> UsergridResponse {
        self.delete(entity).await
    }

    // ----- connections -----

    /// Connect `entity` to `to` through `relationship`
    pub async fn connect(
        &self,
        entity: &UsergridEntity,
        relationship: &str,
        to: &UsergridEntity,
    ) -> UsergridResponse {
        match connection_paths(entity, relationship, to) {
            Some(paths) => self.send_connection(HttpMethod::Post, paths).await,
            None => no_identity(),
        }
    }

    pub async fn connect_by_id(
        &self,
        entity_type: &str,
        entity_id: &str,
        relationship: &str,
        to_type: Option<&str>,
        to_id: &str,
    ) -> UsergridResponse {
        let paths = id_connection_paths(entity_type, entity_id, relationship, to_type, to_id);
        self.send_connection(HttpMethod::Post, paths).await
    }

    pub async fn disconnect(
        &self,
        entity: &UsergridEntity,
        relationship: &str,
        from: &UsergridEntity,
    ) -> UsergridResponse {
        match connection_paths(entity, relationship, from) {
            Some(paths) => self.send_connection(HttpMethod::Delete, paths).await,
            None => no_identity(),
        }
    }

    pub async fn disconnect_by_id(
        &self,
        entity_type: &str,
        entity_id: &str,
        relationship: &str,
        from_type: Option<&str>,
        from_id: &str,
    ) -> UsergridResponse {
        let paths = id_connection_paths(entity_type, entity_id, relationship, from_type, from_id);
        self.send_connection(HttpMethod::Delete, paths).await
    }

    async fn send_connection(&self, method: HttpMethod, paths: Vec<String>) -> UsergridResponse {
        let request = self.request(method).paths(paths);
        self.manager.send(request).await
    }

    /// Entities connected to (`Out`) or from (`In`) `entity`
    pub async fn get_connections(
        &self,
        direction: Direction,
        entity: &UsergridEntity,
        relationship: &str,
        query: Option<UsergridQuery>,
    ) -> UsergridResponse {
        let Some(id) = entity.uuid_or_name() else {
            return no_identity();
        };
        let request = self
            .request(HttpMethod::Get)
            .paths([entity.entity_type(), id, direction.path_segment(), relationship])
            .maybe_query(query);
        self.manager.send_paged(request).await
    }

    pub async fn connect_to_device(&self, user: &UsergridUser, device: &UsergridDevice) -> UsergridResponse {
        self.user_device_connection(HttpMethod::Post, user, device).await
    }

    pub async fn disconnect_from_device(&self, user: &UsergridUser, device: &UsergridDevice) -> UsergridResponse {
        self.user_device_connection(HttpMethod::Delete, user, device).await
    }

    async fn user_device_connection(
        &self,
        method: HttpMethod,
        user: &UsergridUser,
        device: &UsergridDevice,
    ) -> UsergridResponse {
        let (Some(user_id), Some(device_id)) =
            (user.uuid_or_username(), device.entity().uuid_or_name())
        else {
            return no_identity();
        };
        let request = self
            .request(method)
            .paths([USERS, user_id.as_str(), DEVICES, device_id]);
        self.manager.send(request).await
    }

    pub async fn get_connected_device(&self, user: &UsergridUser) -> UsergridResponse {
        let Some(user_id) = user.uuid_or_username() else {
            return no_identity();
        };
        let request = self.request(HttpMethod::Get).paths([
            USERS,
            user_id.as_str(),
            Direction::Out.path_segment(),
            DEVICES,
        ]);
        self.manager.send(request).await
    }

    // ----- assets -----

    /// Upload `asset` to `entity`. On success the entity adopts the server's
    /// copy and keeps the asset attached.
    pub async fn upload_asset(
        &self,
        entity: &mut UsergridEntity,
        asset: UsergridAsset,
        progress: Option<ProgressCallback>,
    ) -> UsergridResponse {
        let Some(request) = self.asset_upload_request(entity, asset.clone()) else {
            return no_identity();
        };
        let response = self.manager.upload_asset(request, progress).await;
        if response.ok() {
            adopt_first(entity, &response);
            entity.attach_asset(asset);
        }
        response
    }

    pub fn asset_upload_request(&self, entity: &UsergridEntity, asset: UsergridAsset) -> Option<AssetUploadRequest> {
        let id = entity.uuid_or_name()?.to_string();
        let entity_type = entity.entity_type().to_string();
        let auth = self.auth_for_requests();
        Some(
            AssetUploadRequest::new(self.app_url(), asset)
                .with_request(|request| request.paths([entity_type, id]).auth(auth)),
        )
    }

    /// Download the asset attached to `entity` and attach it locally
    pub async fn download_asset(
        &self,
        entity: &mut UsergridEntity,
        content_type: &str,
        progress: Option<ProgressCallback>,
    ) -> DownloadResult {
        let Some(request) = self.asset_download_request(entity, content_type) else {
            return Err(no_identity_error());
        };
        let mut asset = self.manager.download_asset(request, progress).await?;
        if let Some(name) = entity.name() {
            asset.filename = name.to_string();
        }
        entity.attach_asset(asset.clone());
        Ok(asset)
    }

    pub fn asset_download_request(&self, entity: &UsergridEntity, content_type: &str) -> Option<UsergridRequest> {
        let id = entity.uuid_or_name()?;
        Some(
            self.request(HttpMethod::Get)
                .paths([entity.entity_type(), id])
                .header("Accept", content_type),
        )
    }

    // ----- devices -----

    /// The device describing this host, created and stored on first use
    pub fn shared_device(&self) -> Result<UsergridDevice> {
        self.session.load_or_create_shared_device()
    }

    /// Save a device; the stored shared device is refreshed when it is the one saved
    pub async fn save_device(&self, device: &mut UsergridDevice) -> UsergridResponse {
        let response = self.save(device.entity_mut()).await;
        if response.ok() {
            self.refresh_shared_device(device);
        }
        response
    }

    /// Record `push_token` for `notifier_id` on the device and send it
    pub async fn apply_push_token(
        &self,
        device: &mut UsergridDevice,
        push_token: &[u8],
        notifier_id: &str,
    ) -> UsergridResponse {
        device.apply_push_token(push_token, notifier_id);
        let Some(id) = device.entity().uuid_or_name().map(str::to_string) else {
            return invalid("device_not_identified", "Device has neither a uuid nor a name.");
        };
        let key = UsergridDevice::push_token_key(notifier_id);
        let mut body = Map::new();
        if let Some(token) = device.push_token(notifier_id) {
            body.insert(key, Value::String(token));
        }
        let response = self.put_by_id(DEVICES, &id, Value::Object(body)).await;
        if response.ok() {
            self.refresh_shared_device(device);
        }
        response
    }

    fn refresh_shared_device(&self, device: &UsergridDevice) {
        let is_shared = match self.session.load_or_create_shared_device() {
            Ok(shared) => shared.entity().same_identity(device.entity()),
            Err(e) => {
                warn!("Could not read shared device: {}", e);
                false
            }
        };
        if is_shared {
            if let Err(e) = self.session.save_shared_device(device) {
                warn!("Could not store shared device: {}", e);
            } else {
                debug!("Stored shared device");
            }
        }
    }
}

impl std::fmt::Debug for UsergridClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsergridClient")
            .field("app_url", &self.app_url())
            .field("auth_mode", &self.config.auth_mode)
            .field("current_user", &self.current_user.as_ref().and_then(|u| u.username()))
            .finish()
    }
}

fn invalid(name: &str, description: &str) -> UsergridResponse {
    UsergridResponse::from_error(ResponseError::validation(name, description))
}

fn no_identity_error() -> ResponseError {
    ResponseError::validation(
        "entity_not_identified",
        "Entity has neither a uuid nor a name specified.",
    )
}

fn no_identity() -> UsergridResponse {
    UsergridResponse::from_error(no_identity_error())
}

fn adopt_first(entity: &mut UsergridEntity, response: &UsergridResponse) {
    if let (true, Some(fresh)) = (response.ok(), response.first()) {
        entity.copy_internals_from(fresh);
    }
}

/// `<type>/<id>/<relationship>/<to uuid>`, or `.../<to type>/<to name>`
/// when the target has no uuid
fn connection_paths(entity: &UsergridEntity, relationship: &str, to: &UsergridEntity) -> Option<Vec<String>> {
    let id = entity.uuid_or_name()?;
    let mut paths = vec![
        entity.entity_type().to_string(),
        id.to_string(),
        relationship.to_string(),
    ];
    match to.uuid().filter(|u| !u.is_empty()) {
        Some(uuid) => paths.push(uuid.to_string()),
        None => {
            paths.push(to.entity_type().to_string());
            paths.push(to.name().filter(|n| !n.is_empty())?.to_string());
        }
    }
    Some(paths)
}

fn id_connection_paths(
    entity_type: &str,
    entity_id: &str,
    relationship: &str,
    to_type: Option<&str>,
    to_id: &str,
) -> Vec<String> {
    let mut paths = vec![
        entity_type.to_string(),
        entity_id.to_string(),
        relationship.to_string(),
    ];
    if let Some(to_type) = to_type {
        paths.push(to_type.to_string());
    }
    paths.push(to_id.to_string());
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_paths() {
        let owner = UsergridEntity::with_name("owners", "jane");
        let pet = UsergridEntity::with_name("pets", "fido");
        assert_eq!(
            connection_paths(&owner, "likes", &pet).unwrap(),
            vec!["owners", "jane", "likes", "pets", "fido"]
        );

        let anonymous = UsergridEntity::new("pets");
        assert!(connection_paths(&owner, "likes", &anonymous).is_none());
        assert!(connection_paths(&anonymous, "likes", &pet).is_none());

        assert_eq!(
            id_connection_paths("users", "u1", "devices", None, "d1"),
            vec!["users", "u1", "devices", "d1"]
        );
    }

    #[tokio::test]
    async fn test_auth_for_requests_follows_mode() {
        let config = ClientConfig::new("o", "a").with_auth_mode(AuthMode::App);
        let mut client = UsergridClient::builder(config)
            .callbacks(CallbackContext::from_fn(|job| job()))
            .build()
            .unwrap();
        assert!(client.auth_for_requests().is_none());

        let mut app = AppAuth::new("id", "secret");
        app.credential = Credential::from_token("app-token", None);
        client.set_app_auth(Some(app));
        assert_eq!(
            client.auth_for_requests().unwrap().access_token(),
            Some("app-token")
        );

        client.set_auth_mode(AuthMode::None);
        assert!(client.auth_for_requests().is_none());
    }

    #[tokio::test]
    async fn test_validation_errors_skip_network() {
        let client = UsergridClient::builder(ClientConfig::new("o", "a").with_base_url("http://127.0.0.1:9"))
            .callbacks(CallbackContext::from_fn(|job| job()))
            .build()
            .unwrap();

        let mut anonymous = UsergridEntity::new("pets");
        let response = client.reload(&mut anonymous).await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, usergrid_core::ErrorKind::Validation);
        assert_eq!(error.description, "Entity cannot be reloaded.");

        let response = client.remove(&anonymous).await;
        assert_eq!(response.error.unwrap().kind, usergrid_core::ErrorKind::Validation);

        let availability = client.check_user_availability(None, None).await;
        assert!(availability.is_err());
    }

    #[test]
    fn test_builder_requires_runtime() {
        let result = UsergridClient::builder(ClientConfig::new("o", "a"))
            .callbacks(CallbackContext::from_fn(|job| job()))
            .build();
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }
}
