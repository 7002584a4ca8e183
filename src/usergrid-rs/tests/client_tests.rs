//! Integration tests for the client facade against a mock Usergrid server
//!
//! Covers:
//! - URL and header assembly
//! - User and app authentication flows
//! - Cursor pagination
//! - Error classification
//! - Logout and client-side validation

use serde_json::json;
use std::sync::Arc;
use usergrid_rs::{
    AuthMode, CallbackContext, ClientConfig, ErrorKind, MemoryCredentialStore, UserAuth,
    UsergridClient, UsergridEntity, UsergridQuery, UsergridUser,
};
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const USER_UUID: &str = "5f1a8c3e-7b2d-11e6-8b77-86f30ca893d3";
const PET_UUID: &str = "9c2f7a10-7b2d-11e6-8b77-86f30ca893d3";

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new("acme", "sandbox").with_base_url(server.uri())
}

fn client(config: ClientConfig) -> UsergridClient {
    UsergridClient::builder(config)
        .callbacks(CallbackContext::from_fn(|job| job()))
        .build()
        .unwrap()
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "user-token",
        "expires_in": 604800,
        "user": {
            "type": "user",
            "uuid": USER_UUID,
            "username": "jane",
            "email": "jane@example.com"
        }
    })
}

async fn mount_password_grant(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/acme/sandbox/token"))
        .and(body_json(json!({
            "grant_type": "password",
            "username": "jane",
            "password": "secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(server)
        .await;
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_get_query_builds_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .and(query_param("limit", "5"))
        .and(query_param("ql", "select * where color = 'brown' order by age desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [
                {"type": "pet", "uuid": PET_UUID, "name": "fido", "color": "brown"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let query = UsergridQuery::new("pets")
        .eq("color", "brown")
        .desc("age")
        .limit(5);
    let response = client.get_query(query).await;

    assert!(response.ok(), "{:?}", response.error);
    assert_eq!(response.count(), 1);
    let pet = response.first().unwrap();
    assert_eq!(pet.name(), Some("fido"));
    assert_eq!(pet.get_str("color").as_deref(), Some("brown"));
    assert!(!response.has_next_page());
}

#[tokio::test]
async fn test_post_sends_json_without_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/pets"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(json!({"type": "pets", "name": "rex", "breed": "collie"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "pet", "uuid": PET_UUID, "name": "rex", "breed": "collie"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let mut pet = UsergridEntity::with_name("pets", "rex");
    pet.set("breed", json!("collie"));

    let response = client.save(&mut pet).await;
    assert!(response.ok(), "{:?}", response.error);
    assert_eq!(pet.uuid(), Some(PET_UUID));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_connection_paths() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/acme/sandbox/users/jane/likes/{}", PET_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/acme/sandbox/pets/{}/connecting/likes", PET_UUID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "user", "uuid": USER_UUID, "username": "jane"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let jane = UsergridEntity::with_name("users", "jane");
    let pet = UsergridEntity::from_json(json!({"type": "pets", "uuid": PET_UUID})).unwrap();

    assert!(client.connect(&jane, "likes", &pet).await.ok());

    let response = client
        .get_connections(usergrid_rs::Direction::In, &pet, "likes", None)
        .await;
    assert!(response.ok());
    assert!(response.first().unwrap().is_user());
    assert_eq!(response.users()[0].username().as_deref(), Some("jane"));
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_load_next_page_follows_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .and(query_param("cursor", "page-two"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "pet", "name": "third"}]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [
                {"type": "pet", "name": "first"},
                {"type": "pet", "name": "second"}
            ],
            "cursor": "page-two"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let first = client.get_query(UsergridQuery::new("pets").limit(2)).await;
    assert_eq!(first.count(), 2);
    assert_eq!(first.cursor.as_deref(), Some("page-two"));
    assert!(first.has_next_page());

    let second = first.load_next_page().await;
    assert!(second.ok(), "{:?}", second.error);
    assert_eq!(second.first().unwrap().name(), Some("third"));
    assert!(!second.has_next_page());

    let none = second.load_next_page().await;
    assert_eq!(none.error.unwrap().kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_raw_query_pages_with_single_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .and(query_param("ql", "select * where color = 'brown'"))
        .and(query_param("cursor", "page-two"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "pet", "name": "third"}]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .and(query_param("ql", "select * where color = 'brown'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "pet", "name": "first"}],
            "cursor": "page-two"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let query = UsergridQuery::from_string("select * where color = 'brown'").collection("pets");
    let first = client.get_query(query).await;
    assert!(first.ok(), "{:?}", first.error);
    assert!(first.has_next_page());

    let second = first.load_next_page().await;
    assert!(second.ok(), "{:?}", second.error);
    assert_eq!(second.first().unwrap().name(), Some("third"));

    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.url.query_pairs().filter(|(k, _)| k == "cursor").count(), 1);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_malformed_body_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets/fido"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let response = client.get_by_id("pets", "fido").await;

    assert!(!response.ok());
    assert_eq!(response.status, Some(200));
    assert_eq!(response.error.unwrap().kind, ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/acme/sandbox/pets/fido"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "error_description": "No credentials provided"
        })))
        .mount(&server)
        .await;

    let client = client(config(&server));
    let response = client.delete_by_id("pets", "fido").await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Protocol);
    assert_eq!(error.name, "unauthorized");
    assert_eq!(error.description, "No credentials provided");
    assert_eq!(response.status, Some(401));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let client = client(ClientConfig::new("acme", "sandbox").with_base_url("http://127.0.0.1:1"));
    let response = client.get("pets").await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::Transport);
    assert!(response.status.is_none());
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_user_auth_sets_current_user_and_bearer() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/pets"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(config(&server));
    let response = client
        .authenticate_user(UserAuth::new("jane", "secret"), true)
        .await;
    assert!(response.ok(), "{:?}", response.error);

    let user = client.current_user().unwrap();
    assert_eq!(user.uuid(), Some(USER_UUID));
    assert_eq!(user.email().as_deref(), Some("jane@example.com"));
    assert!(user.is_authenticated());

    assert!(client.get("pets").await.ok());
}

#[tokio::test]
async fn test_current_user_is_persisted() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;

    let store = Arc::new(MemoryCredentialStore::new());
    let build = || {
        UsergridClient::builder(config(&server))
            .callbacks(CallbackContext::from_fn(|job| job()))
            .credential_store(store.clone())
            .build()
            .unwrap()
    };

    let mut first = build();
    assert!(first
        .authenticate_user(UserAuth::new("jane", "secret"), true)
        .await
        .ok());
    assert_eq!(store.len(), 1);

    let restored = build();
    let user = restored.current_user().unwrap();
    assert_eq!(user.username().as_deref(), Some("jane"));
    assert_eq!(
        restored.auth_for_requests().unwrap().access_token(),
        Some("user-token")
    );
}

#[tokio::test]
async fn test_failed_grant_keeps_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "invalid username or password"
        })))
        .mount(&server)
        .await;

    let mut client = client(config(&server));
    let response = client
        .authenticate_user(UserAuth::new("jane", "wrong"), true)
        .await;

    assert_eq!(response.error.unwrap().name, "invalid_grant");
    assert!(client.current_user().is_none());
    assert!(client.auth_for_requests().is_none());
}

#[tokio::test]
async fn test_token_without_user_is_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "expires_in": 604800
        })))
        .mount(&server)
        .await;

    let mut client = client(config(&server));
    let response = client
        .authenticate_user(UserAuth::new("jane", "secret"), true)
        .await;

    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::MalformedResponse);
    assert_eq!(error.name, "auth_failed");
    assert!(client.current_user().is_none());
    assert!(client.auth_for_requests().is_none());
}

#[tokio::test]
async fn test_grant_without_access_token_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 604800,
            "user": {"type": "user", "uuid": USER_UUID, "username": "jane"}
        })))
        .mount(&server)
        .await;

    let config = config(&server).with_app_auth("YXA6client", "YXA6secret");
    let mut client = client(config);

    let response = client
        .authenticate_user(UserAuth::new("jane", "secret"), true)
        .await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::MalformedResponse);
    assert!(client.current_user().is_none());

    let response = client.authenticate_app().await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::MalformedResponse);
    assert!(!client.app_auth().unwrap().credential.is_valid());
}

#[tokio::test]
async fn test_app_auth_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/token"))
        .and(body_json(json!({
            "grant_type": "client_credentials",
            "client_id": "YXA6client",
            "client_secret": "YXA6secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "app-token",
            "expires_in": 604800
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/users"))
        .and(header("authorization", "Bearer app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server)
        .with_app_auth("YXA6client", "YXA6secret")
        .with_auth_mode(AuthMode::App);
    let mut client = client(config);

    let response = client.authenticate_app().await;
    assert!(response.ok(), "{:?}", response.error);
    assert!(client.app_auth().unwrap().credential.is_valid());

    assert!(client.get("users").await.ok());
}

#[tokio::test]
async fn test_app_auth_without_credentials_fails_locally() {
    let server = MockServer::start().await;
    let mut client = client(config(&server));

    let response = client.authenticate_app().await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::Validation);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_logout_current_user_revokes_token() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;

    Mock::given(method("PUT"))
        .and(path(format!("/acme/sandbox/users/{}/revoketoken", USER_UUID)))
        .and(query_param("token", "user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"action": "revoked user token"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(config(&server));
    client
        .authenticate_user(UserAuth::new("jane", "secret"), true)
        .await;

    let response = client.logout_current_user().await;
    assert!(response.ok(), "{:?}", response.error);
    assert!(client.current_user().is_none());

    let again = client.logout_current_user().await;
    assert_eq!(again.error.unwrap().kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_logout_all_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/acme/sandbox/users/jane/revoketokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    assert!(client.logout_user_all_tokens("jane").await.ok());
}

#[tokio::test]
async fn test_user_availability() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/acme/sandbox/users"))
        .and(query_param("ql", "select * where username = 'taken'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "user", "username": "taken"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/users"))
        .and(query_param("ql", "select * where username = 'free'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .mount(&server)
        .await;

    let client = client(config(&server));
    assert!(!client.check_user_availability(None, Some("taken")).await.unwrap());
    assert!(client.check_user_availability(None, Some("free")).await.unwrap());
}

#[tokio::test]
async fn test_create_user_sends_password() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/acme/sandbox/users"))
        .and(body_json(json!({
            "type": "user",
            "username": "sam",
            "email": "sam@example.com",
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{"type": "user", "uuid": USER_UUID, "username": "sam"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(config(&server));
    let user = UsergridUser::new("sam")
        .with_email("sam@example.com")
        .with_password("hunter2");
    let response = client.create_user(&user).await;
    assert!(response.ok(), "{:?}", response.error);
    assert_eq!(response.user().unwrap().uuid(), Some(USER_UUID));
}

#[tokio::test]
async fn test_entity_without_identity_is_rejected() {
    let server = MockServer::start().await;
    let client = client(config(&server));

    let anonymous = UsergridEntity::new("pets");
    let response = client.put(&anonymous).await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::Validation);

    let response = client.delete(&anonymous).await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::Validation);

    assert!(server.received_requests().await.unwrap().is_empty());
}
