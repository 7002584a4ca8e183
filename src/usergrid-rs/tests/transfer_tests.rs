//! Asset transfers and callback delivery against a mock server

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use usergrid_rs::{
    CallbackContext, ClientConfig, ErrorKind, HttpMethod, ProgressCallback, UsergridAsset,
    UsergridClient, UsergridEntity, UsergridResponse, DEFAULT_CALLBACK_THREAD,
};
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const SMALL_UUID: &str = "1d0c3e52-7b30-11e6-8b77-86f30ca893d3";
const LARGE_UUID: &str = "2e1d4f63-7b30-11e6-8b77-86f30ca893d3";

type Seen = Arc<Mutex<Vec<(u64, Option<u64>)>>>;

fn inline_client(server: &MockServer) -> UsergridClient {
    UsergridClient::builder(ClientConfig::new("acme", "sandbox").with_base_url(server.uri()))
        .callbacks(CallbackContext::from_fn(|job| job()))
        .build()
        .unwrap()
}

fn recorder() -> (Seen, ProgressCallback) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |so_far: u64, total: Option<u64>| {
        sink.lock().unwrap().push((so_far, total));
    });
    (seen, callback)
}

fn photo(uuid: &str) -> UsergridEntity {
    UsergridEntity::from_json(json!({"type": "photos", "uuid": uuid, "name": "sunset"})).unwrap()
}

async fn mount_image(server: &MockServer, uuid: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/acme/sandbox/photos/{}", uuid)))
        .and(header("accept", "image/png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(body),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_downloads_are_isolated() {
    let server = MockServer::start().await;
    let small = vec![7u8; 1_000];
    let large = vec![9u8; 200_000];
    mount_image(&server, SMALL_UUID, small.clone()).await;
    mount_image(&server, LARGE_UUID, large.clone()).await;

    let client = inline_client(&server);
    let manager = client.request_manager();

    let (small_seen, small_progress) = recorder();
    let (large_seen, large_progress) = recorder();
    let (small_tx, small_rx) = oneshot::channel();
    let (large_tx, large_rx) = oneshot::channel();

    let small_request = client
        .asset_download_request(&photo(SMALL_UUID), "image/png")
        .unwrap();
    let large_request = client
        .asset_download_request(&photo(LARGE_UUID), "image/png")
        .unwrap();

    let small_id = manager.perform_asset_download(small_request, Some(small_progress), move |result| {
        let _ = small_tx.send(result);
    });
    let large_id = manager.perform_asset_download(large_request, Some(large_progress), move |result| {
        let _ = large_tx.send(result);
    });
    assert_ne!(small_id, large_id);

    let small_asset = small_rx.await.unwrap().unwrap();
    let large_asset = large_rx.await.unwrap().unwrap();

    assert_eq!(small_asset.data, small);
    assert_eq!(small_asset.content_type, "image/png");
    assert_eq!(large_asset.data, large);

    let small_seen = small_seen.lock().unwrap().clone();
    let large_seen = large_seen.lock().unwrap().clone();
    assert_eq!(small_seen.last(), Some(&(1_000, Some(1_000))));
    assert_eq!(large_seen.last(), Some(&(200_000, Some(200_000))));
    assert!(small_seen.iter().all(|(so_far, _)| *so_far <= 1_000));
    assert!(large_seen.windows(2).all(|w| w[0].0 < w[1].0));

    assert_eq!(manager.active_transfers(), 0);
}

#[tokio::test]
async fn test_download_attaches_asset() {
    let server = MockServer::start().await;
    mount_image(&server, SMALL_UUID, b"png-bytes".to_vec()).await;

    let client = inline_client(&server);
    let mut entity = photo(SMALL_UUID);
    let asset = client.download_asset(&mut entity, "image/png", None).await.unwrap();

    assert_eq!(asset.data, b"png-bytes");
    assert_eq!(asset.filename, "sunset");
    assert!(entity.has_asset());
}

#[tokio::test]
async fn test_empty_download_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/acme/sandbox/photos/{}", SMALL_UUID)))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = inline_client(&server);
    let mut entity = photo(SMALL_UUID);
    let error = client
        .download_asset(&mut entity, "image/png", None)
        .await
        .unwrap_err();

    assert_eq!(error.name, "Download Failed.");
    assert!(!entity.has_asset());
}

/// Answers one request with a header claiming far more body than it sends
async fn spawn_lying_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-length: 100000000000000\r\ncontent-type: image/png\r\n\r\nabc",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_oversized_content_length_fails_cleanly() {
    let base_url = spawn_lying_server().await;
    let client = UsergridClient::builder(ClientConfig::new("acme", "sandbox").with_base_url(base_url))
        .callbacks(CallbackContext::from_fn(|job| job()))
        .build()
        .unwrap();
    let manager = client.request_manager();

    let (tx, rx) = oneshot::channel();
    let request = client
        .asset_download_request(&photo(SMALL_UUID), "image/png")
        .unwrap();
    manager.perform_asset_download(request, None, move |result| {
        let _ = tx.send(result);
    });

    let result = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .unwrap()
        .unwrap();
    let error = result.unwrap_err();
    assert_eq!(error.kind, ErrorKind::Transport);
    assert_eq!(manager.active_transfers(), 0);
}

#[tokio::test]
async fn test_cancelled_download_deregisters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/acme/sandbox/photos/{}", SMALL_UUID)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1u8; 16])
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = inline_client(&server);
    let manager = client.request_manager();
    let request = client
        .asset_download_request(&photo(SMALL_UUID), "image/png")
        .unwrap();
    let (_seen, progress) = recorder();

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        manager.download_asset(request, Some(progress)),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(manager.active_transfers(), 0);
}

#[tokio::test]
async fn test_upload_sends_multipart_with_progress() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/acme/sandbox/photos/{}", SMALL_UUID)))
        .and(header(
            "content-type",
            "multipart/form-data; boundary=usergrid-asset-upload-boundary",
        ))
        .and(body_string_contains("filename=sunset.png"))
        .and(body_string_contains("Content-Type: image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{
                "type": "photo",
                "uuid": SMALL_UUID,
                "name": "sunset",
                "file-metadata": {
                    "content-type": "image/png",
                    "content-length": 150000,
                    "checksum": "abc123"
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = inline_client(&server);
    let mut entity = photo(SMALL_UUID);
    let asset = UsergridAsset::new(Some("sunset.png".to_string()), vec![b'x'; 150_000], "image/png");
    let (seen, progress) = recorder();

    let response = client.upload_asset(&mut entity, asset, Some(progress)).await;
    assert!(response.ok(), "{:?}", response.error);

    let seen = seen.lock().unwrap().clone();
    assert!(seen.len() >= 2);
    let (so_far, total) = *seen.last().unwrap();
    assert_eq!(Some(so_far), total);

    assert!(entity.has_asset());
    let metadata = entity.file_metadata().unwrap();
    assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn test_completion_runs_on_callback_thread() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .mount(&server)
        .await;

    let client = UsergridClient::builder(ClientConfig::new("acme", "sandbox").with_base_url(server.uri()))
        .build()
        .unwrap();

    let (tx, rx) = oneshot::channel();
    let request = client.request(HttpMethod::Get).path("photos");
    client
        .request_manager()
        .perform_request(request, move |response: UsergridResponse| {
            let thread = std::thread::current().name().map(str::to_string);
            let _ = tx.send((thread, response.ok()));
        });

    let (thread, ok) = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thread.as_deref(), Some(DEFAULT_CALLBACK_THREAD));
    assert!(ok);
}

#[tokio::test]
async fn test_callbacks_queue_until_pumped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/photos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"entities": []})))
        .mount(&server)
        .await;

    let (callbacks, mut pump) = CallbackContext::channel();
    let client = UsergridClient::builder(ClientConfig::new("acme", "sandbox").with_base_url(server.uri()))
        .callbacks(callbacks)
        .build()
        .unwrap();

    let delivered = Arc::new(Mutex::new(None));
    let sink = delivered.clone();
    let request = client.request(HttpMethod::Get).path("photos");
    client
        .request_manager()
        .perform_request(request, move |response| {
            *sink.lock().unwrap() = Some(response.ok());
        });

    assert!(pump.run_next().await);
    assert_eq!(*delivered.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_shutdown_drops_pending_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/acme/sandbox/photos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"entities": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = inline_client(&server);
    let (tx, rx) = oneshot::channel::<bool>();
    let request = client.request(HttpMethod::Get).path("photos");
    client
        .request_manager()
        .perform_request(request, move |response| {
            let _ = tx.send(response.ok());
        });
    drop(client);

    let outcome = tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap();
    assert!(outcome.is_err());
}
