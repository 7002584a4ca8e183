//! Asset Transfer Example
//!
//! Creates an entity, uploads a file to it with progress reporting and
//! downloads it back through the callback-style API.
//!
//! Run with: cargo run --example asset_transfer -- ./photo.png

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use usergrid_rs::{
    AuthMode, ClientConfig, ProgressCallback, UsergridAsset, UsergridClient, UsergridEntity,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("usergrid_rs=debug"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()?;

    let path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: asset_transfer <file>"))?;

    let mut config = ClientConfig::new("my-org", "sandbox").with_auth_mode(AuthMode::App);
    if let (Ok(id), Ok(secret)) = (std::env::var("USERGRID_CLIENT_ID"), std::env::var("USERGRID_CLIENT_SECRET")) {
        config = config.with_app_auth(id, secret);
    }
    let mut client = UsergridClient::builder(config).build()?;
    if client.app_auth().is_some() {
        let response = client.authenticate_app().await;
        println!("App authenticated: {}", response.ok());
    }

    let mut photo = UsergridEntity::with_name("photos", "example-photo");
    let response = client.save(&mut photo).await;
    if let Some(error) = response.error {
        anyhow::bail!("could not create entity: {}", error);
    }
    println!("Created photo {}", photo.uuid().unwrap_or("?"));

    let asset = UsergridAsset::from_file(&path, "image/png")?;
    let upload_progress: ProgressCallback = Arc::new(|sent: u64, total: Option<u64>| {
        println!("  uploaded {} of {} bytes", sent, total.unwrap_or(0));
    });
    let response = client.upload_asset(&mut photo, asset, Some(upload_progress)).await;
    if let Some(error) = response.error {
        anyhow::bail!("upload failed: {}", error);
    }
    if let Some(meta) = photo.file_metadata() {
        println!("Server stored {} bytes ({:?})", meta.content_length, meta.content_type);
    }

    let request = client
        .asset_download_request(&photo, "image/png")
        .ok_or_else(|| anyhow::anyhow!("photo has no identity"))?;
    let download_progress: ProgressCallback = Arc::new(|received: u64, total: Option<u64>| {
        let thread = std::thread::current().name().unwrap_or("?").to_string();
        println!("  [{}] downloaded {} of {:?} bytes", thread, received, total);
    });

    let (tx, rx) = oneshot::channel();
    let id = client
        .request_manager()
        .perform_asset_download(request, Some(download_progress), move |result| {
            let _ = tx.send(result);
        });
    println!("Download {} started", id);

    match rx.await? {
        Ok(asset) => println!("Downloaded {} bytes of {}", asset.content_length(), asset.content_type),
        Err(error) => anyhow::bail!("download failed: {}", error),
    }

    let response = client.remove(&photo).await;
    println!("Removed photo: {}", response.ok());

    Ok(())
}
