//! Activity Feed Example
//!
//! Logs in, posts a message to the current user's activity stream, follows
//! another user and pages through the feed.
//!
//! Run with:
//!   USERGRID_ORG=my-org USERGRID_APP=sandbox USERGRID_USER=jane USERGRID_PASSWORD=secret \
//!   cargo run --example activity_feed

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use usergrid_rs::{
    entity::CREATED, shared, ClientConfig, EntityKind, UserAuth, UsergridQuery,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("usergrid_rs=info,usergrid_core=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    let config = ClientConfig::new(env("USERGRID_ORG", "my-org"), env("USERGRID_APP", "sandbox"))
        .with_base_url(env("USERGRID_BASE_URL", "https://api.usergrid.com"))
        .with_persist_current_user(true);

    let client = shared::init_shared_instance(config)?;
    let mut client = client.lock().await;
    client.register_entity_type("activity", EntityKind::Entity);

    let auth = UserAuth::new(env("USERGRID_USER", "jane"), env("USERGRID_PASSWORD", "secret"));
    let response = client.authenticate_user(auth, true).await;
    if let Some(error) = response.error {
        anyhow::bail!("login failed: {}", error);
    }

    let user = client.current_user().cloned().ok_or_else(|| anyhow::anyhow!("no current user"))?;
    let display_name = user
        .name()
        .map(str::to_string)
        .or_else(|| user.username_or_email())
        .unwrap_or_default();
    println!("Logged in as {}\n", display_name);

    let mut actor = json!({
        "displayName": display_name,
        "email": user.email().unwrap_or_default(),
    });
    if let Some(picture) = user.picture() {
        actor["image"] = json!({"url": picture, "height": 80, "width": 80});
    }
    let posted = client
        .post_json(
            "users/me/activities",
            json!({"actor": actor, "verb": "post", "content": "Hello from Rust"}),
        )
        .await;
    println!("Posted message: {}", posted.ok());

    if let Ok(friend) = std::env::var("USERGRID_FOLLOW") {
        let followed = client
            .connect_by_id("users", "me", "following", Some("users"), &friend)
            .await;
        println!("Following {}: {}", friend, followed.ok());
    }

    let mut page = client
        .get_query(UsergridQuery::new("users/me/feed").desc(CREATED))
        .await;
    let mut number = 1;
    loop {
        if let Some(error) = &page.error {
            anyhow::bail!("feed request failed: {}", error);
        }
        println!("\nFeed page {} ({} messages)", number, page.count());
        for activity in &page.entities {
            let author = activity
                .get("actor")
                .and_then(|actor| actor.get("displayName").and_then(|n| n.as_str().map(str::to_string)))
                .unwrap_or_else(|| "unknown".to_string());
            let content = activity.get_str("content").unwrap_or_default();
            println!("  {}: {}", author, content);
        }

        if !page.has_next_page() || number == 3 {
            break;
        }
        page = page.load_next_page().await;
        number += 1;
    }

    Ok(())
}
