//! Query Builder Example
//!
//! Builds a few queries and prints the URL fragments they render to. No
//! server is contacted.
//!
//! Run with: cargo run --example query_builder

use usergrid_rs::{ClientConfig, HttpMethod, UsergridQuery, UsergridRequest};

fn main() -> anyhow::Result<()> {
    println!("Usergrid Query Builder Example\n");

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(&path)?,
        None => ClientConfig::new("my-org", "sandbox"),
    };
    println!("App URL: {}\n", config.app_url());

    let queries = [
        (
            "Brown dogs, oldest first",
            UsergridQuery::new("pets")
                .eq("species", "dog")
                .and()
                .eq("color", "brown")
                .desc("age"),
        ),
        (
            "Restaurants nearby, excluding closed ones",
            UsergridQuery::new("restaurants")
                .location_within(2000.0, 37.776753, -122.407846)
                .not()
                .eq("closed", true)
                .limit(25),
        ),
        (
            "Cats or rabbits",
            UsergridQuery::new("pets")
                .eq("species", "cat")
                .or()
                .eq("species", "rabbit"),
        ),
        (
            "Raw query string",
            UsergridQuery::from_string("select * where name contains 'fid*'"),
        ),
    ];

    for (label, query) in queries {
        println!("{}", label);
        println!("  ql:      {}", query.ql_string().unwrap_or_default());
        println!("  decoded: {}", query);
        println!("  encoded: {}\n", query.build());
    }

    let request = UsergridRequest::new(HttpMethod::Get, config.app_url())
        .path("pets")
        .query(UsergridQuery::new("pets").gt("age", 3).cursor(Some("LTIxNDg0NDUxNDpnR2tBQVFFQWdITUFDWFJ2YlM1emJXbDBhQUM".into())));
    println!("Full request URL:\n  {}", request.url());

    Ok(())
}
