/// JamRoom Server - collaboration room access and membership
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Database initialization
/// - HTTP server startup
use actix_web::web;
use anyhow::Context;
use std::fs;
use std::process;

use jamroom_server::config::Config;
use jamroom_server::db;
use jamroom_server::events::MembershipFeed;
use jamroom_server::handlers::ServerConfig;
use jamroom_server::server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting JamRoom Server");
    log::info!("Database: {:?}", config.database);
    log::info!("Port: {}", config.port);
    log::info!("Invite grant TTL: {}s", config.invite_ttl_seconds);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        let pid = process::id().to_string();
        fs::write(pidfile, pid).context("Failed to write PID file")?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    // Initialize database
    let db_path = config
        .database
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let pool = db::create_pool(db_path).context("Failed to create database pool")?;

    log::info!("Database initialized");

    let pool_data = web::Data::new(pool);
    let feed = web::Data::new(MembershipFeed::new());
    let server_config = web::Data::new(ServerConfig {
        invite_ttl_seconds: config.invite_ttl_seconds,
    });

    // Start HTTP server
    let bind_addr = format!("127.0.0.1:{}", config.port);
    log::info!("Starting HTTP server on {}", bind_addr);

    let http_server = server::create_http_server(pool_data, feed, server_config, &bind_addr)
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    http_server.await?;

    Ok(())
}
