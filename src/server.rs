/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.

use actix_web::{middleware, web, App, HttpServer};

use crate::db::DbPool;
use crate::events::MembershipFeed;
use crate::handlers::{
    create_room, delete_room, get_room, health, invite_users, join_room, leave_room,
    list_my_rooms, list_participants, list_public_rooms, manage_participant, update_room,
    validate_room_code, ServerConfig,
};

/// Route table shared by the binary, the test factory and endpoint tests.
/// `/rooms/mine`, `/rooms/join` and `/rooms/validate` must be registered
/// before the `/rooms/{room_id}` captures.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/rooms", web::post().to(create_room))
        .route("/rooms", web::get().to(list_public_rooms))
        .route("/rooms/mine", web::get().to(list_my_rooms))
        .route("/rooms/join", web::post().to(join_room))
        .route("/rooms/validate", web::post().to(validate_room_code))
        .route("/rooms/{room_id}", web::get().to(get_room))
        .route("/rooms/{room_id}", web::patch().to(update_room))
        .route("/rooms/{room_id}", web::delete().to(delete_room))
        .route("/rooms/{room_id}/leave", web::post().to(leave_room))
        .route("/rooms/{room_id}/invites", web::post().to(invite_users))
        .route(
            "/rooms/{room_id}/participants",
            web::get().to(list_participants),
        )
        .route(
            "/rooms/{room_id}/participants/{user_id}",
            web::post().to(manage_participant),
        );
}

/// Create a configured HTTP server
///
/// Takes the database pool, membership feed, runtime config and bind
/// address, then returns a fully configured `HttpServer` ready to be run.
pub fn create_http_server(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    server_config: web::Data<ServerConfig>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(feed.clone())
            .app_data(server_config.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server with an in-memory database.
/// Binds to a random available port; returns (server, bind_address).
pub fn create_test_http_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    let pool = web::Data::new(crate::db::create_test_pool());
    let feed = web::Data::new(MembershipFeed::new());
    let server_config = web::Data::new(ServerConfig {
        invite_ttl_seconds: 600,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(feed.clone())
            .app_data(server_config.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind("127.0.0.1:0")?;

    let addrs = server.addrs();
    let addr_str = addrs
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    let server = server.run();

    Ok((server, addr_str))
}
