mod auth_token;
mod cache;
mod commands;
mod config;
mod context;
mod db;
mod error;
mod events;
mod forum;
mod gateway;
mod geometry;
mod handlers;
mod middleware;
mod pathfinding;
mod workers;

use std::sync::Arc;

use actix_web::{middleware as actix_middleware, web, App, HttpServer};

use auth_token::{now_epoch, AuthTokenService};
use cache::GameCache;
use commands::CommandDispatcher;
use config::GameConfig;
use context::ServerContext;
use db::PgContext;
use events::EventBus;
use forum::ForumAuthClient;
use gateway::start_gateway;
use middleware::auth_middleware;
use pathfinding::{PathfindingService, WorldGrid};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env if present (for development).
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting game server...");
    log::info!("Protocol version: {}", protocol::protocol_version());

    let config = GameConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });
    let config = Arc::new(config);

    log::info!("Connecting to Postgres at {}...", config.database.url);
    let db = PgContext::connect(&config.database.url, config.database.max_connections)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to connect to Postgres: {}", e);
            std::process::exit(1);
        });

    db.init_schema().await.unwrap_or_else(|e| {
        eprintln!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    });

    log::info!("Connecting to Redis at {}...", config.cache.url);
    let game_cache = GameCache::connect(&config.cache.url)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        });

    game_cache.preload_catalog(&db).await.unwrap_or_else(|e| {
        eprintln!("Failed to preload the item catalog: {}", e);
        std::process::exit(1);
    });

    // The ingame clock row must exist before the world-time worker runs.
    db.server_time()
        .get_or_init(now_epoch())
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize the server clock: {}", e);
            std::process::exit(1);
        });

    let regions = match db.map_data().all_regions().await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| match row.to_data() {
                Ok(data) => Some(data),
                Err(err) => {
                    log::warn!("region {} is malformed: {err}", row.region_id);
                    None
                }
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            eprintln!("Failed to load map regions: {}", e);
            std::process::exit(1);
        }
    };
    log::info!("Loaded {} map regions", regions.len());
    let pathfinder = PathfindingService::new(WorldGrid::from_regions(&regions));

    let spawns = db.spawns().all().await.unwrap_or_else(|e| {
        eprintln!("Failed to load collectable spawns: {}", e);
        std::process::exit(1);
    });
    log::info!("Loaded {} collectable spawns", spawns.len());

    let auth_tokens = AuthTokenService::new(
        config.auth.token_secret.clone().into_bytes(),
        std::time::Duration::from_secs(config.auth.token_ttl_hours * 3600),
    )
    .unwrap_or_else(|e| {
        eprintln!("Invalid auth token secret: {}", e);
        std::process::exit(1);
    });

    let forum = ForumAuthClient::new(config.forum.verify_url.clone(), config.forum_timeout())
        .unwrap_or_else(|e| {
            eprintln!("Failed to build the forum client: {}", e);
            std::process::exit(1);
        });

    let bus = EventBus::new();

    let ctx = ServerContext::new(
        config.clone(),
        db.clone(),
        game_cache.clone(),
        bus,
        pathfinder,
        auth_tokens,
        forum,
        spawns,
    );

    let worker_set = workers::spawn_all(&ctx);
    log::info!("Tick workers started");

    let dispatcher = CommandDispatcher::new(ctx.clone());
    let gateway_handle = start_gateway(ctx.clone(), dispatcher)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to start the socket gateway: {}", e);
            std::process::exit(1);
        });
    log::info!("Socket gateway listening at {}", gateway_handle.local_addr());

    let http_host = config.http.host.clone();
    let http_port = config.http.port;
    log::info!("Starting HTTP server at {}:{}...", http_host, http_port);

    let ctx_for_app = ctx.clone();
    let http_result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ctx_for_app.clone()))
            .wrap(actix_middleware::Logger::default())
            .wrap(actix_middleware::Compress::default())
            // Public routes
            .service(handlers::health_check)
            .service(handlers::login)
            // Protected routes
            .service(
                web::scope("")
                    .wrap(actix_middleware::from_fn(auth_middleware))
                    .service(handlers::select_realm)
                    .service(handlers::get_settings)
                    .service(handlers::put_settings)
                    .service(handlers::list_screenshots)
                    .service(handlers::upload_screenshot)
                    .service(handlers::delete_screenshot),
            )
    })
    .bind((http_host, http_port))?
    .run()
    .await;

    // Shutdown cascade: no new sockets, workers drain, buffers flush.
    log::info!("Shutting down...");
    gateway_handle.close();
    worker_set.shutdown().await;

    let flushed = game_cache.flush_last_active(&db).await;
    if flushed > 0 {
        log::info!("Final flush wrote {flushed} last-active timestamps");
    }

    http_result
}
