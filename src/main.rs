use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use notify_server::websocket::notifications_route;
use notify_server::{api, AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> notify_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    // Initialize application state
    let state = web::Data::new(AppState::new(config.clone()));

    // Create and bind TCP listener; port 0 binds an ephemeral port
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    let addr = listener.local_addr()?;

    info!(
        "Notification server ready to accept connections at ws://{}{}",
        addr, config.websocket.path
    );

    let server_state = state.clone();
    let server_config = config.clone();

    // Start HTTP server
    HttpServer::new(move || {
        let cors = if server_config.cors.enabled {
            let cors_config = Cors::default();

            // Apply specific CORS rules based on configuration
            let cors_config = if server_config.cors.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
            } else {
                // More restrictive CORS for production use
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            // Set max age
            cors_config.max_age(server_config.cors.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(server_state.clone())
            .route("/health", web::get().to(notify_server::health_check))
            .route("/stats", web::get().to(api::stats))
            .route(&server_config.websocket.path, web::get().to(notifications_route))
            .configure(api::register_routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    // Close remaining connections and empty the registries
    state.shutdown().await;

    Ok(())
}
