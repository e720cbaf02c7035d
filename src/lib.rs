pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod websocket;

use std::sync::Arc;
use actix_web::HttpResponse;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use notify::{DeliveryEvent, Envelope, NotificationService, Stats};
pub use registry::{ConnectionRegistry, OutboundFrame, OutboundSender, TopicRegistry};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub notifier: Arc<NotificationService>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let notifier = Arc::new(NotificationService::new(&config.websocket));
        Self {
            config: Arc::new(config),
            notifier,
        }
    }

    pub async fn shutdown(&self) {
        self.notifier.shutdown().await;
    }
}
