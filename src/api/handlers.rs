use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::notify::Envelope;
use crate::{AppError, AppState};

/// Push a notification to every session of one user.
/// Endpoint: POST /api/notifications/users/{user_id}
pub async fn notify_user(
    path: web::Path<String>,
    body: web::Json<Envelope>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let envelope = body.into_inner();
    let delivered = state.notifier.send_to_user(&user_id, &envelope).await?;

    Ok(HttpResponse::Ok().json(json!({
        "userId": user_id,
        "delivered": delivered
    })))
}

/// Push a notification to a topic's current subscribers.
/// Endpoint: POST /api/notifications/topics/{topic}
pub async fn notify_topic(
    path: web::Path<String>,
    body: web::Json<Envelope>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let topic = path.into_inner();
    let envelope = body.into_inner();
    let delivered = state.notifier.send_to_topic(&topic, &envelope).await?;

    Ok(HttpResponse::Ok().json(json!({
        "topic": topic,
        "delivered": delivered
    })))
}

/// Push a notification to every connected client.
/// Endpoint: POST /api/notifications/broadcast
pub async fn broadcast(
    body: web::Json<Envelope>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let envelope = body.into_inner();
    let delivered = state.notifier.broadcast(&envelope).await?;

    Ok(HttpResponse::Ok().json(json!({ "delivered": delivered })))
}

/// Current registry counts and lifetime delivery counters.
/// Endpoint: GET /stats
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.notifier.stats().await)
}

/// Register the notification API under /api/notifications.
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/notifications")
            .route("/users/{user_id}", web::post().to(notify_user))
            .route("/topics/{topic}", web::post().to(notify_topic))
            .route("/broadcast", web::post().to(broadcast)),
    );
}
