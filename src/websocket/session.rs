use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, WebSocketError};
use crate::notify::NotificationService;
use crate::registry::OutboundFrame;
use crate::websocket::{ClientFrame, ServerFrame};
use crate::AppState;

/// WebSocket connection handler on the configured notification path.
/// Registers the connection before upgrading so the session starts with a
/// minted id and a live write queue.
pub async fn notifications_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    let notifier = state.notifier.clone();
    let (tx, rx) = mpsc::channel(notifier.send_buffer());
    let connection_id = notifier
        .register(tx, None)
        .await
        .map_err(AppError::from)?;

    let session = WsSession::new(
        notifier.clone(),
        connection_id,
        rx,
        peer_addr,
        Duration::from_secs(state.config.websocket.heartbeat_interval_secs),
        Duration::from_secs(state.config.websocket.client_timeout_secs),
    );

    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(e) => {
            // Upgrade failed after registration; roll the entry back
            notifier.disconnect(connection_id).await;
            Err(e)
        }
    }
}

/// One actor per live WebSocket connection. Inbound control frames mutate the
/// registries through the service facade; outbound notifications arrive on
/// the connection's write queue and are forwarded to the socket.
pub struct WsSession {
    notifier: Arc<NotificationService>,
    connection_id: Uuid,
    outbound: Option<mpsc::Receiver<OutboundFrame>>,
    peer_addr: String,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(
        notifier: Arc<NotificationService>,
        connection_id: Uuid,
        outbound: mpsc::Receiver<OutboundFrame>,
        peer_addr: String,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            connection_id,
            outbound: Some(outbound),
            peer_addr,
            last_heartbeat: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    /// Process an inbound control frame and reply on the control path.
    fn handle_control_frame(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Ping) => {
                self.last_heartbeat = Instant::now();
                self.send_frame(ctx, ServerFrame::Pong);
            }
            Ok(ClientFrame::Subscribe { topic }) => {
                let notifier = self.notifier.clone();
                let id = self.connection_id;
                let subscribed_topic = topic.clone();
                ctx.spawn(
                    async move { notifier.subscribe(id, &topic).await }
                        .into_actor(self)
                        .map(move |subscribed, act, ctx| {
                            if subscribed {
                                act.send_frame(ctx, ServerFrame::Subscribed {
                                    topic: subscribed_topic,
                                });
                            }
                        }),
                );
            }
            Ok(ClientFrame::Unsubscribe { topic }) => {
                let notifier = self.notifier.clone();
                let id = self.connection_id;
                let unsubscribed_topic = topic.clone();
                ctx.spawn(
                    async move { notifier.unsubscribe(id, &topic).await }
                        .into_actor(self)
                        .map(move |_, act, ctx| {
                            act.send_frame(ctx, ServerFrame::Unsubscribed {
                                topic: unsubscribed_topic,
                            });
                        }),
                );
            }
            Ok(ClientFrame::Identify { user_id }) => {
                let notifier = self.notifier.clone();
                let id = self.connection_id;
                let identified_user = user_id.clone();
                ctx.spawn(
                    async move { notifier.identify(id, &user_id).await }
                        .into_actor(self)
                        .map(move |identified, act, ctx| {
                            if identified {
                                act.send_frame(ctx, ServerFrame::Identified {
                                    user_id: identified_user,
                                });
                            }
                        }),
                );
            }
            Err(e) => {
                let err = WebSocketError::InvalidFormat(e.to_string());
                warn!("Invalid control frame from {}: {}", self.peer_addr, err);
                self.send_frame(ctx, ServerFrame::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Serialize and write a control frame to the socket.
    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: ServerFrame) {
        match serde_json::to_string(&frame) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize server frame: {}", e),
        }
    }

    /// Ping the client on an interval and drop connections that have gone
    /// silent past the timeout.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(
                    "Heartbeat timeout for connection {} ({})",
                    act.connection_id, act.peer_addr
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "WebSocket connection established with {} (id: {})",
            self.peer_addr, self.connection_id
        );

        self.start_heartbeat(ctx);

        // Drain the connection's write queue into the socket. When the
        // registry drops the sender the stream finishes and the default
        // StreamHandler::finished stops the actor, closing the socket.
        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(ReceiverStream::new(outbound));
        }

        self.send_frame(ctx, ServerFrame::Connected {
            connection_id: self.connection_id,
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            "WebSocket connection closed with {} (id: {})",
            self.peer_addr, self.connection_id
        );

        let notifier = self.notifier.clone();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            notifier.disconnect(connection_id).await;
        });
    }
}

/// Outbound queue drain: notifications and the shutdown close frame.
impl StreamHandler<OutboundFrame> for WsSession {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Text(text) => ctx.text(text),
            OutboundFrame::Close => {
                ctx.close(Some(ws::CloseCode::Away.into()));
                ctx.stop();
            }
        }
    }
}

/// Inbound WebSocket protocol messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.handle_control_frame(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                warn!(
                    "Unsupported binary message of {} bytes from {}",
                    bin.len(),
                    self.peer_addr
                );
                self.send_frame(ctx, ServerFrame::Error {
                    message: "Binary messages are not supported".to_string(),
                });
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    "Error handling WebSocket message from {}: {}",
                    self.peer_addr, e
                );
                ctx.stop();
            }
        }
    }
}
