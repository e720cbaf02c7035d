use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::error::NotificationError;
use crate::notify::Envelope;
use crate::registry::{ConnectionRegistry, OutboundFrame, OutboundSender, TopicRegistry};

/// Capacity of the delivery-event channel consumed by observers.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Registry snapshot plus lifetime delivery counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Stats {
    pub clients: usize,
    pub topics: usize,
    pub delivered: u64,
    pub dropped: u64,
}

/// Emitted once per send call, carrying the resolved target description and
/// the envelope, so observers can assert on what would have been sent without
/// a live socket.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Notification {
        user_id: String,
        envelope: Envelope,
        delivered: usize,
    },
    TopicNotification {
        topic: String,
        envelope: Envelope,
        delivered: usize,
    },
    Broadcast {
        envelope: Envelope,
        delivered: usize,
    },
}

/// Public entry point for notification delivery. Owns the connection and
/// topic registries; the transport layer registers connections here and
/// application code pushes notifications through the send operations.
///
/// All three send operations are fire-and-forget: an absent user or topic is
/// a successful zero-delivery call, and per-connection write failures never
/// surface to the caller.
pub struct NotificationService {
    connections: ConnectionRegistry,
    topics: TopicRegistry,
    max_payload: usize,
    send_buffer: usize,
    accepting: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    events: broadcast::Sender<DeliveryEvent>,
}

impl NotificationService {
    pub fn new(config: &WebSocketConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connections: ConnectionRegistry::new(),
            topics: TopicRegistry::new(),
            max_payload: config.max_payload,
            send_buffer: config.send_buffer,
            accepting: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            events,
        }
    }

    /// Per-connection outbound queue capacity, for the transport layer to
    /// size its channels with.
    pub fn send_buffer(&self) -> usize {
        self.send_buffer
    }

    /// Track a new live connection. Fails fast once shutdown has begun or if
    /// the write queue is already closed.
    pub async fn register(
        &self,
        sender: OutboundSender,
        user_id: Option<String>,
    ) -> Result<Uuid, NotificationError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(NotificationError::ShuttingDown);
        }
        self.connections.register(sender, user_id).await
    }

    /// Associate a connection with a user id for `send_to_user` targeting.
    pub async fn identify(&self, id: Uuid, user_id: &str) -> bool {
        self.connections.identify(id, user_id).await
    }

    /// Remove a connection and purge all its topic memberships. Idempotent;
    /// no delivery to this id succeeds afterwards.
    pub async fn disconnect(&self, id: Uuid) -> bool {
        let removed = self.connections.unregister(id).await;
        self.topics.remove_connection(id).await;
        removed
    }

    /// Subscribe a live connection to a topic. Returns false for unknown
    /// connections.
    pub async fn subscribe(&self, id: Uuid, topic: &str) -> bool {
        if !self.connections.is_alive(id).await {
            return false;
        }
        self.topics.subscribe(topic, id).await;
        true
    }

    pub async fn unsubscribe(&self, id: Uuid, topic: &str) {
        self.topics.unsubscribe(topic, id).await;
    }

    /// Deliver to every connection identified as `user_id`. Zero connections
    /// is a successful zero-delivery call.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        envelope: &Envelope,
    ) -> Result<usize, NotificationError> {
        let payload = self.encode(envelope)?;
        let targets = self.connections.resolve_user(user_id).await;
        let delivered = self.deliver(targets, &payload).await;
        self.emit(DeliveryEvent::Notification {
            user_id: user_id.to_string(),
            envelope: envelope.clone(),
            delivered,
        });
        Ok(delivered)
    }

    /// Deliver to the topic's current subscriber set.
    pub async fn send_to_topic(
        &self,
        topic: &str,
        envelope: &Envelope,
    ) -> Result<usize, NotificationError> {
        let payload = self.encode(envelope)?;
        let subscribers = self.topics.subscribers_of(topic).await;
        let targets = self.connections.resolve_ids(&subscribers).await;
        let delivered = self.deliver(targets, &payload).await;
        self.emit(DeliveryEvent::TopicNotification {
            topic: topic.to_string(),
            envelope: envelope.clone(),
            delivered,
        });
        Ok(delivered)
    }

    /// Deliver to every currently registered connection.
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<usize, NotificationError> {
        let payload = self.encode(envelope)?;
        let targets = self.connections.resolve_all().await;
        let delivered = self.deliver(targets, &payload).await;
        self.emit(DeliveryEvent::Broadcast {
            envelope: envelope.clone(),
            delivered,
        });
        Ok(delivered)
    }

    pub async fn stats(&self) -> Stats {
        Stats {
            clients: self.connections.connection_count().await,
            topics: self.topics.topic_count().await,
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Subscribe to delivery events.
    pub fn events(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    /// Stop accepting registrations and close every live connection. Dropping
    /// the write queues ends each session's outbound stream, which closes the
    /// socket; both registries end up empty, so subsequent sends resolve zero
    /// targets.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        // Best-effort close frame; dropping the queues below is what actually
        // tears the sessions down
        for (_, sender) in self.connections.resolve_all().await {
            let _ = sender.try_send(OutboundFrame::Close);
        }
        let removed = self.connections.clear().await;
        self.topics.clear().await;
        info!("Notification service shut down, closed {} connections", removed);
    }

    /// Serialize once and enforce the payload limit before any write.
    fn encode(&self, envelope: &Envelope) -> Result<String, NotificationError> {
        let payload = envelope.to_payload()?;
        if payload.len() > self.max_payload {
            return Err(NotificationError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload,
            });
        }
        Ok(payload)
    }

    /// Write the encoded payload to each resolved connection independently.
    /// A closed queue unregisters that connection; a full queue drops the
    /// frame and may force-disconnect a persistently stalled consumer.
    /// Neither aborts delivery to the remaining connections.
    async fn deliver(&self, targets: Vec<(Uuid, OutboundSender)>, payload: &str) -> usize {
        let mut delivered = 0usize;
        let mut dead = Vec::new();
        let mut stalled = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(OutboundFrame::Text(payload.to_string())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for connection {}, dropping frame", id);
                    stalled.push(id);
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }

        for id in dead {
            if self.disconnect(id).await {
                warn!("Connection {} closed mid-send, unregistered", id);
            }
        }

        if !stalled.is_empty() {
            self.dropped.fetch_add(stalled.len() as u64, Ordering::Relaxed);
            for id in self.connections.note_stalled(&stalled).await {
                warn!("Connection {} persistently stalled, disconnecting", id);
                self.disconnect(id).await;
            }
        }

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    fn emit(&self, event: DeliveryEvent) {
        // No receivers is fine; events are purely observational
        let _ = self.events.send(event);
    }
}
