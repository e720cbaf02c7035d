use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    /// Topic name -> subscribed connection ids.
    topics: HashMap<String, HashSet<Uuid>>,
    /// Reverse index: connection id -> topics it subscribes to. Makes the
    /// disconnect path proportional to the connection's memberships.
    memberships: HashMap<Uuid, HashSet<String>>,
}

/// Membership tracking for topic fan-out. Topics are created implicitly on
/// first subscribe and pruned when their membership reaches zero.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Idempotent; subscribing to an unknown topic creates it.
    pub async fn subscribe(&self, topic: &str, id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.topics.entry(topic.to_string()).or_default().insert(id);
        inner.memberships.entry(id).or_default().insert(topic.to_string());
        debug!("Connection {} subscribed to topic {}", id, topic);
    }

    /// Idempotent; unknown topics and non-members are no-ops.
    pub async fn unsubscribe(&self, topic: &str, id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(subscribers) = inner.topics.get_mut(topic) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                inner.topics.remove(topic);
            }
        }
        if let Some(topics) = inner.memberships.get_mut(&id) {
            topics.remove(topic);
            if topics.is_empty() {
                inner.memberships.remove(&id);
            }
        }
    }

    /// Current membership snapshot; empty for unknown topics, never an error.
    pub async fn subscribers_of(&self, topic: &str) -> HashSet<Uuid> {
        self.inner
            .read()
            .await
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Purge every membership of a departing connection.
    pub async fn remove_connection(&self, id: Uuid) {
        let mut inner = self.inner.write().await;
        let topics = match inner.memberships.remove(&id) {
            Some(topics) => topics,
            None => return,
        };
        for topic in topics {
            if let Some(subscribers) = inner.topics.get_mut(&topic) {
                subscribers.remove(&id);
                if subscribers.is_empty() {
                    inner.topics.remove(&topic);
                }
            }
        }
        debug!("Removed connection {} from all topics", id);
    }

    /// Topics with at least one current subscriber.
    pub async fn topic_count(&self) -> usize {
        self.inner.read().await.topics.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.topics.clear();
        inner.memberships.clear();
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
