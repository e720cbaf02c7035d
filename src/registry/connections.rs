use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::error::NotificationError;

/// Outbound unit queued for a single connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Bounded per-connection write queue. A full queue drops frames rather than
/// stalling the sender.
pub type OutboundSender = mpsc::Sender<OutboundFrame>;

/// A connection is force-disconnected once its queue has been full this many
/// times.
const MAX_STALLED_SENDS: u32 = 8;

#[derive(Debug)]
struct ConnectionEntry {
    sender: OutboundSender,
    user_id: Option<String>,
    connected_at: DateTime<Utc>,
    stalled_sends: u32,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Uuid, ConnectionEntry>,
    by_user: HashMap<String, HashSet<Uuid>>,
}

impl Inner {
    fn unindex_user(&mut self, id: Uuid, user_id: &str) {
        if let Some(ids) = self.by_user.get_mut(user_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_user.remove(user_id);
            }
        }
    }
}

/// Single source of truth for which transport channels are currently open and
/// who, if anyone, they belong to.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Mint an id for a live write queue and track it, optionally associated
    /// with a user. Ids are UUIDv4 and never reused.
    pub async fn register(
        &self,
        sender: OutboundSender,
        user_id: Option<String>,
    ) -> Result<Uuid, NotificationError> {
        if sender.is_closed() {
            return Err(NotificationError::ClosedConnection);
        }

        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        if let Some(ref user) = user_id {
            inner.by_user.entry(user.clone()).or_default().insert(id);
        }
        inner.entries.insert(
            id,
            ConnectionEntry {
                sender,
                user_id,
                connected_at: Utc::now(),
                stalled_sends: 0,
            },
        );
        info!("Registered connection {}", id);
        Ok(id)
    }

    /// Associate (or re-associate) a connection with a user. Returns false if
    /// the connection is gone.
    pub async fn identify(&self, id: Uuid, user_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let previous = match inner.entries.get_mut(&id) {
            Some(entry) => entry.user_id.replace(user_id.to_string()),
            None => return false,
        };
        if let Some(previous) = previous {
            inner.unindex_user(id, &previous);
        }
        inner.by_user.entry(user_id.to_string()).or_default().insert(id);
        info!("Connection {} identified as user {}", id, user_id);
        true
    }

    /// Idempotent removal; the second call is a no-op.
    pub async fn unregister(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let entry = match inner.entries.remove(&id) {
            Some(entry) => entry,
            None => return false,
        };
        if let Some(ref user) = entry.user_id {
            let user = user.clone();
            inner.unindex_user(id, &user);
        }
        info!("Unregistered connection {}", id);
        true
    }

    pub async fn is_alive(&self, id: Uuid) -> bool {
        self.inner.read().await.entries.contains_key(&id)
    }

    /// All connection ids currently associated with a user. A user can have
    /// several simultaneous sessions.
    pub async fn lookup_by_user(&self, user_id: &str) -> HashSet<Uuid> {
        self.inner
            .read()
            .await
            .by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn connected_at(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .await
            .entries
            .get(&id)
            .map(|entry| entry.connected_at)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Snapshot the write queues of one user's connections.
    pub async fn resolve_user(&self, user_id: &str) -> Vec<(Uuid, OutboundSender)> {
        let inner = self.inner.read().await;
        match inner.by_user.get(user_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.entries.get(id).map(|e| (*id, e.sender.clone())))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot the write queues of a specific id set (topic fan-out).
    pub async fn resolve_ids(&self, ids: &HashSet<Uuid>) -> Vec<(Uuid, OutboundSender)> {
        let inner = self.inner.read().await;
        ids.iter()
            .filter_map(|id| inner.entries.get(id).map(|e| (*id, e.sender.clone())))
            .collect()
    }

    /// Snapshot every registered write queue.
    pub async fn resolve_all(&self) -> Vec<(Uuid, OutboundSender)> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .map(|(id, e)| (*id, e.sender.clone()))
            .collect()
    }

    /// Record full-queue sends and return the ids whose queues have stalled
    /// often enough to warrant a forced disconnect.
    pub async fn note_stalled(&self, ids: &[Uuid]) -> Vec<Uuid> {
        let mut inner = self.inner.write().await;
        let mut over_limit = Vec::new();
        for id in ids {
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.stalled_sends += 1;
                if entry.stalled_sends >= MAX_STALLED_SENDS {
                    over_limit.push(*id);
                }
            }
        }
        over_limit
    }

    /// Drop every entry, closing all write queues. Returns how many were
    /// removed.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.write().await;
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.by_user.clear();
        removed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
