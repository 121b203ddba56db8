use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::NotificationRecord;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub delivering notifications per user. Persisted
/// `NotificationRecord`s live in the engine; this hub is the live push path
/// the transport layer (websocket, SSE, polling) subscribes to.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<NotificationRecord>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's notifications. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<NotificationRecord> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a notification. No-op if nobody is listening.
    pub fn publish(&self, record: &NotificationRecord) {
        if let Some(sender) = self.channels.get(&record.user_id) {
            let _ = sender.send(record.clone());
        }
    }

    /// Drop a user's channel.
    #[allow(dead_code)]
    pub fn remove(&self, user_id: &Ulid) {
        self.channels.remove(user_id);
    }
}
