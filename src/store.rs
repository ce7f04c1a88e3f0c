use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use crate::error::BusError;
use crate::event::{Event, EventKey};

/// Buffer of each channel's live feed. A listener that falls further behind
/// loses the oldest messages and sees a lag notification.
const CHANNEL_CAPACITY: usize = 1024;

/// The primitive surface the bus consumes from the external store.
///
/// Each operation is individually atomic. `subscribe` only delivers messages
/// published after the call completes, which is why subscribers pair it with
/// a `get` for the initial snapshot.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Overwrite the latest value for `key`.
    async fn set(&self, key: &EventKey, event: Event) -> Result<(), BusError>;

    /// Latest value for `key`, or `None` if nothing was ever published.
    async fn get(&self, key: &EventKey) -> Result<Option<Event>, BusError>;

    /// Push `event` to every live listener of `channel`.
    async fn publish(&self, channel: &str, event: Event) -> Result<(), BusError>;

    /// Open a live listener on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Event>, BusError>;
}

/// In-process store: a last-value map plus one broadcast channel per topic.
///
/// Channels are created lazily and shared by every listener of the same
/// topic, so a slow consumer on one channel never blocks the others.
pub struct MemoryStore {
    latest: RwLock<HashMap<EventKey, Event>>,
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<Event> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Drop channels that no listener holds anymore. Channels are otherwise
    /// retained for the store's lifetime; embedders with churning topics
    /// should sweep periodically.
    pub async fn prune_idle_channels(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of live channels (for debugging).
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn set(&self, key: &EventKey, event: Event) -> Result<(), BusError> {
        self.latest.write().await.insert(key.clone(), event);
        Ok(())
    }

    async fn get(&self, key: &EventKey) -> Result<Option<Event>, BusError> {
        Ok(self.latest.read().await.get(key).cloned())
    }

    async fn publish(&self, channel: &str, event: Event) -> Result<(), BusError> {
        let sender = self.sender(channel).await;
        // No listeners is not an error; the value is still in the latest map
        let _ = sender.send(event);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Event>, BusError> {
        Ok(self.sender(channel).await.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(name: &str, n: i64) -> Event {
        Event::new(EventKey::new("test", name), json!({ "n": n }))
    }

    #[tokio::test]
    async fn set_then_get_returns_latest() {
        let store = MemoryStore::new();
        let key = EventKey::new("test", "latest");

        assert!(store.get(&key).await.unwrap().is_none());

        let first = sample("latest", 1);
        let second = sample("latest", 2);
        store.set(&key, first).await.unwrap();
        store.set(&key, second.clone()).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn subscribe_receives_only_later_publishes() {
        let store = MemoryStore::new();
        let key = EventKey::new("test", "live");
        let channel = key.channel();

        let early = sample("live", 1);
        store.publish(&channel, early).await.unwrap();

        let mut rx = store.subscribe(&channel).await.unwrap();

        let late = sample("live", 2);
        store.publish(&channel, late.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), late);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn prune_drops_only_listenerless_channels() {
        let store = MemoryStore::new();
        let idle = EventKey::new("test", "idle").channel();
        let busy = EventKey::new("test", "busy").channel();

        let dropped = store.subscribe(&idle).await.unwrap();
        let _held = store.subscribe(&busy).await.unwrap();
        assert_eq!(store.channel_count().await, 2);

        drop(dropped);
        store.prune_idle_channels().await;
        assert_eq!(store.channel_count().await, 1);
    }

    #[tokio::test]
    async fn every_listener_of_a_channel_gets_the_message() {
        let store = MemoryStore::new();
        let channel = EventKey::new("test", "fanout").channel();

        let mut rx1 = store.subscribe(&channel).await.unwrap();
        let mut rx2 = store.subscribe(&channel).await.unwrap();

        let event = sample("fanout", 1);
        store.publish(&channel, event.clone()).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }
}
