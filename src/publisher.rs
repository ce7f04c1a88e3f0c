use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error};

use crate::error::BusError;
use crate::event::Event;
use crate::store::StoreAdapter;

/// Cancels a periodic publication.
///
/// Cheap to clone; the same handle is passed into the generator so it can
/// cancel from within its own invocation without deadlocking the timer.
/// Cancellation never discards an in-flight publish, it only prevents new
/// ticks.
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Request cancellation. Idempotent; returns `true` on the call that
    /// actually cancelled.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_one();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Writes events into the store: SET the latest value, then PUSH the live
/// notification, in that order, so a GET racing the notification never sees
/// a stale value.
pub struct EventPublisher {
    store: Arc<dyn StoreAdapter>,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Publish a single event. `StoreUnavailable` surfaces to the caller;
    /// there is no internal retry.
    pub async fn publish(&self, event: Event) -> Result<(), BusError> {
        publish_once(&self.store, event).await
    }

    /// Invoke `generator` every `interval` on a dedicated timer and publish
    /// each produced event as in [`publish`](Self::publish).
    ///
    /// At most one generator invocation is in flight at a time. A failed
    /// tick (generator error or publish error) is reported and the timer
    /// keeps running; one bad tick never kills the stream. Cancellation via
    /// the returned handle takes effect before the next tick.
    pub fn publish_every<F>(&self, mut generator: F, interval: Duration) -> CancellationHandle
    where
        F: FnMut(&CancellationHandle) -> anyhow::Result<Event> + Send + 'static,
    {
        let handle = CancellationHandle::new();
        let timer_handle = handle.clone();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; consume that so the first event
            // lands one interval after scheduling
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = timer_handle.notify.notified() => break,
                }
                if timer_handle.is_cancelled() {
                    break;
                }
                match generator(&timer_handle) {
                    // A generator that cancelled mid-invocation still gets
                    // this event out; only future ticks stop.
                    Ok(event) => {
                        let key = event.key.clone();
                        if let Err(err) = publish_once(&store, event).await {
                            error!(key = %key, "periodic publish failed: {err}");
                        }
                    }
                    Err(err) => {
                        let err = BusError::Generator(err);
                        error!("periodic generator failed: {err}");
                    }
                }
            }
            debug!("periodic publication stopped");
        });

        handle
    }
}

async fn publish_once(store: &Arc<dyn StoreAdapter>, event: Event) -> Result<(), BusError> {
    let channel = event.key.channel();
    store.set(&event.key, event.clone()).await?;
    store.publish(&channel, event).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKey;
    use crate::store::MemoryStore;
    use serde_json::json;
    use tokio::time::sleep;

    fn publisher_over(store: &Arc<MemoryStore>) -> EventPublisher {
        EventPublisher::new(Arc::clone(store) as Arc<dyn StoreAdapter>)
    }

    #[tokio::test]
    async fn publish_sets_latest_before_notifying() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher_over(&store);

        let key = EventKey::new("test", "single");
        let mut rx = store.subscribe(&key.channel()).await.unwrap();

        let event = Event::new(key.clone(), json!({ "n": 1 }));
        publisher.publish(event.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
        // by the time the notification arrived, GET already sees the value
        assert_eq!(store.get(&key).await.unwrap(), Some(event));
    }

    #[tokio::test]
    async fn generator_error_does_not_stop_the_timer() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher_over(&store);

        let key = EventKey::new("test", "flaky");
        let mut rx = store.subscribe(&key.channel()).await.unwrap();

        let generator_key = key.clone();
        let mut tick = 0;
        publisher.publish_every(
            move |handle| {
                tick += 1;
                if tick == 2 {
                    anyhow::bail!("tick {tick} went bad");
                }
                if tick == 4 {
                    handle.cancel();
                }
                Ok(Event::new(generator_key.clone(), json!({ "tick": tick })))
            },
            Duration::from_millis(5),
        );

        sleep(Duration::from_millis(200)).await;

        let mut ticks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            ticks.push(event.payload["tick"].as_i64().unwrap());
        }
        // tick 2 failed, tick 4 self-cancelled after producing its event
        assert_eq!(ticks, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn cancel_is_prompt_and_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let publisher = publisher_over(&store);

        let key = EventKey::new("test", "cancelled");
        let mut rx = store.subscribe(&key.channel()).await.unwrap();

        let generator_key = key.clone();
        let handle = publisher.publish_every(
            move |_| Ok(Event::new(generator_key.clone(), json!({}))),
            Duration::from_millis(10),
        );

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());

        sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
