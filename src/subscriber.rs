use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::event::{Event, EventKey};
use crate::store::StoreAdapter;

/// Output buffer per subscription. A consumer further behind than this
/// suspends its own forwarders; other subscriptions are unaffected.
const OUTPUT_CAPACITY: usize = 256;

/// Hands out independent live views over sets of keys.
///
/// Every `subscribe` call gets its own snapshot fetch and its own channel
/// listeners, so subscriptions never interfere, not even over identical key
/// sets.
pub struct EventSubscriber {
    store: Arc<dyn StoreAdapter>,
}

impl EventSubscriber {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Join `keys`. The returned receiver yields exactly one initial element
    /// per key (the latest stored value, or the invalid event when none
    /// exists), followed by live publications in arrival order, until
    /// [`Subscription::unsubscribe`] or until the store closes the feed.
    ///
    /// Per-key delivery order matches publish order; ordering across
    /// distinct keys is unspecified. Setup failure fails the whole call.
    ///
    /// An event published between listener setup and the snapshot fetch can
    /// appear twice, once as the initial element and once live: the setup
    /// races toward no gaps, at the price of an at-least-once window.
    pub async fn subscribe(
        &self,
        keys: HashSet<EventKey>,
    ) -> Result<(Subscription, mpsc::Receiver<Event>), BusError> {
        let ordered: Vec<EventKey> = keys.iter().cloned().collect();

        // Live listeners first, then the snapshot: anything published while
        // we fetch is already queued on a listener, so no gap opens between
        // the initial value and the live feed.
        let listens = ordered.iter().map(|key| {
            let store = Arc::clone(&self.store);
            let channel = key.channel();
            async move { store.subscribe(&channel).await }
        });
        let mut feeds = Vec::with_capacity(ordered.len());
        for (key, listener) in ordered.iter().zip(future::join_all(listens).await) {
            feeds.push((key.clone(), listener?));
        }

        let fetches = ordered.iter().map(|key| {
            let store = Arc::clone(&self.store);
            let key = key.clone();
            async move { store.get(&key).await }
        });
        let initials = future::join_all(fetches).await;

        let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY.max(ordered.len()));

        for initial in initials {
            let event = initial?.unwrap_or_else(Event::invalid);
            if tx.try_send(event).is_err() {
                break;
            }
        }

        let forwarders = feeds
            .into_iter()
            .map(|(key, feed)| spawn_forwarder(key, feed, tx.clone()))
            .collect();

        debug!(keys = keys.len(), "subscription opened");
        Ok((Subscription::new(keys, forwarders), rx))
    }
}

fn spawn_forwarder(
    key: EventKey,
    mut feed: broadcast::Receiver<Event>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => {
                    // consumer gone; nothing left to deliver to
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(key = %key, "live feed lagged, {n} events dropped");
                }
                // store closed the channel; this feed terminates
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// A caller's independently-lifecycled view over its subscribed keys.
///
/// Owns the forwarder tasks feeding the output receiver. Dropping the handle
/// without unsubscribing aborts the forwarders as well.
pub struct Subscription {
    keys: HashSet<EventKey>,
    forwarders: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Subscription {
    fn new(keys: HashSet<EventKey>, forwarders: Vec<JoinHandle<()>>) -> Self {
        Self {
            keys,
            forwarders: std::sync::Mutex::new(forwarders),
            closed: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &HashSet<EventKey> {
        &self.keys
    }

    /// Terminal: stops delivery to this subscription's output and releases
    /// its channel listeners. Elements already buffered remain readable.
    /// A second call reports `AlreadyUnsubscribed`.
    pub async fn unsubscribe(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BusError::AlreadyUnsubscribed);
        }

        let forwarders = {
            let mut guard = self
                .forwarders
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for task in &forwarders {
            task.abort();
        }
        for task in forwarders {
            // JoinError from the abort is expected
            let _ = task.await;
        }

        debug!(keys = self.keys.len(), "subscription closed");
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let guard = self
            .forwarders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in guard.iter() {
            task.abort();
        }
    }
}
