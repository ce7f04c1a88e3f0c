use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::discovery::{Discovery, StoreLocation};
use crate::error::BusError;
use crate::publisher::EventPublisher;
use crate::store::StoreAdapter;
use crate::subscriber::EventSubscriber;

/// One store connection's worth of bus endpoints.
///
/// Takes its store adapter as a constructor argument; holds no process-wide
/// state. All publishers and subscribers handed out share the one adapter.
pub struct EventService {
    store: Arc<dyn StoreAdapter>,
}

impl EventService {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Resolve the store's location through `discovery`, then build the
    /// adapter with `connect`. Discovery is consulted exactly once.
    pub async fn connect<D, C, Fut>(discovery: &D, connect: C) -> Result<Self, BusError>
    where
        D: Discovery + ?Sized,
        C: FnOnce(StoreLocation) -> Fut,
        Fut: Future<Output = Result<Arc<dyn StoreAdapter>, BusError>>,
    {
        let location = discovery.locate().await?;
        info!(%location, "connecting to event store");
        let store = connect(location).await?;
        Ok(Self::new(store))
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher::new(Arc::clone(&self.store))
    }

    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber::new(Arc::clone(&self.store))
    }
}
