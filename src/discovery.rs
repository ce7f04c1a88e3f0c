use std::fmt;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::BusError;

/// Resolved network location of the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolves where the store lives. Consulted once when a service is built;
/// plays no part in runtime behavior after that.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn locate(&self) -> Result<StoreLocation, BusError>;
}

/// Resolution straight from `Settings`, with no registry round-trip.
pub struct ConfigDiscovery {
    settings: Settings,
}

impl ConfigDiscovery {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Discovery for ConfigDiscovery {
    async fn locate(&self) -> Result<StoreLocation, BusError> {
        Ok(StoreLocation {
            host: self.settings.store.host.clone(),
            port: self.settings.store.port,
        })
    }
}
