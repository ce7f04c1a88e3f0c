// keybus - last-value-cached event pub/sub
//
// Publishers write typed events under an EventKey; subscribers join one or
// more keys and receive the latest stored value immediately (the invalid
// event if nothing was ever published), followed by a live feed of later
// publications. The backing store only provides SET/GET/PUBLISH/SUBSCRIBE;
// everything composed on top of that lives here.

pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod publisher;
pub mod service;
pub mod store;
pub mod subscriber;

pub use config::Settings;
pub use discovery::{ConfigDiscovery, Discovery, StoreLocation};
pub use error::BusError;
pub use event::{Event, EventKey};
pub use publisher::{CancellationHandle, EventPublisher};
pub use service::EventService;
pub use store::{MemoryStore, StoreAdapter};
pub use subscriber::{EventSubscriber, Subscription};
