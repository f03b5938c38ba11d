pub mod adapter;
pub mod backoff;
pub mod connection;
pub mod gap;
pub mod subscription;

pub use adapter::{AdapterError, VenueAdapter, VenueEvent};
pub use backoff::reconnect_delay;
pub use connection::ConnectionTracker;
pub use gap::detect_sequence_gap;
pub use subscription::SubscriptionManager;
