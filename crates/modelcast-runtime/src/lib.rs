#![forbid(unsafe_code)]

//! Runtime: keyed switch-latest channels, the registry that owns them, and
//! the connections consumers hold.

pub mod connection;
pub mod reactive;
pub mod registry;

pub use connection::Connection;
pub use reactive::{Emission, EmissionStatus, Notification, Offer, Subscription};
pub use registry::{
    ConcurrentStreamFactory, Local, Locking, RegistryLock, Shared, StreamFactory,
    StreamFactoryBase,
};
