#![forbid(unsafe_code)]

//! modelcast public facade crate.
//!
//! Connect to the channel for a model id, subscribe to its latest value and
//! emit new snapshots, plain or asynchronous. See [`runtime`] for the
//! delivery guarantees and [`core`] for filters and coalescing.

pub use modelcast_core as core;
pub use modelcast_runtime as runtime;

pub mod prelude {
    pub use modelcast_core::{
        Coalesce, CoalescingFilter, CompositeFilter, Model, PassThrough, StreamConfig,
        StreamError, StreamFilter,
    };
    pub use modelcast_runtime::{
        ConcurrentStreamFactory, Connection, Emission, EmissionStatus, Notification, Offer,
        StreamFactory, Subscription,
    };
}
