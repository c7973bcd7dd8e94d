#![forbid(unsafe_code)]

//! Keyed broadcast channels.
//!
//! This module provides the per-key delivery primitives the registry hands
//! out through connections:
//!
//! - `Channel`: the broadcast node for one model id, holding the last
//!   accepted value.
//! - [`Notification`]: what observers receive, a value or an emission error.
//! - [`Subscription`]: RAII guard that stops delivery on drop.
//! - [`Emission`]: a future that drives an asynchronous producer into a
//!   channel with switch-latest semantics.
//!
//! # Architecture
//!
//! A channel keeps one `Weak` relay per connection; each relay keeps its
//! observers as `Weak` function pointers whose strong side lives in the
//! caller's [`Subscription`]. Dead links on either level are pruned lazily
//! during delivery.
//!
//! Publication runs through a queue drained by one caller at a time with no
//! lock held, so an observer may emit into the channel it is observing.
//!
//! # Invariants
//!
//! 1. A stored value always carries the channel's key.
//! 2. Only the most recently registered producer can publish.
//! 3. Publishing a value equal to the current one is a no-op.
//! 4. Observers are notified in registration order, each value exactly once.
//! 5. A new subscriber sees the current value before anything newer.

pub(crate) mod channel;
pub mod emission;
pub(crate) mod relay;

pub use channel::Offer;
pub use emission::{Emission, EmissionStatus};
pub use relay::{Notification, Subscription};
