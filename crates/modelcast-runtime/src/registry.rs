#![forbid(unsafe_code)]

//! Keyed channel registry and the factories that front it.
//!
//! # Design
//!
//! The registry maps a model id to its channel. It is created lazily on
//! the first [`StreamFactoryBase::connect`] for an id and removed the moment
//! its last connection is released. Every structural change (create, attach,
//! detach-and-recount, remove) happens inside one registry critical section,
//! so a channel is never visible with zero connections and never removed
//! while a connection still references it.
//!
//! The critical section is provided by a [`Locking`] policy:
//!
//! | Policy     | Lock          | Factory alias                | Thread bound |
//! |------------|---------------|------------------------------|--------------|
//! | [`Local`]  | `RefCell`     | [`StreamFactory`]            | `!Send`      |
//! | [`Shared`] | `Mutex`       | [`ConcurrentStreamFactory`]  | `Send + Sync`|
//!
//! Lock order is registry then channel. Channels removed from the map are
//! dropped after the registry lock is released.
//!
//! # Failure Modes
//!
//! - **Re-entrant release on `Local`**: a connection dropped while the
//!   registry is already borrowed on the same thread only detaches. The
//!   empty channel is swept on the next `connect`, `exists`, `len` or
//!   `sweep` call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use modelcast_core::{Model, StreamConfig, StreamFilter};

use crate::connection::Connection;
use crate::reactive::channel::Channel;
use crate::reactive::relay::Relay;

/// A lock around the registry map.
pub trait RegistryLock<T> {
    fn new(value: T) -> Self;

    /// Run `f` inside the critical section.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;

    /// Run `f` inside the critical section unless that would re-enter it.
    fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R>;
}

impl<T> RegistryLock<T> for RefCell<T> {
    fn new(value: T) -> Self {
        RefCell::new(value)
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.borrow_mut())
    }

    fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.try_borrow_mut().ok()?;
        Some(f(&mut guard))
    }
}

impl<T> RegistryLock<T> for Mutex<T> {
    fn new(value: T) -> Self {
        Mutex::new(value)
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        Some(self.with(f))
    }
}

/// Locking policy selecting how the registry map is guarded.
pub trait Locking: 'static {
    type Lock<T>: RegistryLock<T>;
}

/// Single-threaded policy. Misuse across threads is a compile error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Local;

impl Locking for Local {
    type Lock<T> = RefCell<T>;
}

/// Thread-safe policy. Every factory entry point runs under one mutex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shared;

impl Locking for Shared {
    type Lock<T> = Mutex<T>;
}

type ChannelMap<M> = HashMap<<M as Model>::Id, Arc<Channel<M>>>;

pub(crate) struct Registry<M: Model, L: Locking> {
    channels: L::Lock<ChannelMap<M>>,
    config: StreamConfig<M>,
}

/// Move every channel without live connections out of `map`.
fn take_idle<M: Model>(map: &mut ChannelMap<M>) -> Vec<Arc<Channel<M>>> {
    let idle: Vec<M::Id> = map
        .iter()
        .filter(|(_, channel)| channel.connection_count() == 0)
        .map(|(key, _)| key.clone())
        .collect();
    idle.iter().filter_map(|key| map.remove(key)).collect()
}

/// Move the channel for `key` out of `map` if it has no live connections.
fn take_idle_key<M: Model>(map: &mut ChannelMap<M>, key: &M::Id) -> Option<Arc<Channel<M>>> {
    match map.get(key) {
        Some(channel) if channel.connection_count() == 0 => map.remove(key),
        _ => None,
    }
}

impl<M: Model, L: Locking> Registry<M, L> {
    fn new(config: StreamConfig<M>) -> Self {
        Self {
            channels: <L::Lock<ChannelMap<M>> as RegistryLock<_>>::new(HashMap::new()),
            config,
        }
    }

    fn connect(&self, id: M::Id) -> (Arc<Channel<M>>, Arc<Relay<M>>) {
        let relay = Arc::new(Relay::new());
        let (channel, stale, created) = self.channels.with(|map| {
            let stale = take_idle_key(map, &id);
            let (channel, created) = match map.entry(id) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    let channel = Arc::new(Channel::new(entry.key().clone(), self.config.clone()));
                    (Arc::clone(entry.insert(channel)), true)
                }
            };
            channel.attach_relay(&relay);
            (channel, stale, created)
        });

        if let Some(stale) = stale {
            stale.close();
            tracing::debug!(message = "stream.swept", key = ?stale.key(), count = 1usize);
        }
        if created {
            tracing::debug!(message = "stream.created", key = ?channel.key());
        }
        (channel, relay)
    }

    /// Detach `relay` and drop the channel if that was its last connection.
    pub(crate) fn release(&self, channel: &Arc<Channel<M>>, relay: &Arc<Relay<M>>) {
        let removed = self.channels.try_with(|map| {
            channel.detach_relay(relay);
            if channel.connection_count() > 0 {
                return None;
            }
            match map.get(channel.key()) {
                Some(current) if Arc::ptr_eq(current, channel) => map.remove(channel.key()),
                _ => None,
            }
        });

        match removed {
            Some(Some(channel)) => {
                channel.close();
                tracing::debug!(message = "stream.removed", key = ?channel.key());
            }
            Some(None) => {}
            None => {
                channel.detach_relay(relay);
                tracing::debug!(message = "stream.release_deferred", key = ?channel.key());
            }
        }
    }

    fn exists(&self, id: &M::Id) -> bool {
        let (exists, stale) = self.channels.with(|map| {
            let stale = take_idle_key(map, id);
            (map.contains_key(id), stale)
        });
        if let Some(stale) = stale {
            stale.close();
            tracing::debug!(message = "stream.swept", key = ?stale.key(), count = 1usize);
        }
        exists
    }

    fn len(&self) -> usize {
        let (len, idle) = self.channels.with(|map| {
            let idle = take_idle(map);
            (map.len(), idle)
        });
        Self::retire(idle);
        len
    }

    fn sweep(&self) -> usize {
        let idle = self.channels.with(take_idle::<M>);
        let count = idle.len();
        Self::retire(idle);
        count
    }

    fn clear(&self) -> usize {
        let drained: Vec<Arc<Channel<M>>> =
            self.channels.with(|map| map.drain().map(|(_, channel)| channel).collect());
        let count = drained.len();
        for channel in &drained {
            channel.close();
        }
        tracing::debug!(message = "registry.cleared", count);
        count
    }

    fn retire(idle: Vec<Arc<Channel<M>>>) {
        if idle.is_empty() {
            return;
        }
        for channel in &idle {
            channel.close();
        }
        tracing::debug!(message = "stream.swept", count = idle.len());
    }
}

/// Hands out [`Connection`]s to per-key channels.
///
/// Use one of the aliases: [`StreamFactory`] for single-threaded code or
/// [`ConcurrentStreamFactory`] when connections cross threads. Cloning a
/// factory shares its registry.
pub struct StreamFactoryBase<M: Model, L: Locking = Shared> {
    registry: Arc<Registry<M, L>>,
}

/// Single-threaded factory.
pub type StreamFactory<M> = StreamFactoryBase<M, Local>;

/// Thread-safe factory.
pub type ConcurrentStreamFactory<M> = StreamFactoryBase<M, Shared>;

impl<M: Model, L: Locking> Clone for StreamFactoryBase<M, L> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<M: Model, L: Locking> fmt::Debug for StreamFactoryBase<M, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.registry.channels.with(|map| map.len());
        f.debug_struct("StreamFactory")
            .field("channels", &channels)
            .finish_non_exhaustive()
    }
}

impl<M: Model + PartialEq, L: Locking> Default for StreamFactoryBase<M, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model + PartialEq, L: Locking> StreamFactoryBase<M, L> {
    /// Factory with `PartialEq` equality and no filtering.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StreamConfig::new())
    }
}

impl<M: Model, L: Locking> StreamFactoryBase<M, L> {
    #[must_use]
    pub fn with_config(config: StreamConfig<M>) -> Self {
        Self {
            registry: Arc::new(Registry::new(config)),
        }
    }

    /// Connect to the channel for `id`, creating it if needed. New
    /// subscribers on the connection are primed with the channel's current
    /// value.
    pub fn connect(&self, id: M::Id) -> Connection<M, L> {
        let (channel, relay) = self.registry.connect(id);
        Connection::new(channel, relay, Arc::downgrade(&self.registry))
    }

    /// Whether a channel with live connections exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &M::Id) -> bool {
        self.registry.exists(id)
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and drop every channel. Connections made before the call keep
    /// their last value but can no longer emit.
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Remove channels whose connections are all gone. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig<M> {
        &self.registry.config
    }

    /// The filter pipeline every channel of this factory runs.
    #[must_use]
    pub fn filter(&self) -> &Arc<dyn StreamFilter<M>> {
        self.registry.config.filter_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: u64,
        status: &'static str,
    }

    impl Model for Order {
        type Id = u64;

        fn id(&self) -> &u64 {
            &self.id
        }
    }

    #[test]
    fn connect_creates_and_drop_removes() {
        let factory = StreamFactory::<Order>::new();
        assert!(!factory.exists(&7));
        let conn = factory.connect(7);
        assert!(factory.exists(&7));
        assert_eq!(factory.len(), 1);
        drop(conn);
        assert!(!factory.exists(&7));
        assert!(factory.is_empty());
    }

    #[test]
    fn channel_survives_until_last_connection() {
        let factory = ConcurrentStreamFactory::<Order>::new();
        let a = factory.connect(1);
        let b = factory.connect(1);
        drop(a);
        assert!(factory.exists(&1));
        drop(b);
        assert!(!factory.exists(&1));
    }

    #[test]
    fn connections_to_one_key_share_a_channel() {
        let factory = StreamFactory::<Order>::new();
        let a = factory.connect(1);
        let b = factory.connect(1);
        a.emit(Order {
            id: 1,
            status: "placed",
        })
        .unwrap();
        assert_eq!(b.latest().map(|o| o.status), Some("placed"));
    }

    #[test]
    fn old_connection_does_not_remove_channel_recreated_after_clear() {
        let factory = StreamFactory::<Order>::new();
        let old = factory.connect(1);
        factory.clear();
        assert!(factory.is_empty());

        let fresh = factory.connect(1);
        drop(old);
        assert!(factory.exists(&1));
        drop(fresh);
        assert!(!factory.exists(&1));
    }

    #[test]
    fn reentrant_release_is_deferred_then_swept() {
        let factory = StreamFactory::<Order>::new();
        let conn = factory.connect(3);
        factory.registry.channels.with(|map| {
            drop(conn);
            assert_eq!(map.len(), 1);
        });
        assert_eq!(factory.sweep(), 1);
        assert!(factory.is_empty());
    }

    #[test]
    fn deferred_channel_is_replaced_on_connect() {
        let factory = StreamFactory::<Order>::new();
        let conn = factory.connect(3);
        conn.emit(Order {
            id: 3,
            status: "stale",
        })
        .unwrap();
        factory.registry.channels.with(|_| drop(conn));

        let fresh = factory.connect(3);
        assert_eq!(fresh.latest(), None);
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn clear_closes_existing_channels() {
        let factory = ConcurrentStreamFactory::<Order>::new();
        let conn = factory.connect(9);
        factory.clear();
        let err = conn
            .emit(Order {
                id: 9,
                status: "late",
            })
            .unwrap_err();
        assert!(matches!(err, modelcast_core::StreamError::Closed { .. }));
    }

    #[test]
    fn factory_clones_share_the_registry() {
        let factory = ConcurrentStreamFactory::<Order>::new();
        let clone = factory.clone();
        let _conn = clone.connect(4);
        assert!(factory.exists(&4));
    }

    #[test]
    fn config_is_exposed() {
        let factory = StreamFactory::<Order>::with_config(
            StreamConfig::new().equality(|a: &Order, b: &Order| a.id == b.id),
        );
        let a = Order { id: 1, status: "a" };
        let b = Order { id: 1, status: "b" };
        assert!(factory.config().same(&a, &b));
        assert_eq!(factory.filter().execute(a.clone(), None), Some(a));
    }
}
