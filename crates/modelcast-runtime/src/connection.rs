#![forbid(unsafe_code)]

//! Consumer handle bound to one channel.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use modelcast_core::{Model, ProducerError, Result, StreamError};

use crate::reactive::emission::Emission;
use crate::reactive::relay::{Notification, Observer, Relay, Subscription};
use crate::reactive::channel::{Channel, Offer};
use crate::registry::{Locking, Registry, Shared};

/// A live link to the channel for one model id.
///
/// Every connection owns its own relay: subscriptions made through it stop
/// receiving values once it is disposed, without affecting other
/// connections to the same id. When the last connection to an id is
/// disposed the registry drops the channel.
pub struct Connection<M: Model, L: Locking = Shared> {
    channel: Arc<Channel<M>>,
    relay: Arc<Relay<M>>,
    registry: Weak<Registry<M, L>>,
    disposed: AtomicBool,
}

impl<M: Model, L: Locking> fmt::Debug for Connection<M, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("model_id", self.channel.key())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl<M: Model, L: Locking> Connection<M, L> {
    pub(crate) fn new(
        channel: Arc<Channel<M>>,
        relay: Arc<Relay<M>>,
        registry: Weak<Registry<M, L>>,
    ) -> Self {
        Self {
            channel,
            relay,
            registry,
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(StreamError::Disposed)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &M::Id {
        self.channel.key()
    }

    /// Observe values. The current value, if any, is delivered first.
    /// Emission errors are not reported; use
    /// [`subscribe_notifications`](Self::subscribe_notifications) for those.
    ///
    /// When another thread is delivering on this id at the time of the call,
    /// the current value is delivered by that thread after this call returns,
    /// still ahead of anything newer. Disposing the connection before then
    /// cancels it.
    pub fn subscribe<F>(&self, on_next: F) -> Result<Subscription>
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.subscribe_notifications(move |notification: &Notification<M>| {
            if let Notification::Next(value) = notification {
                on_next(value);
            }
        })
    }

    /// Observe values and emission errors.
    pub fn subscribe_notifications<F>(&self, observer: F) -> Result<Subscription>
    where
        F: Fn(&Notification<M>) + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let observer: Arc<Observer<M>> = Arc::new(observer);
        self.channel.subscribe(&self.relay, &observer)?;
        Ok(Subscription::new(observer))
    }

    /// Publish `model` now, superseding any pending emission on this id.
    ///
    /// An id mismatch is not an error here: it is delivered to subscribers
    /// as [`StreamError::InvalidId`] and the channel keeps its value. The
    /// returned [`Offer`] says whether the value was published, suppressed
    /// or rejected.
    pub fn emit(&self, model: M) -> Result<Offer> {
        self.ensure_live()?;
        self.channel.emit(model)
    }

    /// Publish the value `future` resolves to, unless another emission on
    /// this id is registered first.
    ///
    /// The producer is registered immediately; the returned [`Emission`]
    /// must be awaited or spawned for the value to arrive.
    pub fn emit_future<F, E>(&self, future: F) -> Result<Emission<M>>
    where
        F: Future<Output = std::result::Result<M, E>> + Send + 'static,
        E: Into<ProducerError> + 'static,
    {
        self.emit_stream(stream::once(future))
    }

    /// Publish every item `producer` yields while it remains the latest
    /// emission on this id.
    pub fn emit_stream<S, E>(&self, producer: S) -> Result<Emission<M>>
    where
        S: Stream<Item = std::result::Result<M, E>> + Send + 'static,
        E: Into<ProducerError> + 'static,
    {
        self.ensure_live()?;
        let ticket = self.channel.replace()?;
        Ok(Emission::new(
            Arc::downgrade(&self.channel),
            ticket,
            producer.map_err(Into::into).boxed(),
        ))
    }

    /// The channel's current value.
    #[must_use]
    pub fn latest(&self) -> Option<M> {
        self.channel.latest()
    }

    /// Live subscriptions made through this connection.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.relay.observer_count()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Detach from the channel. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.relay.clear();
        match self.registry.upgrade() {
            Some(registry) => registry.release(&self.channel, &self.relay),
            None => self.channel.detach_relay(&self.relay),
        }
    }
}

impl<M: Model, L: Locking> Drop for Connection<M, L> {
    fn drop(&mut self) {
        self.dispose();
    }
}
