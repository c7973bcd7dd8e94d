#![forbid(unsafe_code)]

//! Per-connection forwarding point and subscription guards.
//!
//! A [`Relay`] is what a channel broadcasts into: one per connection. It keeps
//! its observers as `Weak` function pointers; the strong reference lives in
//! the [`Subscription`] handed to the caller, so dropping the subscription is
//! enough to stop delivery. Dead entries are pruned lazily on the next
//! forward.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use modelcast_core::StreamError;

/// What an observer receives.
#[derive(Debug)]
pub enum Notification<M> {
    /// A newly published value (or the current value on subscribe).
    Next(M),
    /// An emission failed. The channel's value is unchanged and later
    /// emissions are still delivered.
    Error(StreamError),
}

impl<M> Notification<M> {
    #[must_use]
    pub fn value(&self) -> Option<&M> {
        match self {
            Self::Next(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Next(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

pub(crate) type Observer<M> = dyn Fn(&Notification<M>) + Send + Sync;

/// RAII guard for an observer callback. Dropping it stops delivery.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    _observer: Box<dyn Any + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new<M: 'static>(observer: Arc<Observer<M>>) -> Self {
        Self {
            _observer: Box::new(observer),
        }
    }

    /// Stop delivery now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

struct RelayState<M> {
    observers: Vec<Weak<Observer<M>>>,
    closed: bool,
}

pub(crate) struct Relay<M> {
    state: Mutex<RelayState<M>>,
}

impl<M> Relay<M> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RelayState {
                observers: Vec::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `observer`. Returns `false` once the relay is closed.
    pub(crate) fn attach(&self, observer: Weak<Observer<M>>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.observers.push(observer);
        true
    }

    /// Deliver to every live observer, in registration order. Observers are
    /// called without the relay lock held.
    pub(crate) fn forward(&self, notification: &Notification<M>) {
        let live: Vec<Arc<Observer<M>>> = {
            let mut state = self.lock();
            let mut live = Vec::with_capacity(state.observers.len());
            state.observers.retain(|weak| match weak.upgrade() {
                Some(strong) => {
                    live.push(strong);
                    true
                }
                None => false,
            });
            live
        };
        for observer in live {
            observer(notification);
        }
    }

    /// Deliver the subscribe-time value to a single observer, unless the
    /// relay has been closed since it was attached.
    pub(crate) fn prime(&self, observer: &Arc<Observer<M>>, notification: Notification<M>) {
        if self.is_closed() {
            return;
        }
        observer(&notification);
    }

    pub(crate) fn observer_count(&self) -> usize {
        let mut state = self.lock();
        state.observers.retain(|weak| weak.strong_count() > 0);
        state.observers.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop every observer and refuse new ones.
    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.observers.clear();
    }
}
