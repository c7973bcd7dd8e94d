#![forbid(unsafe_code)]

//! Per-key broadcast node with switch-latest producer semantics.
//!
//! # Design
//!
//! A [`Channel`] owns the last accepted value for one key and the weak set of
//! relays (one per connection) it broadcasts into. Producers register through
//! [`Channel::replace`], which bumps a generation counter and hands back a
//! [`Ticket`]. A result offered with a ticket that is no longer current was
//! superseded by a later emission and is discarded.
//!
//! Accepted values and subscriptions are queued and drained by one thread at
//! a time with the state lock released, so observers may emit or subscribe
//! from inside a callback. Re-entrant work lands at the back of the queue and
//! is delivered after the current notification.
//!
//! # Invariants
//!
//! 1. Every stored value has `id() == key`.
//! 2. The filter always sees the value accepted before it, never a value
//!    accepted concurrently (filter evaluation holds the state lock).
//! 3. A result from a superseded ticket is never published.
//! 4. A value equal (under the configured equality) to the last accepted one
//!    is not published again.
//! 5. A new observer receives the value current at subscribe time first, then
//!    every later publication exactly once.
//!
//! # Failure Modes
//!
//! - **Observer panics**: the panic unwinds through the emitting call; the
//!   drain flag is reset so the next emission drains the remaining queue.
//! - **Filter re-enters the channel**: deadlock on the state lock. Filters
//!   must be pure.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use modelcast_core::{Model, ProducerError, StreamConfig, StreamError};

use super::relay::{Notification, Observer, Relay};

/// Identifies one registered producer. Only the latest ticket is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

/// What happened to one offered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Stored and broadcast.
    Published,
    /// Dropped by the filter, or equal to the current value.
    Suppressed,
    /// A later emission replaced the producer before it resolved.
    Superseded,
    /// The id did not match the channel key; an error was broadcast.
    Rejected,
    /// The producer failed; an error was broadcast.
    Failed,
    /// The channel was closed by its registry.
    Closed,
}

enum Delivery<M> {
    Broadcast(Notification<M>),
    Attach {
        relay: Weak<Relay<M>>,
        observer: Weak<Observer<M>>,
        /// Value current when the observer subscribed.
        snapshot: Option<M>,
    },
}

struct ChannelState<M> {
    latest: Option<M>,
    generation: u64,
    closed: bool,
    relays: Vec<Weak<Relay<M>>>,
    queue: VecDeque<Delivery<M>>,
    draining: bool,
}

impl<M> ChannelState<M> {
    fn live_relays(&mut self) -> Vec<Arc<Relay<M>>> {
        let mut live = Vec::with_capacity(self.relays.len());
        self.relays.retain(|weak| match weak.upgrade() {
            Some(strong) => {
                live.push(strong);
                true
            }
            None => false,
        });
        live
    }
}

/// Broadcast node for one key.
pub struct Channel<M: Model> {
    key: M::Id,
    config: StreamConfig<M>,
    state: Mutex<ChannelState<M>>,
}

impl<M: Model> fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("generation", &state.generation)
            .field("has_value", &state.latest.is_some())
            .field("relays", &state.relays.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<M: Model> Channel<M> {
    pub(crate) fn new(key: M::Id, config: StreamConfig<M>) -> Self {
        Self {
            key,
            config,
            state: Mutex::new(ChannelState {
                latest: None,
                generation: 0,
                closed: false,
                relays: Vec::new(),
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn key(&self) -> &M::Id {
        &self.key
    }

    /// The last accepted value, if any.
    #[must_use]
    pub fn latest(&self) -> Option<M> {
        self.lock().latest.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of attached connections still alive. Dead entries are pruned.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        let mut state = self.lock();
        state.relays.retain(|weak| weak.strong_count() > 0);
        state.relays.len()
    }

    pub(crate) fn attach_relay(&self, relay: &Arc<Relay<M>>) {
        self.lock().relays.push(Arc::downgrade(relay));
    }

    pub(crate) fn detach_relay(&self, relay: &Arc<Relay<M>>) {
        let target = Arc::as_ptr(relay);
        self.lock()
            .relays
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), target));
    }

    /// Stop accepting emissions. The last value stays readable.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.relays.clear();
    }

    /// Register a new producer, superseding every earlier one.
    pub(crate) fn replace(&self) -> Result<Ticket, StreamError> {
        let mut state = self.lock();
        if state.closed {
            return Err(StreamError::closed(&self.key));
        }
        Ok(self.advance(&mut state))
    }

    fn advance(&self, state: &mut ChannelState<M>) -> Ticket {
        state.generation += 1;
        if state.generation > 1 {
            tracing::trace!(
                message = "stream.replaced",
                key = ?self.key,
                generation = state.generation
            );
        }
        Ticket(state.generation)
    }

    pub(crate) fn is_current(&self, ticket: Ticket) -> bool {
        let state = self.lock();
        !state.closed && state.generation == ticket.0
    }

    /// Emit a ready value, superseding every pending producer.
    ///
    /// The generation bump and the acceptance share one critical section: a
    /// ready value is never itself superseded.
    pub(crate) fn emit(&self, value: M) -> Result<Offer, StreamError> {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Err(StreamError::closed(&self.key));
            }
            self.advance(&mut state);
            self.accept(&mut state, value)
        };
        self.drain();
        Ok(outcome)
    }

    /// Offer a producer's result. Publishes only if `ticket` is still current.
    pub(crate) fn offer(&self, ticket: Ticket, result: Result<M, ProducerError>) -> Offer {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                Offer::Closed
            } else if state.generation != ticket.0 {
                tracing::trace!(
                    message = "stream.superseded",
                    key = ?self.key,
                    ticket = ticket.0,
                    current = state.generation
                );
                Offer::Superseded
            } else {
                match result {
                    Ok(value) => self.accept(&mut state, value),
                    Err(error) => {
                        tracing::debug!(message = "stream.producer_failed", key = ?self.key, %error);
                        state
                            .queue
                            .push_back(Delivery::Broadcast(Notification::Error(
                                StreamError::Producer(error),
                            )));
                        Offer::Failed
                    }
                }
            }
        };
        self.drain();
        outcome
    }

    fn accept(&self, state: &mut ChannelState<M>, value: M) -> Offer {
        if value.id() != &self.key {
            return self.reject(state, value.id(), "emitted");
        }

        let Some(filtered) = self
            .config
            .filter_ref()
            .execute(value, state.latest.as_ref())
        else {
            tracing::trace!(message = "stream.suppressed", key = ?self.key, reason = "filter");
            return Offer::Suppressed;
        };

        if filtered.id() != &self.key {
            return self.reject(state, filtered.id(), "filtered");
        }

        if let Some(latest) = &state.latest
            && self.config.same(latest, &filtered)
        {
            tracing::trace!(message = "stream.suppressed", key = ?self.key, reason = "unchanged");
            return Offer::Suppressed;
        }

        state.latest = Some(filtered.clone());
        state
            .queue
            .push_back(Delivery::Broadcast(Notification::Next(filtered)));
        Offer::Published
    }

    fn reject(&self, state: &mut ChannelState<M>, actual: &M::Id, stage: &'static str) -> Offer {
        tracing::warn!(
            message = "stream.rejected",
            key = ?self.key,
            actual = ?actual,
            stage
        );
        state
            .queue
            .push_back(Delivery::Broadcast(Notification::Error(
                StreamError::invalid_id(&self.key, actual),
            )));
        Offer::Rejected
    }

    /// Attach `observer` to `relay`, primed with the current value.
    pub(crate) fn subscribe(
        &self,
        relay: &Arc<Relay<M>>,
        observer: &Arc<Observer<M>>,
    ) -> Result<(), StreamError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(StreamError::closed(&self.key));
            }
            let snapshot = state.latest.clone();
            state.queue.push_back(Delivery::Attach {
                relay: Arc::downgrade(relay),
                observer: Arc::downgrade(observer),
                snapshot,
            });
        }
        self.drain();
        Ok(())
    }

    /// Deliver queued work unless another caller is already doing so.
    fn drain(&self) {
        {
            let mut state = self.lock();
            if state.draining || state.queue.is_empty() {
                return;
            }
            state.draining = true;
        }
        let _reset = DrainReset(self);

        loop {
            let (delivery, relays) = {
                let mut state = self.lock();
                let Some(delivery) = state.queue.pop_front() else {
                    state.draining = false;
                    return;
                };
                let relays = match &delivery {
                    Delivery::Broadcast(_) => state.live_relays(),
                    Delivery::Attach { .. } => Vec::new(),
                };
                (delivery, relays)
            };

            match delivery {
                Delivery::Broadcast(notification) => {
                    for relay in relays {
                        relay.forward(&notification);
                    }
                }
                Delivery::Attach {
                    relay,
                    observer,
                    snapshot,
                } => {
                    let (Some(relay), Some(observer)) = (relay.upgrade(), observer.upgrade())
                    else {
                        continue;
                    };
                    if !relay.attach(Arc::downgrade(&observer)) {
                        continue;
                    }
                    if let Some(value) = snapshot {
                        relay.prime(&observer, Notification::Next(value));
                    }
                }
            }
        }
    }
}

/// Clears the drain flag if an observer panics mid-drain.
struct DrainReset<'a, M: Model>(&'a Channel<M>);

impl<M: Model> Drop for DrainReset<'_, M> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}
