#![forbid(unsafe_code)]

//! Asynchronous producers bound to one channel.
//!
//! An [`Emission`] is the future returned when a connection emits a future or
//! a stream. Polling it forwards every produced item to the channel for as
//! long as its ticket stays current. Once a later emission replaces it, the
//! next poll resolves with [`EmissionStatus::Superseded`] and drops the
//! producer without polling it again.
//!
//! The emission only holds a weak reference to its channel: a producer that
//! outlives every connection resolves with [`EmissionStatus::Detached`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, StreamExt};
use modelcast_core::{Model, ProducerError};

use super::channel::{Channel, Offer, Ticket};

/// How an [`Emission`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionStatus {
    /// The producer ran to completion while current.
    Completed,
    /// A later emission took over the channel.
    Superseded,
    /// The channel was closed or dropped before the producer finished.
    Detached,
}

/// Future driving one producer into its channel.
#[must_use = "an emission does nothing unless polled or spawned"]
pub struct Emission<M: Model> {
    channel: Weak<Channel<M>>,
    ticket: Ticket,
    producer: Option<BoxStream<'static, Result<M, ProducerError>>>,
    published: usize,
}

impl<M: Model> fmt::Debug for Emission<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emission")
            .field("ticket", &self.ticket)
            .field("running", &self.producer.is_some())
            .field("published", &self.published)
            .finish()
    }
}

impl<M: Model> Emission<M> {
    pub(crate) fn new(
        channel: Weak<Channel<M>>,
        ticket: Ticket,
        producer: BoxStream<'static, Result<M, ProducerError>>,
    ) -> Self {
        Self {
            channel,
            ticket,
            producer: Some(producer),
            published: 0,
        }
    }

    /// Values this emission has published so far.
    #[must_use]
    pub fn published(&self) -> usize {
        self.published
    }

    fn finish(&mut self, status: EmissionStatus) -> Poll<EmissionStatus> {
        self.producer = None;
        Poll::Ready(status)
    }
}

impl<M: Model> Future for Emission<M> {
    type Output = EmissionStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            let Some(channel) = this.channel.upgrade() else {
                return this.finish(EmissionStatus::Detached);
            };
            if channel.is_closed() {
                return this.finish(EmissionStatus::Detached);
            }
            if !channel.is_current(this.ticket) {
                return this.finish(EmissionStatus::Superseded);
            }
            let Some(producer) = this.producer.as_mut() else {
                return Poll::Ready(EmissionStatus::Completed);
            };

            match producer.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return this.finish(EmissionStatus::Completed),
                Poll::Ready(Some(item)) => match channel.offer(this.ticket, item) {
                    Offer::Published => this.published += 1,
                    Offer::Superseded => return this.finish(EmissionStatus::Superseded),
                    Offer::Closed => return this.finish(EmissionStatus::Detached),
                    Offer::Suppressed | Offer::Rejected | Offer::Failed => {}
                },
            }
        }
    }
}
