#![forbid(unsafe_code)]

//! Core vocabulary for modelcast: model identity, coalescing, stream filters,
//! and per-factory configuration.
//!
//! Nothing in this crate holds shared state. The runtime crate builds the
//! keyed channel registry on top of these pieces.

// Lets the derive macros' `::modelcast_core` paths resolve inside this crate.
extern crate self as modelcast_core;

pub mod coalesce;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;

pub use coalesce::{Coalesce, Coalescer, DefaultCoalescer, coalesce_options};
pub use config::{Equality, StreamConfig};
pub use error::{ProducerError, Result, StreamError};
pub use filter::{CoalescingFilter, CompositeFilter, PassThrough, StreamFilter};
pub use model::Model;

#[cfg(feature = "derive")]
pub use modelcast_derive::{Coalesce, Model};
