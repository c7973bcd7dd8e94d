#![forbid(unsafe_code)]

//! Per-factory configuration.
//!
//! A [`StreamConfig`] is handed to a factory at construction and never changes
//! afterwards. It carries the two strategies every channel of that factory
//! shares: the equality rule guarding publication and the filter pipeline.

use std::fmt;
use std::sync::Arc;

use crate::coalesce::{Coalesce, Coalescer};
use crate::filter::{CoalescingFilter, PassThrough, StreamFilter};

/// Equality rule deciding whether a filtered value is observably new.
pub type Equality<M> = Arc<dyn Fn(&M, &M) -> bool + Send + Sync>;

/// Strategies shared by every channel of one factory.
pub struct StreamConfig<M> {
    equality: Equality<M>,
    filter: Arc<dyn StreamFilter<M>>,
}

impl<M> Clone for StreamConfig<M> {
    fn clone(&self) -> Self {
        Self {
            equality: Arc::clone(&self.equality),
            filter: Arc::clone(&self.filter),
        }
    }
}

impl<M> fmt::Debug for StreamConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig").finish_non_exhaustive()
    }
}

impl<M: PartialEq + 'static> Default for StreamConfig<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: PartialEq + 'static> StreamConfig<M> {
    /// `PartialEq` equality and a pass-through filter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_equality(|a: &M, b: &M| a == b)
    }
}

impl<M: 'static> StreamConfig<M> {
    /// Start from a custom equality rule and a pass-through filter.
    #[must_use]
    pub fn with_equality(equality: impl Fn(&M, &M) -> bool + Send + Sync + 'static) -> Self {
        Self {
            equality: Arc::new(equality),
            filter: Arc::new(PassThrough),
        }
    }

    /// Replace the equality rule.
    #[must_use]
    pub fn equality(mut self, equality: impl Fn(&M, &M) -> bool + Send + Sync + 'static) -> Self {
        self.equality = Arc::new(equality);
        self
    }

    /// Replace the filter pipeline.
    #[must_use]
    pub fn filter(mut self, filter: impl StreamFilter<M> + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Replace the filter pipeline with an already-shared filter.
    #[must_use]
    pub fn shared_filter(mut self, filter: Arc<dyn StreamFilter<M>>) -> Self {
        self.filter = filter;
        self
    }

    /// Coalesce every new value with the last accepted one using a custom
    /// strategy instead of the model's own merge.
    #[must_use]
    pub fn with_coalescer(self, coalescer: impl Coalescer<M> + 'static) -> Self {
        self.filter(CoalescingFilter::with_coalescer(coalescer))
    }

    /// Whether `a` and `b` are observably the same under this configuration.
    #[must_use]
    pub fn same(&self, a: &M, b: &M) -> bool {
        (self.equality)(a, b)
    }

    /// The configured filter pipeline.
    #[must_use]
    pub fn filter_ref(&self) -> &Arc<dyn StreamFilter<M>> {
        &self.filter
    }
}

impl<M: Coalesce + 'static> StreamConfig<M> {
    /// Coalesce every new value with the last accepted one using the model's
    /// own [`Coalesce`] implementation.
    #[must_use]
    pub fn coalescing(self) -> Self {
        self.filter(CoalescingFilter::new())
    }
}
