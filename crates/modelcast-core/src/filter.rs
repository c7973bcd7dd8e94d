#![forbid(unsafe_code)]

//! Pre-publication filter pipeline.
//!
//! A filter sees the candidate value and the channel's last accepted value and
//! either returns the value to publish or `None` to drop the update. Filters
//! run under the channel's lock, so they must not emit into the channel they
//! are filtering.
//!
//! # Invariants
//!
//! 1. [`CompositeFilter`] runs stages in declaration order.
//! 2. `last_value` is the same for every stage of one evaluation.
//! 3. The first stage returning `None` ends the evaluation; later stages never
//!    run.
//! 4. [`CoalescingFilter`] never drops a value.

use std::fmt;
use std::sync::Arc;

use crate::coalesce::{Coalesce, Coalescer, DefaultCoalescer};

/// A pre-publication transform or veto stage.
pub trait StreamFilter<M>: Send + Sync {
    /// Returns the value to publish, or `None` to drop the update.
    ///
    /// `last_value` is `None` for the first value a channel ever sees.
    fn execute(&self, new_value: M, last_value: Option<&M>) -> Option<M>;
}

impl<M, F> StreamFilter<M> for F
where
    F: Fn(M, Option<&M>) -> Option<M> + Send + Sync,
{
    fn execute(&self, new_value: M, last_value: Option<&M>) -> Option<M> {
        self(new_value, last_value)
    }
}

/// Publishes every value unchanged. The factory default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThrough;

impl<M> StreamFilter<M> for PassThrough {
    fn execute(&self, new_value: M, _last_value: Option<&M>) -> Option<M> {
        Some(new_value)
    }
}

/// Runs a sequence of filters, short-circuiting on the first `None`.
pub struct CompositeFilter<M> {
    filters: Vec<Arc<dyn StreamFilter<M>>>,
}

impl<M> Clone for CompositeFilter<M> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

impl<M> fmt::Debug for CompositeFilter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("stages", &self.filters.len())
            .finish()
    }
}

impl<M> Default for CompositeFilter<M> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<M> CompositeFilter<M> {
    /// Create a composite from already-shared stages.
    #[must_use]
    pub fn new(filters: impl IntoIterator<Item = Arc<dyn StreamFilter<M>>>) -> Self {
        Self {
            filters: filters.into_iter().collect(),
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn then(mut self, filter: impl StreamFilter<M> + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// The stages, in execution order.
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn StreamFilter<M>>] {
        &self.filters
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl<M> StreamFilter<M> for CompositeFilter<M> {
    fn execute(&self, new_value: M, last_value: Option<&M>) -> Option<M> {
        let mut value = new_value;
        for filter in &self.filters {
            value = filter.execute(value, last_value)?;
        }
        Some(value)
    }
}

/// Merges each new value with the last accepted one through a [`Coalescer`].
///
/// `execute(new, None)` is `new`; `execute(new, Some(last))` is
/// `coalescer.coalesce(new, last)`.
pub struct CoalescingFilter<M> {
    coalescer: Arc<dyn Coalescer<M>>,
}

impl<M> Clone for CoalescingFilter<M> {
    fn clone(&self) -> Self {
        Self {
            coalescer: Arc::clone(&self.coalescer),
        }
    }
}

impl<M> fmt::Debug for CoalescingFilter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingFilter").finish_non_exhaustive()
    }
}

impl<M: Coalesce + 'static> CoalescingFilter<M> {
    /// Coalesce with the model's own [`Coalesce`] implementation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            coalescer: Arc::new(DefaultCoalescer),
        }
    }
}

impl<M: Coalesce + 'static> Default for CoalescingFilter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> CoalescingFilter<M> {
    /// Coalesce with a custom strategy instead of the model's own merge.
    #[must_use]
    pub fn with_coalescer(coalescer: impl Coalescer<M> + 'static) -> Self {
        Self {
            coalescer: Arc::new(coalescer),
        }
    }
}

impl<M> StreamFilter<M> for CoalescingFilter<M> {
    fn execute(&self, new_value: M, last_value: Option<&M>) -> Option<M> {
        match last_value {
            None => Some(new_value),
            Some(last) => Some(self.coalescer.coalesce(&new_value, last)),
        }
    }
}
