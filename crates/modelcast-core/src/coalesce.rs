#![forbid(unsafe_code)]

//! Structural merge of two snapshots of the same entity.
//!
//! # Design
//!
//! [`Coalesce`] is the capability a model type opts into. `left.coalesce(&right)`
//! keeps every field that is present on `left` and falls back to `right` for
//! the absent ones. Types get it one of two ways:
//!
//! - `#[derive(Coalesce)]`: `Option<T>` fields merge as `left.or(right)`,
//!   every other field is taken from `left`, and `#[coalesce(nested)]` fields
//!   recurse into their own `Coalesce` impl. The merge function is generated
//!   once per type at compile time; shapes it cannot merge (enums, unions,
//!   unit structs) are rejected at compile time.
//! - A hand-written `impl Coalesce`, which is the whole merge for that type.
//!
//! [`Coalescer`] is the strategy object a [`CoalescingFilter`] calls, so a
//! factory can override the type's own merge without touching the type.
//!
//! [`CoalescingFilter`]: crate::filter::CoalescingFilter

/// Merge two snapshots, preferring `self`'s present fields.
pub trait Coalesce: Sized {
    /// Produce a snapshot where every field present on `self` wins and every
    /// absent field comes from `fallback`.
    #[must_use]
    fn coalesce(&self, fallback: &Self) -> Self;
}

impl<T: Clone> Coalesce for Option<T> {
    fn coalesce(&self, fallback: &Self) -> Self {
        match self {
            Some(value) => Some(value.clone()),
            None => fallback.clone(),
        }
    }
}

/// Coalesce two optional snapshots. If either is absent the other is returned
/// unchanged; no merge happens.
#[must_use]
pub fn coalesce_options<M: Coalesce + Clone>(left: Option<&M>, right: Option<&M>) -> Option<M> {
    match (left, right) {
        (Some(l), Some(r)) => Some(l.coalesce(r)),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    }
}

/// Strategy that merges a higher-priority snapshot with a fallback one.
pub trait Coalescer<M>: Send + Sync {
    fn coalesce(&self, left: &M, right: &M) -> M;
}

/// Delegates to the model's own [`Coalesce`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultCoalescer;

impl<M: Coalesce> Coalescer<M> for DefaultCoalescer {
    fn coalesce(&self, left: &M, right: &M) -> M {
        left.coalesce(right)
    }
}

impl<M, F> Coalescer<M> for F
where
    F: Fn(&M, &M) -> M + Send + Sync,
{
    fn coalesce(&self, left: &M, right: &M) -> M {
        self(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Profile {
        id: u32,
        name: String,
        bio: Option<String>,
        age: Option<u8>,
    }

    impl Coalesce for Profile {
        fn coalesce(&self, fallback: &Self) -> Self {
            Self {
                id: self.id,
                name: self.name.clone(),
                bio: self.bio.coalesce(&fallback.bio),
                age: self.age.coalesce(&fallback.age),
            }
        }
    }

    fn profile(name: &str, bio: Option<&str>, age: Option<u8>) -> Profile {
        Profile {
            id: 1,
            name: name.to_string(),
            bio: bio.map(str::to_string),
            age,
        }
    }

    #[test]
    fn option_prefers_left() {
        assert_eq!(Some(1).coalesce(&Some(2)), Some(1));
        assert_eq!(None::<i32>.coalesce(&Some(2)), Some(2));
        assert_eq!(None::<i32>.coalesce(&None), None);
    }

    #[test]
    fn absent_fields_fall_back() {
        let left = profile("X", None, Some(30));
        let right = profile("Y", Some("hello"), Some(40));
        let merged = left.coalesce(&right);
        assert_eq!(merged, profile("X", Some("hello"), Some(30)));
    }

    #[test]
    fn coalesce_options_returns_other_when_one_absent() {
        let only = profile("X", None, None);
        assert_eq!(coalesce_options(Some(&only), None), Some(only.clone()));
        assert_eq!(coalesce_options(None, Some(&only)), Some(only));
        assert_eq!(coalesce_options::<Profile>(None, None), None);
    }

    #[test]
    fn default_coalescer_delegates_to_model() {
        let left = profile("X", None, None);
        let right = profile("X", Some("bio"), Some(3));
        let merged = DefaultCoalescer.coalesce(&left, &right);
        assert_eq!(merged, left.coalesce(&right));
    }

    #[test]
    fn closure_coalescer_overrides_model() {
        let right_wins = |_: &Profile, right: &Profile| right.clone();
        let left = profile("X", Some("a"), None);
        let right = profile("Y", None, None);
        assert_eq!(Coalescer::coalesce(&right_wins, &left, &right), right);
    }
}
