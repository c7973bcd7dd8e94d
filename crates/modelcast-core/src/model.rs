#![forbid(unsafe_code)]

//! Model snapshots and their identity.

use std::fmt::Debug;
use std::hash::Hash;

/// An immutable snapshot of a logical entity, named by its identifier.
///
/// Two snapshots with equal ids are two points in time of the same entity.
/// The runtime keys one channel per id and rejects any snapshot whose id does
/// not match the channel it was emitted into.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Clone, PartialEq, Model)]
/// struct User {
///     #[model(id)]
///     id: u64,
///     name: String,
/// }
/// ```
pub trait Model: Clone + Send + Sync + 'static {
    /// Identifier type. Immutable once a channel exists for it.
    type Id: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// The identifier of this snapshot.
    fn id(&self) -> &Self::Id;
}
