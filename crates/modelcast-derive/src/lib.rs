#![forbid(unsafe_code)]

//! Derive macros for modelcast.
//!
//! Provides `#[derive(Coalesce)]` and `#[derive(Model)]` so model types get a
//! field-by-field merge and an identity accessor without hand-written
//! boilerplate.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelcast_core::{Coalesce, Model};
//!
//! #[derive(Clone, PartialEq, Coalesce, Model)]
//! struct User {
//!     #[model(id)]
//!     id: u64,
//!     name: String,
//!     bio: Option<String>,
//!     #[coalesce(nested)]
//!     address: Address,
//! }
//! ```
//!
//! Generated code names the core crate as `::modelcast_core`. When the core
//! crate is only reachable through another path (for example the `modelcast`
//! facade), point the macros at it with `#[modelcast(crate = modelcast::core)]`.

extern crate proc_macro;

use proc_macro::TokenStream;

use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod coalesce;
mod model;

/// Derive `Coalesce` for a struct.
///
/// # Field rules
///
/// | Field | Merge |
/// |-------|-------|
/// | `Option<T>` | `left` if `Some`, else `right` |
/// | `#[coalesce(nested)]` | `Coalesce::coalesce(&left, &right)` |
/// | `#[coalesce(keep)]` or any other type | `left`, cloned |
///
/// Enums, unions and unit structs have no fields to merge and are rejected.
#[proc_macro_derive(Coalesce, attributes(coalesce, modelcast))]
pub fn derive_coalesce(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    coalesce::expand_coalesce(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `Model` for a struct.
///
/// Exactly one field must carry `#[model(id)]`; its type becomes `Model::Id`.
#[proc_macro_derive(Model, attributes(model, modelcast))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand_model(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
