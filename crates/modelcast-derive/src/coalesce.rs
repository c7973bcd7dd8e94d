//! Implementation of `#[derive(Coalesce)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error, Field, Fields, Index};

use crate::attrs::{core_path, is_option, struct_fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// `Option<T>`: first present wins.
    Fallback,
    /// Recurse into the field's own `Coalesce` impl.
    Nested,
    /// Take the left operand's value.
    Keep,
}

fn field_strategy(field: &Field) -> Result<Strategy, Error> {
    let mut strategy = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("coalesce") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let chosen = if meta.path.is_ident("nested") {
                Strategy::Nested
            } else if meta.path.is_ident("keep") {
                Strategy::Keep
            } else {
                return Err(meta.error("expected `nested` or `keep`"));
            };
            if strategy.replace(chosen).is_some() {
                return Err(meta.error("conflicting coalesce attributes"));
            }
            Ok(())
        })?;
    }
    Ok(strategy.unwrap_or(if is_option(&field.ty) {
        Strategy::Fallback
    } else {
        Strategy::Keep
    }))
}

pub fn expand_coalesce(input: DeriveInput) -> Result<TokenStream, Error> {
    let name = &input.ident;
    let krate = core_path(&input.attrs)?;
    let fields = struct_fields(&input, "Coalesce")?;

    let merged = |access: TokenStream, strategy: Strategy| match strategy {
        Strategy::Fallback | Strategy::Nested => quote! {
            #krate::Coalesce::coalesce(&self.#access, &fallback.#access)
        },
        Strategy::Keep => quote! {
            ::core::clone::Clone::clone(&self.#access)
        },
    };

    let body = match fields {
        Fields::Named(named) => {
            let inits = named
                .named
                .iter()
                .map(|field| {
                    let ident = field
                        .ident
                        .as_ref()
                        .ok_or_else(|| Error::new_spanned(field, "named field without a name"))?;
                    let value = merged(quote!(#ident), field_strategy(field)?);
                    Ok(quote! { #ident: #value })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            quote! { Self { #(#inits),* } }
        }
        Fields::Unnamed(unnamed) => {
            let values = unnamed
                .unnamed
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let index = Index::from(i);
                    let strategy = field_strategy(field)?;
                    Ok(merged(quote!(#index), strategy))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            quote! { Self(#(#values),*) }
        }
        Fields::Unit => {
            return Err(Error::new_spanned(
                name,
                "Coalesce cannot be derived for unit structs",
            ));
        }
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Coalesce for #name #ty_generics #where_clause {
            fn coalesce(&self, fallback: &Self) -> Self {
                #body
            }
        }
    })
}
