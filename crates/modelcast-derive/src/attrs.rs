//! Attribute parsing shared by both derives.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{Attribute, Data, DeriveInput, Error, Fields, GenericArgument, Path, PathArguments, Type};

/// Path to the core crate: `::modelcast_core` unless overridden with
/// `#[modelcast(crate = some::path)]`.
pub fn core_path(attrs: &[Attribute]) -> Result<TokenStream, Error> {
    let mut found: Option<Path> = None;
    for attr in attrs {
        if !attr.path().is_ident("modelcast") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                found = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `crate = path`"))
            }
        })?;
    }
    Ok(match found {
        Some(path) => path.into_token_stream(),
        None => quote!(::modelcast_core),
    })
}

/// The fields of a struct with at least one field.
pub fn struct_fields<'a>(input: &'a DeriveInput, derive: &str) -> Result<&'a Fields, Error> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Unit => Err(Error::new_spanned(
                &input.ident,
                format!("{derive} cannot be derived for unit structs"),
            )),
            fields => Ok(fields),
        },
        _ => Err(Error::new_spanned(
            &input.ident,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

/// Whether `ty` is spelled `Option<T>` (including `std::option::Option<T>`).
pub fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }
    match &last.arguments {
        PathArguments::AngleBracketed(args) => {
            args.args.len() == 1 && matches!(args.args[0], GenericArgument::Type(_))
        }
        _ => false,
    }
}
