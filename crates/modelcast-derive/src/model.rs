//! Implementation of `#[derive(Model)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error, Field, Index, Type};

use crate::attrs::{core_path, struct_fields};

fn is_id_field(field: &Field) -> Result<bool, Error> {
    let mut is_id = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                is_id = true;
                Ok(())
            } else {
                Err(meta.error("expected `id`"))
            }
        })?;
    }
    Ok(is_id)
}

pub fn expand_model(input: DeriveInput) -> Result<TokenStream, Error> {
    let name = &input.ident;
    let krate = core_path(&input.attrs)?;
    let fields = struct_fields(&input, "Model")?;

    let mut id: Option<(TokenStream, &Type)> = None;
    for (i, field) in fields.iter().enumerate() {
        if !is_id_field(field)? {
            continue;
        }
        if id.is_some() {
            return Err(Error::new_spanned(
                field,
                "only one field can be marked #[model(id)]",
            ));
        }
        let access = match &field.ident {
            Some(ident) => quote!(#ident),
            None => {
                let index = Index::from(i);
                quote!(#index)
            }
        };
        id = Some((access, &field.ty));
    }

    let Some((access, ty)) = id else {
        return Err(Error::new_spanned(
            name,
            "Model requires one field marked #[model(id)]",
        ));
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Model for #name #ty_generics #where_clause {
            type Id = #ty;

            fn id(&self) -> &Self::Id {
                &self.#access
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_id_field() {
        let out = expand_model(syn::parse_quote!(
            struct User {
                #[model(id)]
                key: u64,
                name: String,
            }
        ))
        .unwrap()
        .to_string();
        assert!(out.contains("type Id = u64"));
        assert!(out.contains("& self . key"));
    }

    #[test]
    fn tuple_id_field() {
        let out = expand_model(syn::parse_quote!(
            struct Tag(String, #[model(id)] u16);
        ))
        .unwrap()
        .to_string();
        assert!(out.contains("type Id = u16"));
        assert!(out.contains("& self . 1"));
    }

    #[test]
    fn missing_id_is_an_error() {
        let err = expand_model(syn::parse_quote!(
            struct NoId {
                name: String,
            }
        ))
        .unwrap_err();
        assert!(err.to_string().contains("#[model(id)]"));
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let err = expand_model(syn::parse_quote!(
            struct TwoIds {
                #[model(id)]
                a: u8,
                #[model(id)]
                b: u8,
            }
        ))
        .unwrap_err();
        assert!(err.to_string().contains("only one field"));
    }
}
