// Copyright 2023 Gregory Szorc.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Derive macro implementing `jfr_reader::types::typed::JfrType`.
//!
//! `#[derive(JfrType)]` generates a `from_resolved` constructor that reads
//! each struct field by name out of a `ResolvedObject`, converting through
//! `FromValue`. Field names default to the camelCase spelling JFR class
//! metadata uses; both the type name and individual field names can be
//! overridden with `#[jfr(...)]` attributes:
//!
//! ```ignore
//! #[derive(JfrType)]
//! #[jfr(type_name = "jdk.ExecutionSample")]
//! struct ExecutionSample {
//!     start_time: i64,
//!     #[jfr(name = "sampledThread")]
//!     thread: String,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

#[proc_macro_derive(JfrType, attributes(jfr))]
pub fn derive_jfr_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;

    let type_name = struct_attr(&input.attrs, "type_name")?
        .unwrap_or_else(|| struct_name.to_string());

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input,
            "JfrType can only be derived for structs",
        ));
    };

    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input,
            "JfrType requires named struct fields",
        ));
    };

    let mut field_idents = Vec::new();
    let mut field_names = Vec::new();
    let mut field_types = Vec::new();

    for field in &fields.named {
        let ident = field.ident.as_ref().expect("named field");
        let jfr_name =
            field_attr(&field.attrs, "name")?.unwrap_or_else(|| camel_case(&ident.to_string()));

        field_idents.push(ident.clone());
        field_names.push(jfr_name);
        field_types.push(field.ty.clone());
    }

    let field_specs = field_names.iter().map(|name| {
        quote! { ::jfr_reader::types::typed::FieldSpec { name: #name } }
    });

    let field_constructors = field_idents.iter().zip(field_names.iter()).zip(field_types.iter()).map(
        |((ident, name), ty)| {
            quote! {
                #ident: <#ty as ::jfr_reader::types::typed::FromValue>::from_value(
                    object.field(#name).ok_or_else(|| {
                        ::jfr_reader::error::Error::Deserialize(format!(
                            "missing field {} on class {}",
                            #name,
                            object.class().name
                        ))
                    })?,
                )?
            }
        },
    );

    Ok(quote! {
        impl ::jfr_reader::types::typed::JfrType for #struct_name {
            const TYPE_NAME: &'static str = #type_name;

            const FIELDS: &'static [::jfr_reader::types::typed::FieldSpec] = &[
                #(#field_specs),*
            ];

            fn from_resolved(
                object: &::jfr_reader::value::ResolvedObject,
            ) -> ::jfr_reader::error::Result<Self> {
                Ok(Self {
                    #(#field_constructors),*
                })
            }
        }
    })
}

fn struct_attr(attrs: &[syn::Attribute], key: &str) -> syn::Result<Option<String>> {
    attr_value(attrs, key)
}

fn field_attr(attrs: &[syn::Attribute], key: &str) -> syn::Result<Option<String>> {
    attr_value(attrs, key)
}

fn attr_value(attrs: &[syn::Attribute], key: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if !attr.path().is_ident("jfr") {
            continue;
        }

        let mut result = None;

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let value = meta.value()?;
                let lit: Lit = value.parse()?;

                if let Lit::Str(s) = lit {
                    result = Some(s.value());
                    Ok(())
                } else {
                    Err(meta.error("expected string literal"))
                }
            } else {
                // Consume and ignore meta we don't recognize, e.g. other
                // keys in the same #[jfr(...)] list.
                let _ = meta.value().and_then(|v| v.parse::<Meta>().map(|_| ()));
                Ok(())
            }
        })?;

        if result.is_some() {
            return Ok(result);
        }
    }

    Ok(None)
}

/// Convert `snake_case` to `camelCase`, matching JFR's field naming convention.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    out
}
