//! Model derive macro implementation

use crate::attrs::{column_name, field_attr, get_table_name};
use crate::common::syn_types::{named_fields, option_inner};
use heck::ToShoutySnakeCase;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::{DeriveInput, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let table_name = get_table_name(&input)?;
    let fields = named_fields(&input, "Model")?;

    let mut column_defs = Vec::with_capacity(fields.len());
    let mut col_consts = Vec::with_capacity(fields.len());
    let mut param_entries = Vec::with_capacity(fields.len());
    let mut seen = HashSet::with_capacity(fields.len());

    for field in fields {
        let attr = field_attr(field)?;
        let column = column_name(field, &attr);
        if !seen.insert(column.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("duplicate column `{column}`"),
            ));
        }

        let mut def = quote! { ::sqlplan::ColumnDef::new(#column) };
        if option_inner(&field.ty).is_some() {
            def = quote! { #def.nullable() };
        }
        if attr.is_id {
            def = quote! { #def.primary_key() };
        }
        if attr.generated {
            def = quote! { #def.generated() };
        }
        column_defs.push(def);

        let const_name = format_ident!("COL_{}", column.to_shouty_snake_case());
        col_consts.push(quote! {
            pub const #const_name: &'static str = #column;
        });

        let field_ident = &field.ident;
        param_entries.push(quote! {
            params.insert(#column, ::sqlplan::ToValue::to_value(&self.#field_ident));
        });
    }

    let column_count = column_defs.len();

    Ok(quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            #(#col_consts)*
        }

        impl #impl_generics ::sqlplan::Model for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table_name;

            fn columns() -> &'static [::sqlplan::ColumnDef] {
                static COLUMNS: [::sqlplan::ColumnDef; #column_count] = [#(#column_defs),*];
                &COLUMNS
            }

            fn to_params(&self) -> ::sqlplan::Params {
                let mut params = ::sqlplan::Params::new();
                #(#param_entries)*
                params
            }
        }
    })
}
