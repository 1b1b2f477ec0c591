mod decode_field;
mod table_name;
mod table_primary_key;

use decode_field::{FieldKind, decode_field};
use proc_macro::TokenStream;
use quote::quote;
use syn::{Fields, ItemStruct, parse_macro_input};
use table_name::table_name;
use table_primary_key::table_primary_key;

/// Implements `masonry::Entity`, every named field becomes a column or a relation.
#[proc_macro_derive(Entity, attributes(masonry, table_name, primary_key))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    let name = &item.ident;
    let Fields::Named(..) = &item.fields else {
        panic!("Entity `{name}` must be a struct with named fields");
    };
    let primary_keys = table_primary_key(&item);
    let table = table_name(&item).map(|table| quote!(model.table(#table);));
    let fields: Vec<_> = item.fields.iter().map(decode_field).collect();
    for pk in &primary_keys {
        if !fields.iter().any(|f| f.name == *pk) {
            panic!("Primary key `{pk}` is not a field of `{name}`");
        }
    }
    let declarations = fields.iter().map(|field| {
        let ident = &field.ident;
        let field_name = &field.name;
        match &field.kind {
            FieldKind::Column(modifiers) => {
                let primary_key = primary_keys
                    .contains(&field.name)
                    .then(|| quote!(.primary_key()));
                quote! {
                    model
                        .column(#field_name, |v| &v.#ident, |v| &mut v.#ident)
                        #primary_key
                        #(#modifiers)*;
                }
            }
            FieldKind::Related(hint) => quote! {
                model.related(#field_name, |v| &mut v.#ident) #hint;
            },
        }
    });
    quote! {
        impl ::masonry::Entity for #name {
            fn describe(model: &mut ::masonry::ModelBuilder<Self>) {
                #table
                #(#declarations)*
            }
        }
    }
    .into()
}
