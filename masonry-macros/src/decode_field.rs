use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, quote};
use syn::{
    Field, GenericArgument, Ident, LitBool, LitStr, PathArguments, Type, meta::ParseNestedMeta,
    parse::ParseBuffer,
};

/// Types stored in a single column, an `Option` or `Vec` of anything else holds related entities.
const VALUE_TYPES: &[&str] = &[
    "bool",
    "i8",
    "i16",
    "i32",
    "i64",
    "u8",
    "u16",
    "u32",
    "u64",
    "f32",
    "f64",
    "String",
    "Decimal",
    "Uuid",
    "Date",
    "Time",
    "PrimitiveDateTime",
    "OffsetDateTime",
];

pub(crate) enum FieldKind {
    /// Builder calls chained after `model.column(..)`.
    Column(Vec<TokenStream>),
    /// Builder call chained after `model.related(..)`, if any.
    Related(Option<TokenStream>),
}

pub(crate) struct FieldMetadata {
    pub(crate) ident: Ident,
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
}

fn is_path(arg: &ParseNestedMeta, name: &str) {
    let Err(..) = arg.value() else {
        // value() is Err for Meta::Path
        panic!("Error while parsing `{name}`, use it like: `#[masonry({name})]`");
    };
}

fn string_value(arg: &ParseNestedMeta, name: &str) -> String {
    let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
        panic!("Error while parsing `{name}`, use it like: `#[masonry({name} = \"...\")]`");
    };
    v.value()
}

/// True for `Option<T>` and `Vec<T>` where `T` is not a column type.
fn holds_entities(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(outer) = path.path.segments.last() else {
        return false;
    };
    if outer.ident != "Option" && outer.ident != "Vec" {
        return false;
    }
    let PathArguments::AngleBracketed(args) = &outer.arguments else {
        return false;
    };
    let Some(GenericArgument::Type(Type::Path(inner))) = args.args.first() else {
        return false;
    };
    let Some(inner) = inner.path.segments.last() else {
        return false;
    };
    inner.arguments.is_empty() && !VALUE_TYPES.iter().any(|v| inner.ident == v)
}

pub(crate) fn decode_field(field: &Field) -> FieldMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Field is expected to have a name");
    let name = ident.to_string();
    let mut modifiers = Vec::new();
    let mut hint = None;
    let mut related = holds_entities(&field.ty);
    for attr in &field.attrs {
        let meta = &attr.meta;
        if !meta.path().is_ident("masonry") {
            continue;
        }
        let Ok(list) = meta.require_list() else {
            panic!(
                "Error while parsing `masonry`, use it like: `#[masonry(attribute = value, ...)]`"
            );
        };
        let _ = list.parse_nested_meta(|arg| {
            let Some(key) = arg.path.get_ident().map(Ident::to_string) else {
                panic!(
                    "Unknown attribute `{}` inside masonry macro",
                    arg.path.to_token_stream()
                );
            };
            match key.as_str() {
                "primary_key" | "auto_increment" | "ignore" | "unique" | "created_at"
                | "updated_at" | "deleted_at" => {
                    is_path(&arg, &key);
                    let call = Ident::new(&key, Span::call_site());
                    modifiers.push(quote!(.#call()));
                }
                "column" => {
                    if arg.input.peek(syn::Token![=]) {
                        let column = string_value(&arg, "column");
                        modifiers.push(quote!(.column(#column)));
                    }
                    related = false;
                }
                "index" => {
                    if arg.input.peek(syn::Token![=]) {
                        let index = string_value(&arg, "index");
                        modifiers.push(quote!(.index_named(#index)));
                    } else {
                        modifiers.push(quote!(.index()));
                    }
                }
                "unique_index" => {
                    let index = string_value(&arg, "unique_index");
                    modifiers.push(quote!(.unique_index_named(#index)));
                }
                "default" => {
                    let default = string_value(&arg, "default");
                    modifiers.push(quote!(.default_sql(#default)));
                }
                "sql_type" => {
                    let sql_type = string_value(&arg, "sql_type");
                    modifiers.push(quote!(.sql_type(#sql_type)));
                }
                "nullable" => {
                    let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitBool>) else {
                        panic!(
                            "Error while parsing `nullable`, use it like: `#[masonry(nullable = false)]`"
                        );
                    };
                    modifiers.push(quote!(.nullable(#v)));
                }
                "related" => {
                    is_path(&arg, "related");
                    related = true;
                }
                "belongs_to" | "one_to_one" | "one_to_many" | "junction" => {
                    let link = string_value(&arg, &key);
                    let call = Ident::new(&key, Span::call_site());
                    hint = Some(quote!(.#call(#link)));
                    related = true;
                }
                "many_to_many" => {
                    is_path(&arg, "many_to_many");
                    hint = Some(quote!(.many_to_many()));
                    related = true;
                }
                _ => panic!("Unknown attribute `{key}` inside masonry macro"),
            }
            Ok(())
        });
    }
    let kind = if related {
        if !modifiers.is_empty() {
            panic!("Field `{name}` holds related entities, column attributes do not apply to it");
        }
        FieldKind::Related(hint)
    } else {
        if hint.is_some() {
            panic!("Field `{name}` is a column, relation attributes do not apply to it");
        }
        FieldKind::Column(modifiers)
    };
    FieldMetadata { ident, name, kind }
}
