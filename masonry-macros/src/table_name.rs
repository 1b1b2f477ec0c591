use convert_case::{Case, Casing};
use syn::{ItemStruct, LitStr};

/// Value of `#[table_name("...")]`, `None` keeps the snake case name of the type.
pub(crate) fn table_name(item: &ItemStruct) -> Option<String> {
    item.attrs.iter().find_map(|attr| {
        if !attr.meta.path().is_ident("table_name") {
            return None;
        }
        let Ok(v) = attr
            .meta
            .require_list()
            .and_then(|v| v.parse_args::<LitStr>())
        else {
            panic!(
                "Error while parsing `table_name`, use it like #[table_name(\"{}_table\")]",
                item.ident.to_string().to_case(Case::Snake)
            );
        };
        Some(v.value())
    })
}
