use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derives `userhub::ListingRow` for a struct fetched by an admin listing.
///
/// Every field carrying `#[column(...)]` becomes a table column, in
/// declaration order. `#[column(label = "Friendly name")]` sets the header,
/// otherwise the field name is used. The field marked `#[listing(resource)]`
/// must be a `uuid::Uuid` and feeds the controls column link.
#[proc_macro_derive(ListingRow, attributes(column, listing))]
pub fn listing_row_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let struct_name = input.ident;
    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => panic!("#[derive(ListingRow)] needs named fields"),
        },
        _ => panic!("#[derive(ListingRow)] can only be used on structs"),
    };

    let mut columns = Vec::new();
    let mut cells = Vec::new();
    let mut resource = None;

    for field in fields.iter() {
        let field_name = field.ident.as_ref().unwrap();
        let attributes = match FieldAttributes::new(field) {
            Ok(attributes) => attributes,
            Err(error) => return error.to_compile_error().into(),
        };

        if attributes.resource {
            resource = Some(field_name.clone());
        }

        if attributes.column {
            columns.push(attributes.to_column(field_name));
            cells.push(quote! { self.#field_name.to_string() });
        }
    }

    let resource_slug = resource.map_or_else(
        || quote! { None },
        |field_name| quote! { Some(userhub::uuid_to_slug(&self.#field_name)) },
    );

    let expanded = quote! {
        impl userhub::ListingRow for #struct_name {
            fn columns() -> Vec<userhub::Column> {
                vec![#(#columns),*]
            }

            fn cells(&self) -> Vec<String> {
                vec![#(#cells),*]
            }

            fn resource_slug(&self) -> Option<String> {
                #resource_slug
            }
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct FieldAttributes {
    column: bool,
    label: Option<LitStr>,
    resource: bool,
}

impl FieldAttributes {
    fn new(field: &syn::Field) -> syn::Result<Self> {
        let mut attrs = FieldAttributes::default();

        for attr in field.attrs.iter() {
            if attr.path().is_ident("column") {
                attrs.column = true;
                if matches!(attr.meta, syn::Meta::Path(_)) {
                    continue;
                }
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("label") {
                        attrs.label = Some(meta.value()?.parse()?);
                        Ok(())
                    } else {
                        Err(meta.error("unsupported column attribute"))
                    }
                })?;
            } else if attr.path().is_ident("listing") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("resource") {
                        attrs.resource = true;
                        Ok(())
                    } else {
                        Err(meta.error("unsupported listing attribute"))
                    }
                })?;
            }
        }

        Ok(attrs)
    }

    fn to_column(&self, field_name: &syn::Ident) -> proc_macro2::TokenStream {
        let label = self.label.as_ref().map_or_else(
            || quote! { stringify!(#field_name) },
            |label| quote! { #label },
        );

        quote! {
            userhub::Column::new(stringify!(#field_name), #label)
        }
    }
}
