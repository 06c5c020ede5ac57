//! Attribute parsing for the Entity derive macro.
//!
//! Handles struct-level and field-level `#[orm(...)]` attributes.

use syn::{DeriveInput, Result};

/// Parsed field-level `#[orm(...)]` attributes.
#[derive(Default)]
pub(super) struct FieldAttr {
    pub column: Option<String>,
    pub key: bool,
    pub one: bool,
    pub many: bool,
    pub lazy: Option<syn::LitStr>,
    pub map_key: Option<String>,
    pub accessor: Option<syn::Ident>,
    pub skip: bool,
}

impl FieldAttr {
    fn merge(&mut self, other: FieldAttr) {
        self.column = other.column.or(self.column.take());
        self.key |= other.key;
        self.one |= other.one;
        self.many |= other.many;
        self.lazy = other.lazy.or(self.lazy.take());
        self.map_key = other.map_key.or(self.map_key.take());
        self.accessor = other.accessor.or(self.accessor.take());
        self.skip |= other.skip;
    }
}

impl syn::parse::Parse for FieldAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut attr = FieldAttr::default();

        // Comma-separated flags or key = "value" pairs
        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            match ident.to_string().as_str() {
                "key" | "id" => attr.key = true,
                "one" => attr.one = true,
                "many" => attr.many = true,
                "skip" => attr.skip = true,
                "column" | "lazy" | "map_key" | "accessor" => {
                    let _: syn::Token![=] = input.parse()?;
                    let value: syn::LitStr = input.parse()?;
                    match ident.to_string().as_str() {
                        "column" => attr.column = Some(value.value()),
                        "lazy" => attr.lazy = Some(value),
                        "map_key" => attr.map_key = Some(value.value()),
                        _ => attr.accessor = Some(value.parse()?),
                    }
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown orm attribute `{other}`"),
                    ));
                }
            }

            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }

        if !input.is_empty() {
            return Err(input.error("expected `,`"));
        }
        Ok(attr)
    }
}

/// Collect every `#[orm(...)]` on a field.
pub(super) fn field_attr(field: &syn::Field) -> Result<FieldAttr> {
    let mut attr = FieldAttr::default();
    for a in &field.attrs {
        if a.path().is_ident("orm") {
            attr.merge(a.parse_args::<FieldAttr>()?);
        }
    }
    Ok(attr)
}

/// Extract `column_prefix` from struct-level `#[orm(column_prefix = "...")]`.
pub(super) fn column_prefix(input: &DeriveInput) -> Result<Option<String>> {
    for attr in &input.attrs {
        if attr.path().is_ident("orm") {
            let nested = attr.parse_args::<syn::MetaNameValue>()?;
            if !nested.path.is_ident("column_prefix") {
                return Err(syn::Error::new_spanned(
                    &nested.path,
                    "unknown struct-level orm attribute; expected `column_prefix`",
                ));
            }
            if let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) = &nested.value
            {
                return Ok(Some(lit.value()));
            }
            return Err(syn::Error::new_spanned(
                &nested.value,
                "column_prefix must be a string literal",
            ));
        }
    }
    Ok(None)
}
