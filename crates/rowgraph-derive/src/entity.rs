//! Entity derive macro implementation

mod attrs;

use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

use crate::common::syn_types::{lazy_inner, multi_relation_target, single_relation_target};

use attrs::FieldAttr;

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ));
        }
    };

    let prefix = attrs::column_prefix(&input)?.map(|p| quote! { d.column_prefix(#p); });

    let mut declarations = Vec::new();
    let mut accessors = Vec::new();
    let mut key_span = None;

    for field in fields {
        let attr = attrs::field_attr(field)?;
        if attr.skip {
            continue;
        }
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let field_name = ident.unraw().to_string();

        match classify(field, &attr)? {
            Kind::Scalar => {
                let column = attr.column.as_ref().map(|c| quote! { .column(#c) });
                let key = if attr.key {
                    if key_span.replace(ident.span()).is_some() {
                        return Err(syn::Error::new_spanned(
                            ident,
                            "at most one field can be marked #[orm(key)]",
                        ));
                    }
                    Some(quote! { .key() })
                } else {
                    None
                };
                declarations.push(quote! {
                    d.scalar(#field_name, |e| &e.#ident, |e| &mut e.#ident) #column #key;
                });
            }
            Kind::One => declarations.push(quote! {
                d.one(#field_name, |e| &mut e.#ident);
            }),
            Kind::Many => declarations.push(quote! {
                d.many(#field_name, |e| &mut e.#ident);
            }),
            Kind::Lazy(value_ty) => {
                let sql = attr.lazy.as_ref().map(|s| s.value()).unwrap_or_default();
                let map_key = attr.map_key.as_ref().map(|k| quote! { .map_key(#k) });
                declarations.push(quote! {
                    d.deferred(#field_name, #sql, |e| &e.#ident, |e| &mut e.#ident) #map_key;
                });

                let accessor = attr
                    .accessor
                    .clone()
                    .unwrap_or_else(|| ident.clone());
                let doc = format!("Load `{field_name}` on first access.");
                accessors.push(quote! {
                    #[doc = #doc]
                    pub fn #accessor(&self) -> ::rowgraph::OrmResult<&#value_ty> {
                        self.#ident.get(self)
                    }
                });
            }
        }
    }

    let accessor_impl = if accessors.is_empty() {
        quote! {}
    } else {
        quote! {
            impl #impl_generics #name #ty_generics #where_clause {
                #(#accessors)*
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::rowgraph::Entity for #name #ty_generics #where_clause {
            fn describe(d: &mut ::rowgraph::DescriptorBuilder<Self>) {
                #prefix
                #(#declarations)*
            }
        }

        #accessor_impl
    })
}

enum Kind {
    Scalar,
    One,
    Many,
    Lazy(syn::Type),
}

fn classify(field: &syn::Field, attr: &FieldAttr) -> Result<Kind> {
    let ty = &field.ty;
    let err = |msg: &str| Err(syn::Error::new_spanned(field, msg));

    let explicit = [attr.one, attr.many, attr.lazy.is_some()]
        .iter()
        .filter(|b| **b)
        .count();
    if explicit > 1 {
        return err("only one of `one`, `many` and `lazy` may be given");
    }

    let kind = if let Some(sql) = &attr.lazy {
        let Some(inner) = lazy_inner(ty) else {
            return err("#[orm(lazy)] requires a field of type `Lazy<V>`");
        };
        if sql.value().trim().is_empty() {
            return Err(syn::Error::new_spanned(sql, "lazy load query is empty"));
        }
        Kind::Lazy(inner.clone())
    } else if attr.one {
        if single_relation_target(ty).is_none() {
            return err("#[orm(one)] requires a field of type `Option<EntityRef<T>>`");
        }
        Kind::One
    } else if attr.many {
        if multi_relation_target(ty).is_none() {
            return err(
                "#[orm(many)] requires a `Vec`, `VecDeque` or `HashSet` of `EntityRef<T>`",
            );
        }
        Kind::Many
    } else if lazy_inner(ty).is_some() {
        return err("`Lazy` fields need a load query: #[orm(lazy = \"SELECT ...\")]");
    } else if single_relation_target(ty).is_some() {
        Kind::One
    } else if multi_relation_target(ty).is_some() {
        Kind::Many
    } else {
        Kind::Scalar
    };

    let scalar = matches!(kind, Kind::Scalar);
    if !scalar && (attr.key || attr.column.is_some()) {
        return err("`key` and `column` apply to scalar fields only");
    }
    let lazy = matches!(kind, Kind::Lazy(_));
    if !lazy && (attr.map_key.is_some() || attr.accessor.is_some()) {
        return err("`map_key` and `accessor` apply to lazy fields only");
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand_str(input: DeriveInput) -> Result<String> {
        expand(input).map(|ts| ts.to_string())
    }

    #[test]
    fn expands_scalars_and_relations() {
        let input: DeriveInput = parse_quote! {
            #[orm(column_prefix = "author_")]
            struct Author {
                #[orm(key)]
                id: i64,
                #[orm(column = "full_name")]
                name: String,
                books: Vec<EntityRef<Book>>,
                agent: Option<EntityRef<Agent>>,
                #[orm(skip)]
                scratch: u32,
            }
        };
        let out = expand_str(input).unwrap();
        assert!(out.contains("column_prefix (\"author_\")"));
        assert!(out.contains("scalar (\"id\""));
        assert!(out.contains(". key ()"));
        assert!(out.contains(". column (\"full_name\")"));
        assert!(out.contains("many (\"books\""));
        assert!(out.contains("one (\"agent\""));
        assert!(!out.contains("scratch"));
    }

    #[test]
    fn expands_lazy_accessor() {
        let input: DeriveInput = parse_quote! {
            struct Author {
                #[orm(key)]
                id: i64,
                #[orm(lazy = "SELECT id AS review_id FROM reviews WHERE author_id = :id")]
                reviews: Lazy<Vec<EntityRef<Review>>>,
                #[orm(lazy = "SELECT isbn FROM books WHERE author_id = :id", map_key = "isbn", accessor = "books_by_isbn")]
                books: Lazy<HashMap<String, EntityRef<Book>>>,
            }
        };
        let out = expand_str(input).unwrap();
        assert!(out.contains("deferred (\"reviews\""));
        assert!(out.contains("pub fn reviews (& self)"));
        assert!(out.contains("map_key (\"isbn\")"));
        assert!(out.contains("pub fn books_by_isbn (& self)"));
    }

    #[test]
    fn rejects_misplaced_attributes() {
        let cases: Vec<DeriveInput> = vec![
            parse_quote! { struct A { #[orm(key)] a: i64, #[orm(key)] b: i64 } },
            parse_quote! { struct A { r: Lazy<Vec<EntityRef<B>>> } },
            parse_quote! { struct A { #[orm(lazy = "SELECT 1")] r: Vec<EntityRef<B>> } },
            parse_quote! { struct A { #[orm(one)] r: Vec<EntityRef<B>> } },
            parse_quote! { struct A { #[orm(many)] r: Vec<u8> } },
            parse_quote! { struct A { #[orm(key)] r: Option<EntityRef<B>> } },
            parse_quote! { struct A { #[orm(map_key = "x")] r: i64 } },
            parse_quote! { struct A(i64); },
            parse_quote! { enum A { X } },
        ];
        for input in cases {
            assert!(expand(input).is_err());
        }
    }
}
