//! Derive macros for rowgraph
//!
//! Provides `#[derive(Entity)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod entity;

/// Derive `rowgraph::Entity` for a struct.
///
/// # Example
///
/// ```ignore
/// use rowgraph::{Entity, EntityRef, Lazy};
///
/// #[derive(Default, Entity)]
/// struct Author {
///     #[orm(key)]
///     id: i64,
///     #[orm(column = "author_name")]
///     name: String,
///     #[orm(many)]
///     books: Vec<EntityRef<Book>>,
///     #[orm(lazy = "SELECT id AS review_id, body AS review_body FROM reviews WHERE author_id = :id")]
///     reviews: Lazy<Vec<EntityRef<Review>>>,
/// }
/// ```
///
/// # Attributes
///
/// Struct level:
/// - `#[orm(column_prefix = "book_")]` - Prefix for every column without an override
///
/// Field level:
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(key)]` / `#[orm(id)]` - Identity field (at most one)
/// - `#[orm(one)]` - Single relation, type `Option<EntityRef<T>>`
/// - `#[orm(many)]` - Multi relation, type `Vec`, `VecDeque` or `HashSet` of `EntityRef<T>`
/// - `#[orm(lazy = "SQL")]` - Deferred relation, type `Lazy<V>`; `:name` parameters are
///   bound from the entity's fields of the same name
/// - `#[orm(map_key = "field")]` - Key field for a lazy `HashMap`/`BTreeMap` result
/// - `#[orm(accessor = "name")]` - Name of the generated lazy accessor (default: field name)
/// - `#[orm(skip)]` - Not mapped; left at its `Default` value
///
/// Untagged `Option<EntityRef<_>>` and collection-of-`EntityRef` fields are treated as
/// `one` and `many`; every other untagged field is a scalar read from the column of the
/// same name.
///
/// # Generated
///
/// - `impl rowgraph::Entity`
/// - `fn <accessor>(&self) -> OrmResult<&V>` for every lazy field
#[proc_macro_derive(Entity, attributes(orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
