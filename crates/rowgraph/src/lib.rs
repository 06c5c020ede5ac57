//! # rowgraph
//!
//! A SQL-first mapper from flat result rows to graphs of entities.
//!
//! ## Features
//!
//! - **SQL explicit**: you write the SQL (joins included); `:name` and `?` placeholders
//! - **Graph mapping**: joined rows fold into one parent per key, with single and
//!   multi relations assembled from the same row
//! - **Lazy relations**: `Lazy<V>` fields load on first access through the session the
//!   entity was read in
//! - **Units of work**: one connection and one transaction per top-level call, shared by
//!   nested calls; commit on `Ok`, rollback on `Err`
//!
//! ## Example
//!
//! ```ignore
//! use rowgraph::{Database, DatabaseConfig, Entity, EntityRef, Lazy, OrmResult, UnitOfWork};
//!
//! #[derive(Debug, Default, Entity)]
//! struct Author {
//!     #[orm(key)]
//!     id: i64,
//!     name: String,
//!     #[orm(many)]
//!     books: Vec<EntityRef<Book>>,
//!     #[orm(lazy = "SELECT id AS review_id, body AS review_body FROM reviews WHERE author_id = :id")]
//!     reviews: Lazy<Vec<EntityRef<Review>>>,
//! }
//!
//! #[derive(Debug, Default, Entity)]
//! #[orm(column_prefix = "book_")]
//! struct Book {
//!     #[orm(key)]
//!     id: i64,
//!     title: String,
//! }
//!
//! let db = Database::connect(&DatabaseConfig::from_env()?)?;
//! let authors = db.query(|session| {
//!     let authors = session
//!         .create_query(
//!             "SELECT a.id, a.name, b.id AS book_id, b.title AS book_title
//!              FROM authors a LEFT JOIN books b ON b.author_id = a.id",
//!         )?
//!         .fetch_as::<Author>()?;
//!     for author in &authors {
//!         let author = author.borrow();
//!         println!("{} wrote {} books", author.name, author.books.len());
//!         println!("{} reviews", author.reviews()?.len());
//!     }
//!     Ok(authors)
//! })?;
//! ```

pub mod client;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod lazy;
pub mod mapper;
pub mod pg;
pub mod proxy;
pub mod query;
pub mod row;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod value;

pub use client::{
    ColumnMeta, Connection, ConnectionFactory, Cursor, PlaceholderStyle, ResultSet,
};
pub use config::DatabaseConfig;
pub use convert::{FromValue, ToValue};
pub use descriptor::{
    DescriptorBuilder, EntityDescriptor, FieldInfo, FieldKind, RelationCollection, describe,
};
pub use entity::{Entity, EntityRef};
pub use error::{OrmError, OrmResult};
pub use lazy::{Deferred, Lazy, LazyBinding};
pub use mapper::{EntityStream, MappingPass, map, map_all};
pub use pg::{PgConnection, PgConnector};
pub use proxy::ProxyFactory;
pub use query::Query;
pub use row::{Row, RowContext, Rows};
pub use session::{Session, SessionHandle, SessionState};
pub use sql::{ParsedSql, Placeholder};
pub use transaction::{Database, TransactionIsolation, TransactionOptions, UnitOfWork};
pub use value::{KeyValue, Value};

#[cfg(feature = "derive")]
pub use rowgraph_derive::Entity;
