//! `#[derive(Entity)]` declarations and the descriptors they produce.

use rowgraph::{
    Entity, EntityRef, FieldKind, Lazy, ResultSet, Value, describe, map_all,
};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default, Entity)]
struct Author {
    #[orm(id)]
    id: i64,
    #[orm(column = "author_name")]
    name: String,
    r#type: Option<String>,
    #[orm(skip)]
    scratch: u32,
    books: Vec<EntityRef<Book>>,
    #[orm(one)]
    agent: Option<EntityRef<Agent>>,
    #[orm(lazy = "SELECT id AS book_id FROM books WHERE author_id = :id")]
    backlist: Lazy<VecDeque<EntityRef<Book>>>,
}

#[derive(Debug, Default, Entity)]
#[orm(column_prefix = "book_")]
struct Book {
    #[orm(key)]
    id: i64,
    title: String,
    #[orm(many)]
    tags: HashSet<EntityRef<Tag>>,
}

#[derive(Debug, Default, Entity)]
#[orm(column_prefix = "agent_")]
struct Agent {
    #[orm(key)]
    id: i64,
}

#[derive(Debug, Default, Entity)]
#[orm(column_prefix = "tag_")]
struct Tag {
    #[orm(key)]
    id: i64,
    label: String,
}

#[test]
fn descriptor_reflects_attributes() {
    let desc = describe::<Author>().unwrap();
    assert_eq!(desc.name(), "Author");
    assert_eq!(desc.key_field(), Some("id"));
    assert!(desc.has_deferred());

    let fields: Vec<(&str, FieldKind, Option<&str>)> = desc
        .fields()
        .iter()
        .map(|f| (f.name, f.kind, f.column.as_deref()))
        .collect();
    assert_eq!(
        fields,
        [
            ("id", FieldKind::Scalar, Some("id")),
            ("name", FieldKind::Scalar, Some("author_name")),
            ("type", FieldKind::Scalar, Some("type")),
            ("books", FieldKind::MultiRelation, None),
            ("agent", FieldKind::SingleRelation, None),
            ("backlist", FieldKind::MultiRelation, None),
        ]
    );

    let book = describe::<Book>().unwrap();
    assert_eq!(book.key_column(), Some("book_id"));
}

#[test]
fn derived_entities_map_a_join() {
    let labels = [
        "id",
        "author_name",
        "type",
        "book_id",
        "book_title",
        "tag_id",
        "tag_label",
        "agent_id",
    ];
    let row = |book: i64, title: &str, tag: i64, label: &str| {
        vec![
            Value::Int(1),
            Value::Text("Le Guin".into()),
            Value::Null,
            Value::Int(book),
            Value::Text(title.into()),
            Value::Int(tag),
            Value::Text(label.into()),
            Value::Int(4),
        ]
    };
    let rs = ResultSet::from_labels(
        &labels,
        vec![
            row(10, "Earthsea", 100, "fantasy"),
            row(10, "Earthsea", 101, "classic"),
            row(11, "Always Coming Home", 101, "classic"),
        ],
    );

    let authors = map_all::<Author>(Box::new(rs)).unwrap();
    assert_eq!(authors.len(), 1);
    let author = authors[0].borrow();
    assert_eq!(author.name, "Le Guin");
    assert_eq!(author.r#type, None);
    assert_eq!(author.scratch, 0);
    assert_eq!(author.agent.as_ref().unwrap().borrow().id, 4);
    assert_eq!(author.books.len(), 2);

    let earthsea = author.books[0].borrow();
    assert_eq!(earthsea.tags.len(), 2);
    let classic = author.books[1].borrow().tags.iter().next().cloned().unwrap();
    assert!(earthsea.tags.contains(&classic));
    assert!(!author.backlist.is_bound());
}
