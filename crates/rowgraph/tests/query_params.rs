//! Placeholder binding and result-shape checks on `Query`.

mod common;

use common::{FakeDb, SELECT_ITEMS};
use rowgraph::{Entity, EntityRef, OrmError, UnitOfWork, Value};

#[derive(Debug, Default, Entity)]
struct Item {
    #[orm(key)]
    id: i64,
    name: String,
}

#[derive(Debug, Default, Entity)]
struct Filter {
    a: i64,
    b: Option<String>,
}

#[test]
fn unset_named_parameter_is_reported() {
    let fake = FakeDb::new();
    let err = fake
        .database()
        .query(|session| {
            session
                .create_query("SELECT a FROM t WHERE a = :a AND b = :b")?
                .set("a", 1i64)?
                .execute()
        })
        .unwrap_err();

    match err.root_cause() {
        OrmError::MissingParameters(names) => assert_eq!(names, &["b"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(fake.statements().is_empty());
}

#[test]
fn unset_positional_parameter_uses_its_index() {
    let fake = FakeDb::new();
    let err = fake
        .database()
        .query(|session| {
            session
                .create_query("SELECT ? , :x, ?")?
                .set_at(1, 1i64)?
                .set("x", "x")?
                .fetch_rows()
        })
        .unwrap_err();
    match err.root_cause() {
        OrmError::MissingParameters(names) => assert_eq!(names, &["?2"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_names_and_indexes_are_rejected() {
    let fake = FakeDb::new();
    fake.database()
        .open(|session| {
            let query = session.create_query("SELECT :a, ?")?;
            assert!(matches!(
                query.set("nope", 1i64),
                Err(OrmError::UnknownParameter(name)) if name == "nope"
            ));

            let query = session.create_query("SELECT :a, ?")?;
            assert!(matches!(
                query.set_at(2, 1i64),
                Err(OrmError::ParameterIndex { index: 2, count: 1 })
            ));

            assert!(matches!(
                session.create_query("SELECT :a, :a"),
                Err(OrmError::DuplicateParameter(name)) if name == "a"
            ));
            Ok(())
        })
        .unwrap();
}

#[test]
fn parameters_follow_placeholder_order() {
    let fake = FakeDb::new();
    fake.script("SELECT 1", &["one"], vec![vec![Value::Int(1)]]);

    fake.database()
        .open(|session| {
            let rows = session
                .create_query("SELECT 1 WHERE x = :x AND y = ? AND z = :z AND s = ':x'")?
                .set("z", "zed")?
                .set_at(1, 2i64)?
                .set("x", Option::<i64>::None)?
                .fetch_rows()?;
            assert_eq!(rows.len(), 1);
            Ok(())
        })
        .unwrap();

    assert_eq!(
        fake.statements(),
        ["SELECT 1 WHERE x = $1 AND y = $2 AND z = $3 AND s = ':x'"]
    );
    assert_eq!(
        fake.last_params(),
        [Value::Null, Value::Int(2), Value::Text("zed".into())]
    );
}

#[test]
fn bind_reads_matching_fields() {
    let fake = FakeDb::new();
    fake.script("SELECT a", &["a"], vec![]);

    fake.database()
        .open(|session| {
            let filter = Filter {
                a: 3,
                b: Some("bee".into()),
            };
            session
                .create_query("SELECT a FROM t WHERE a = :a AND b = :b AND c = :c")?
                .bind(&filter)?
                .set("c", true)?
                .fetch_rows()?;
            Ok(())
        })
        .unwrap();

    assert_eq!(
        fake.last_params(),
        [Value::Int(3), Value::Text("bee".into()), Value::Bool(true)]
    );
}

#[test]
fn execute_update_returns_generated_key_for_round_trip() {
    let fake = FakeDb::new();
    let db = fake.database();

    let id = db
        .query(|session| {
            let draft = Item {
                id: 0,
                name: "widget".into(),
            };
            let keys = session
                .create_query("INSERT INTO items (name) VALUES (:name) RETURNING id")?
                .bind(&draft)?
                .execute_update()?;
            assert_eq!(keys, [Value::Int(1)]);
            Ok(keys[0].as_i64().unwrap_or_default())
        })
        .unwrap();

    let item: EntityRef<Item> = db
        .query(|session| {
            session
                .create_query(&format!("{SELECT_ITEMS} WHERE id = :id"))?
                .set("id", id)?
                .single_result_as::<Item>()
        })
        .unwrap();
    assert_eq!(item.borrow().id, id);
    assert_eq!(item.borrow().name, "widget");
}

#[test]
fn result_cardinality_checks() {
    let fake = FakeDb::new();
    let db = fake.database();
    db.open(|session| {
        for name in ["a", "b"] {
            session
                .create_query("INSERT INTO items (name) VALUES (:name)")?
                .set("name", name)?
                .execute()?;
        }
        Ok(())
    })
    .unwrap();

    db.open(|session| {
        let all = session.create_query(SELECT_ITEMS)?;
        assert!(matches!(
            all.unique_result_as::<Item>(),
            Err(OrmError::TooManyRows { expected: 1, got: 2 })
        ));

        let none = session
            .create_query(&format!("{SELECT_ITEMS} WHERE id = :id"))?
            .set("id", 99i64)?;
        assert!(none.unique_result_as::<Item>()?.is_none());
        assert!(none.single_result_as::<Item>().unwrap_err().is_not_found());

        // A query can run more than once.
        assert_eq!(all.fetch_as::<Item>()?.len(), 2);
        assert_eq!(all.fetch_as::<Item>()?.len(), 2);
        Ok(())
    })
    .unwrap();
}

#[test]
fn empty_batch_runs_nothing() {
    let fake = FakeDb::new();
    let counts = fake
        .database()
        .query(|session| {
            let query = session.create_query("INSERT INTO items (name) VALUES (:name)")?;
            assert_eq!(query.batch_len(), 0);
            query.execute_batch()
        })
        .unwrap();
    assert!(counts.is_empty());
    assert!(fake.statements().is_empty());
}
