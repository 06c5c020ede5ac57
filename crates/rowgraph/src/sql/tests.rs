use super::*;

fn parse(sql: &str) -> ParsedSql {
    ParsedSql::parse(sql).unwrap()
}

#[test]
fn renders_named_placeholders_in_order() {
    let p = parse("SELECT * FROM users WHERE a = :a AND b = :b");
    assert_eq!(
        p.render(PlaceholderStyle::Dollar),
        "SELECT * FROM users WHERE a = $1 AND b = $2"
    );
    assert_eq!(
        p.render(PlaceholderStyle::Question),
        "SELECT * FROM users WHERE a = ? AND b = ?"
    );
    assert_eq!(p.named().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(p.positional_count(), 0);
}

#[test]
fn mixes_named_and_positional() {
    let p = parse("UPDATE t SET x = ? WHERE id = :id AND y = ?");
    assert_eq!(
        p.placeholders(),
        &[
            Placeholder::Positional(1),
            Placeholder::Named("id".into()),
            Placeholder::Positional(2),
        ]
    );
    assert_eq!(p.slot_of_position(1), Some(0));
    assert_eq!(p.slot_of_name("id"), Some(1));
    assert_eq!(p.slot_of_position(2), Some(2));
    assert_eq!(p.slot_of_position(3), None);
    assert_eq!(
        p.render(PlaceholderStyle::Dollar),
        "UPDATE t SET x = $1 WHERE id = $2 AND y = $3"
    );
}

#[test]
fn ignores_literals_comments_and_casts() {
    let sql = "SELECT ':nope', \"we?ird\", x::text -- :also ?\n/* ? :c */ FROM t WHERE id = :id";
    let p = parse(sql);
    assert_eq!(p.placeholders(), &[Placeholder::Named("id".into())]);
    assert_eq!(
        p.render(PlaceholderStyle::Dollar),
        "SELECT ':nope', \"we?ird\", x::text -- :also ?\n/* ? :c */ FROM t WHERE id = $1"
    );
}

#[test]
fn doubled_quotes_stay_inside_literal() {
    let p = parse("SELECT 'it''s :x' WHERE a = :a");
    assert_eq!(p.named().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn skips_dollar_quoted_bodies() {
    let p = parse("SELECT $fn$ :x ? $fn$, $$ ? $$ WHERE a = :a");
    assert_eq!(p.placeholders(), &[Placeholder::Named("a".into())]);
}

#[test]
fn native_dollar_params_pass_through() {
    let p = parse("SELECT $1");
    assert!(p.placeholders().is_empty());
    assert_eq!(p.render(PlaceholderStyle::Dollar), "SELECT $1");
}

#[test]
fn rejects_duplicate_names() {
    let err = ParsedSql::parse("SELECT :a, :a").unwrap_err();
    assert!(matches!(err, OrmError::DuplicateParameter(ref n) if n == "a"));
}

#[test]
fn rejects_unterminated_text() {
    assert!(matches!(
        ParsedSql::parse("SELECT 'abc").unwrap_err(),
        OrmError::SqlParse(_)
    ));
    assert!(matches!(
        ParsedSql::parse("SELECT 1 /* open").unwrap_err(),
        OrmError::SqlParse(_)
    ));
    assert!(matches!(
        ParsedSql::parse("SELECT $q$ body").unwrap_err(),
        OrmError::SqlParse(_)
    ));
}

#[test]
fn lone_colon_is_not_a_placeholder() {
    let p = parse("SELECT ARRAY[1,2,3][1:2], :x");
    assert_eq!(p.named().collect::<Vec<_>>(), vec!["x"]);
    assert_eq!(p.source(), "SELECT ARRAY[1,2,3][1:2], :x");
}

#[test]
fn display_names_for_errors() {
    assert_eq!(Placeholder::Named("b".into()).display_name(), "b");
    assert_eq!(Placeholder::Positional(2).display_name(), "?2");
}
