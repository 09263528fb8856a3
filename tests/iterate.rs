use datatable::TableError;
use datatable::construct::{Kind, Selector};
use datatable::iterate::{Glob, Specifier};
use datatable::table::Table;

fn setup() -> Table {
    let mut table = Table::new("t");
    for label in ["alpha", "beta", "gamma", "beta", "delta"] {
        table.create(Kind::Row, None, Some(label));
    }
    table.extend(Kind::Column, 2);
    table
}

fn indices(table: &Table, spec: &str) -> Vec<usize> {
    table
        .iterate(Kind::Row, spec)
        .expect("specifier resolves")
        .iter()
        .map(|e| table.index_of(*e).unwrap())
        .collect()
}

#[test]
fn indices_and_reserved_words() {
    let table = setup();
    assert_eq!(indices(&table, "0"), [0]);
    assert_eq!(indices(&table, "index:2"), [2]);
    assert_eq!(indices(&table, "end"), [4]);
    assert_eq!(indices(&table, "index:end"), [4]);
    assert_eq!(indices(&table, "all"), [0, 1, 2, 3, 4]);
    assert!(indices(&table, "none").is_empty());
    assert!(matches!(
        table.iterate(Kind::Row, "9"),
        Err(TableError::OutOfRange { index: 9, .. })
    ));
    assert!(matches!(
        table.iterate(Kind::Row, "-1"),
        Err(TableError::OutOfRange { index: -1, .. })
    ));
}

#[test]
fn labels_may_repeat() {
    let table = setup();
    assert_eq!(indices(&table, "beta"), [1, 3]);
    assert_eq!(indices(&table, "name:gamma"), [2]);
    assert!(matches!(
        table.iterate_one(Kind::Row, "beta"),
        Err(TableError::Ambiguous { count: 2, .. })
    ));
    assert!(matches!(
        table.iterate(Kind::Row, "name:omega"),
        Err(TableError::NotFound { .. })
    ));
    assert!(matches!(
        table.iterate(Kind::Row, "omega"),
        Err(TableError::NotFound { .. })
    ));
}

#[test]
fn label_patterns() {
    let table = setup();
    assert_eq!(indices(&table, "label:?e*"), [1, 3, 4]);
    assert_eq!(indices(&table, "label:*a"), [0, 1, 2, 3, 4]);
    // a pattern matching nothing is an empty selection, not an error
    assert!(indices(&table, "label:z*").is_empty());
}

#[test]
fn ranges() {
    let table = setup();
    assert_eq!(indices(&table, "range:1-3"), [1, 2, 3]);
    assert_eq!(indices(&table, "range:gamma-end"), [2, 3, 4]);
    assert!(table.iterate(Kind::Row, "range:3-1").is_err());
    assert!(table.iterate(Kind::Row, "range:1").is_err());
}

#[test]
fn label_wins_over_tag() {
    let mut table = setup();
    let alpha = table.row(0).unwrap();
    table.tag(alpha, "delta").unwrap();
    // "delta" is both a label (row 4) and a tag (row 0)
    assert_eq!(indices(&table, "delta"), [4]);
    assert_eq!(indices(&table, "tag:delta"), [0]);

    table.tag(alpha, "first").unwrap();
    assert_eq!(indices(&table, "first"), [0]);
}

#[test]
fn many_specifiers_are_merged() {
    let table = setup();
    let merged = table
        .iterate_many(Kind::Row, &["end", "beta", "1", "0"])
        .unwrap();
    let found: Vec<usize> = merged.iter().map(|e| table.index_of(*e).unwrap()).collect();
    assert_eq!(found, [0, 1, 3, 4]);
    assert_eq!(merged, table.iterate_many(Kind::Row, &["end", "beta", "1", "0"]).unwrap());
    assert!(table.iterate_many(Kind::Row, &["0", "bogus"]).is_err());
}

#[test]
fn selections_survive_deletes() {
    let mut table = setup();
    let betas = table.iterate(Kind::Row, "beta").unwrap();
    for row in &betas {
        assert!(table.delete(*row));
    }
    assert_eq!(table.num_rows(), 3);
    assert_eq!(indices(&table, "delta"), [2]);
}

#[test]
fn iterate_with_create() {
    let mut table = setup();
    let grown = table.iterate_with_create(Kind::Row, "7").unwrap();
    assert_eq!(table.num_rows(), 8);
    assert_eq!(table.index_of(grown.first().unwrap()), Some(7));

    let zeta = table.iterate_one_with_create(Kind::Row, "zeta").unwrap();
    assert_eq!(table.label(zeta), Some("zeta"));
    assert_eq!(table.index_of(zeta), Some(8));

    // existing entities are found, not created
    let again = table.iterate_one_with_create(Kind::Row, "name:zeta").unwrap();
    assert_eq!(again, zeta);
    assert_eq!(table.num_rows(), 9);

    assert!(matches!(
        table.iterate_with_create(Kind::Row, "tag:nope"),
        Err(TableError::UnknownTag { .. })
    ));
    assert!(table.iterate_with_create(Kind::Row, "-3").is_err());
    assert_eq!(table.num_rows(), 9);
}

#[test]
fn globs() {
    let glob = Glob::new("[a-c]x").unwrap();
    assert!(glob.matches("bx"));
    assert!(!glob.matches("dx"));
    assert!(!glob.matches("bxx"));

    let literal = Glob::new(r"a\*").unwrap();
    assert!(literal.matches("a*"));
    assert!(!literal.matches("ab"));

    assert!(Glob::new("a?c").unwrap().matches("abc"));
    assert!(Glob::new("[ab").is_err());
}

#[test]
fn specifier_forms() {
    assert_eq!(Specifier::parse(Kind::Row, "none").unwrap(), Specifier::None);
    // columns have no "none"
    assert_eq!(
        Specifier::parse(Kind::Column, "none").unwrap(),
        Specifier::Bare("none")
    );
    assert_eq!(
        Specifier::parse(Kind::Row, "range:2-end").unwrap(),
        Specifier::Range("2", "end")
    );
    assert_eq!(Specifier::parse(Kind::Row, "tag:x").unwrap(), Specifier::Tag("x"));
    assert!(Specifier::parse(Kind::Row, "index:x").is_err());
}

#[test]
fn selectors() {
    let mut table = setup();
    let gamma = table.row(2).unwrap();
    table.tag(gamma, "hot").unwrap();
    assert_eq!(table.selector(Kind::Row, "all").unwrap(), Selector::Any);
    assert_eq!(table.selector(Kind::Row, "gamma").unwrap(), Selector::Entity(gamma));
    assert_eq!(
        table.selector(Kind::Row, "hot").unwrap(),
        Selector::Tag("hot".to_string())
    );
    // a tag selector may name a tag nobody carries yet
    assert_eq!(
        table.selector(Kind::Row, "tag:later").unwrap(),
        Selector::Tag("later".to_string())
    );
    assert!(table.selector(Kind::Row, "beta").is_err());
    assert!(table.selector(Kind::Row, "range:0-1").is_err());
}
