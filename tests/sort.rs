use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use datatable::construct::{ColumnType, EntityRef, Kind, Selector};
use datatable::notify::NotifyFlags;
use datatable::sort::{Compare, SortKey, SortMode, SortOutput, SortSpec, compare_values, dictionary};
use datatable::table::Table;

fn setup() -> (Table, EntityRef, EntityRef) {
    let mut table = Table::new("people");
    let name = table.create(Kind::Column, None, Some("name"));
    let age = table.create(Kind::Column, None, Some("age"));
    for (n, a) in [("Ada", "40"), ("Brian", "30"), ("Cleo", "25"), ("Dan", "30"), ("Eve", "50")] {
        let row = table.create(Kind::Row, None, None);
        table.set_value(row, name, n).unwrap();
        table.set_value(row, age, a).unwrap();
    }
    (table, name, age)
}

fn spec(keys: Vec<SortKey>, mode: SortMode) -> SortSpec {
    SortSpec {
        keys,
        mode,
        ..SortSpec::default()
    }
}

fn row_indices(table: &Table, output: SortOutput) -> Vec<usize> {
    match output {
        SortOutput::Rows(rows) => rows.iter().map(|r| table.index_of(*r).unwrap()).collect(),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn unique_ages() {
    let (mut table, _, age) = setup();
    let mut by_age = spec(vec![SortKey::new(age)], SortMode::Rows);
    by_age.unique = true;
    let sorted = table.sort(&by_age).expect("sorted");
    assert_eq!(row_indices(&table, sorted), [2, 1, 0, 4]);
}

#[test]
fn decreasing_reverses_distinct_keys() {
    let (mut table, name, _) = setup();
    let up = table.sort(&spec(vec![SortKey::new(name)], SortMode::Rows)).unwrap();
    let down = table
        .sort(&spec(vec![SortKey::new(name).decreasing()], SortMode::Rows))
        .unwrap();
    let mut up = row_indices(&table, up);
    up.reverse();
    assert_eq!(up, row_indices(&table, down));
}

#[test]
fn ties_keep_table_order() {
    let (mut table, _, age) = setup();
    let sorted = table.sort(&spec(vec![SortKey::new(age)], SortMode::Rows)).unwrap();
    // rows 1 and 3 are both 30
    assert_eq!(row_indices(&table, sorted), [2, 1, 3, 0, 4]);
    let mut down = spec(vec![SortKey::new(age)], SortMode::Rows);
    down.decreasing = true;
    let sorted = table.sort(&down).unwrap();
    assert_eq!(row_indices(&table, sorted), [4, 0, 1, 3, 2]);
}

#[test]
fn numbers_compare_as_numbers() {
    assert_eq!(compare_values("9", "10", Compare::Auto, false, ColumnType::String), Ordering::Less);
    assert_eq!(compare_values("9", "10", Compare::Ascii, false, ColumnType::String), Ordering::Greater);
    assert_eq!(compare_values("2.5", "10", Compare::Auto, false, ColumnType::Double), Ordering::Less);
    // mixed values fall back to text
    assert_eq!(compare_values("10", "abc", Compare::Auto, false, ColumnType::String), Ordering::Less);
    assert_eq!(compare_values("B", "a", Compare::Ascii, false, ColumnType::String), Ordering::Less);
    assert_eq!(compare_values("B", "a", Compare::Ascii, true, ColumnType::String), Ordering::Greater);
}

#[test]
fn dictionary_order() {
    assert_eq!(dictionary("a9", "a10", false), Ordering::Less);
    assert_eq!(dictionary("Apple", "banana", false), Ordering::Less);
    assert_eq!(dictionary("x", "X", false), Ordering::Greater);
    assert_eq!(dictionary("x", "X", true), Ordering::Equal);
    assert_eq!(dictionary("file", "file2", false), Ordering::Less);
}

#[test]
fn absent_cells_sort_first() {
    let (mut table, name, age) = setup();
    let extra = table.create(Kind::Row, None, None);
    table.set_value(extra, name, "Finn").unwrap();
    let sorted = table.sort(&spec(vec![SortKey::new(age)], SortMode::Rows)).unwrap();
    assert_eq!(row_indices(&table, sorted)[0], 5);

    table.set_empty_value("n/a");
    let values = table.sort(&spec(vec![SortKey::new(age)], SortMode::Values)).unwrap();
    assert_eq!(
        values,
        SortOutput::Values(["n/a", "25", "30", "30", "40", "50"].map(String::from).to_vec())
    );
    let mut nonempty = spec(vec![SortKey::new(age)], SortMode::Values);
    nonempty.nonempty = true;
    let SortOutput::Values(values) = table.sort(&nonempty).unwrap() else {
        panic!("expected values");
    };
    assert_eq!(values.len(), 5);
}

#[test]
fn frequencies() {
    let (mut table, _, age) = setup();
    let counted = table
        .sort(&spec(vec![SortKey::new(age)], SortMode::Frequency))
        .unwrap();
    let expected: Vec<(String, usize)> = [("25", 1), ("30", 2), ("40", 1), ("50", 1)]
        .into_iter()
        .map(|(v, n)| (v.to_string(), n))
        .collect();
    assert_eq!(counted, SortOutput::Frequency(expected));
}

#[test]
fn no_keys_no_rows() {
    let (mut table, _, _) = setup();
    assert_eq!(
        table.sort(&spec(Vec::new(), SortMode::Rows)).unwrap(),
        SortOutput::Rows(Vec::new())
    );
    assert_eq!(
        table.sort(&spec(Vec::new(), SortMode::Permanent)).unwrap(),
        SortOutput::Applied
    );
}

#[test]
fn candidate_rows_restrict_the_sort() {
    let (mut table, _, age) = setup();
    let mut some = spec(vec![SortKey::new(age)], SortMode::Rows);
    some.rows = Some(vec![table.row(0).unwrap(), table.row(4).unwrap(), table.row(2).unwrap()]);
    let sorted = table.sort(&some).unwrap();
    assert_eq!(row_indices(&table, sorted), [2, 0, 4]);
}

#[test]
fn permanent_sort_moves_rows() {
    let (mut table, name, age) = setup();
    let moved = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&moved);
    table
        .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::MOVE, move |t, e| {
            log.borrow_mut().push(t.peek_value(e.entity, name).unwrap_or_default().to_string());
            Ok(())
        })
        .unwrap();
    let applied = table
        .sort(&spec(vec![SortKey::new(age)], SortMode::Permanent))
        .unwrap();
    assert_eq!(applied, SortOutput::Applied);

    let names: Vec<&str> = table
        .entities(Kind::Row)
        .into_iter()
        .map(|r| table.peek_value(r, name).unwrap())
        .collect();
    assert_eq!(names, ["Cleo", "Brian", "Dan", "Ada", "Eve"]);
    // Brian and Eve kept their places
    assert_eq!(*moved.borrow(), ["Cleo", "Dan", "Ada"]);

    // sorting a sorted table changes nothing
    table
        .sort(&spec(vec![SortKey::new(age)], SortMode::Permanent))
        .unwrap();
    assert_eq!(moved.borrow().len(), 3);
}

#[test]
fn permanent_sort_refuses_unique() {
    let (mut table, _, age) = setup();
    let mut both = spec(vec![SortKey::new(age)], SortMode::Permanent);
    both.unique = true;
    assert!(table.sort(&both).is_err());
}

#[test]
fn later_keys_break_ties() {
    let (mut table, name, age) = setup();
    let r3 = table.row(3).unwrap();
    table.set_value(r3, name, "Abe").unwrap();
    let sorted = table
        .sort(&spec(
            vec![SortKey::new(age), SortKey::new(name).compare(Compare::Dictionary)],
            SortMode::Rows,
        ))
        .unwrap();
    assert_eq!(row_indices(&table, sorted), [2, 3, 1, 0, 4]);
}

#[test]
fn keys_must_be_live_columns() {
    let (mut table, _, age) = setup();
    table.delete(age);
    assert!(table.sort(&spec(vec![SortKey::new(age)], SortMode::Rows)).is_err());
}
