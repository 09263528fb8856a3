use datatable::TableError;
use datatable::construct::{Kind, Selector};
use datatable::notify::NotifyFlags;
use datatable::registry::Registry;
use datatable::trace::TraceFlags;

fn setup() -> Registry {
    let mut registry = Registry::new();
    registry.create(Some("orders")).expect("created");
    registry
}

#[test]
fn names_are_unique() {
    let mut registry = setup();
    assert!(matches!(
        registry.create(Some("orders")),
        Err(TableError::TableExists(_))
    ));
    for bad in ["", "-x", "two words"] {
        assert!(
            matches!(registry.create(Some(bad)), Err(TableError::Argument(_))),
            "{bad:?} should be rejected"
        );
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn generated_names_skip_taken_ones() {
    let mut registry = Registry::new();
    registry.create(Some("datatable0")).unwrap();
    let handle = registry.create(None).unwrap();
    assert_eq!(registry.table(&handle).unwrap().name(), "datatable1");

    registry.set_prefix("t");
    let handle = registry.create(None).unwrap();
    assert_eq!(registry.table(&handle).unwrap().name(), "t2");
}

#[test]
fn new_tables_get_the_default_empty_value() {
    let mut registry = Registry::new();
    registry.set_default_empty_value("NA");
    let handle = registry.create(Some("x")).unwrap();
    assert_eq!(registry.table(&handle).unwrap().empty_value(), "NA");
}

#[test]
fn closing_releases_only_that_client() {
    let mut registry = setup();
    let first = registry.attach("orders").unwrap();
    let second = registry.attach("orders").unwrap();
    assert_eq!(registry.refcount("orders"), 3);
    assert_ne!(first.client(), second.client());

    {
        let table = registry.table_mut(&first).unwrap();
        table.extend(Kind::Row, 1);
        table
            .create_trace(Some(first.client()), Selector::Any, Selector::Any, TraceFlags::WRITE, |_, _| Ok(()))
            .unwrap();
        table
            .create_notifier(Some(first.client()), Kind::Row, Selector::Any, NotifyFlags::CREATE, |_, _| Ok(()))
            .unwrap();
    }
    {
        let table = registry.table_mut(&second).unwrap();
        table
            .create_trace(Some(second.client()), Selector::Any, Selector::Any, TraceFlags::READ, |_, _| Ok(()))
            .unwrap();
    }

    assert_eq!(registry.close(first), Ok(false));
    let table = registry.table(&second).unwrap();
    assert_eq!(table.traces().len(), 1);
    assert!(table.notifiers().is_empty());
    // the data stays with the table
    assert_eq!(table.num_rows(), 1);
    assert_eq!(registry.refcount("orders"), 2);
}

#[test]
fn last_close_finalizes() {
    let mut registry = Registry::new();
    let only = registry.create(Some("scratch")).unwrap();
    assert_eq!(registry.close(only), Ok(true));
    assert!(!registry.exists("scratch"));
    assert!(registry.is_empty());
    assert!(matches!(registry.attach("scratch"), Err(TableError::NoSuchTable(_))));

    // the old handle doesn't reach a table created in the same slot
    let fresh = registry.create(Some("scratch")).unwrap();
    assert_eq!(registry.table(&only).err(), Some(TableError::StaleHandle));
    assert_eq!(registry.close(only), Err(TableError::StaleHandle));
    assert!(registry.table(&fresh).is_ok());
}

#[test]
fn closed_handles_are_stale() {
    let mut registry = setup();
    let extra = registry.attach("orders").unwrap();
    registry.close(extra).unwrap();
    assert!(matches!(registry.table(&extra), Err(TableError::StaleHandle)));
    assert!(registry.exists("orders"));
}

#[test]
fn names_match_a_pattern() {
    let mut registry = setup();
    registry.create(Some("items")).unwrap();
    registry.create(Some("order_lines")).unwrap();
    assert_eq!(
        registry.names(None).unwrap(),
        ["items", "order_lines", "orders"]
    );
    assert_eq!(registry.names(Some("order*")).unwrap(), ["order_lines", "orders"]);
    assert!(registry.names(Some("[")).is_err());
}

#[test]
fn idle_work_runs_across_tables() {
    let mut registry = setup();
    let other = registry.create(Some("other")).unwrap();
    let table = registry.table_mut(&other).unwrap();
    table
        .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::CREATE | NotifyFlags::WHENIDLE, |_, _| {
            Err(TableError::Argument("boom".to_string()))
        })
        .unwrap();
    table.create(Kind::Row, None, None);
    assert_eq!(registry.run_idle(), 1);
    let errors = registry.take_background_errors();
    assert_eq!(errors.len(), 1);
    assert!(registry.take_background_errors().is_empty());
}
