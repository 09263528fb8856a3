use std::cell::RefCell;
use std::rc::Rc;

use datatable::TableError;
use datatable::construct::{Kind, Selector};
use datatable::notify::{NotifyEvent, NotifyFlags};
use datatable::table::Table;

type Log = Rc<RefCell<Vec<NotifyEvent>>>;

fn setup() -> Table {
    let mut table = Table::new("t");
    for label in ["a", "b", "c", "d"] {
        table.create(Kind::Row, None, Some(label));
    }
    table
}

fn recorder(log: &Log) -> impl Fn(&mut Table, &NotifyEvent) -> datatable::Result<()> + 'static {
    let log = Rc::clone(log);
    move |_, event| {
        log.borrow_mut().push(event.clone());
        Ok(())
    }
}

#[test]
fn create_reports_the_new_index() {
    let mut table = setup();
    let log = Log::default();
    table
        .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::CREATE, recorder(&log))
        .unwrap();
    let row = table.create(Kind::Row, Some(1), Some("new"));
    // columns are watched separately
    table.create(Kind::Column, None, None);

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entity, row);
    assert_eq!(log[0].index, 1);
    assert_eq!(log[0].flags, NotifyFlags::CREATE);
}

#[test]
fn delete_fires_while_the_row_still_exists() {
    let mut table = setup();
    let b = table.row(1).unwrap();
    table.tag(b, "doomed").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let inside = Rc::clone(&seen);
    table
        .create_notifier(
            None,
            Kind::Row,
            Selector::Tag("doomed".into()),
            NotifyFlags::DELETE,
            move |t, e| {
                inside
                    .borrow_mut()
                    .push((e.index, t.label(e.entity).map(str::to_string), t.num_rows()));
                Ok(())
            },
        )
        .unwrap();
    assert!(table.delete(b));
    assert_eq!(*seen.borrow(), [(1, Some("b".to_string()), 4)]);
    assert_eq!(table.num_rows(), 3);
}

#[test]
fn only_moved_rows_are_notified() {
    let mut table = setup();
    let log = Log::default();
    table
        .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::MOVE, recorder(&log))
        .unwrap();

    // renumbering after a delete is not a move
    let a = table.row(0).unwrap();
    table.delete(a);
    assert!(log.borrow().is_empty());

    // b c d -> c d b
    let b = table.row(0).unwrap();
    table.move_range(Kind::Row, 0, 2, 1).unwrap();
    assert_eq!(table.label(table.row(2).unwrap()), Some("b"));
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entity, b);
    assert_eq!(log[0].index, 2);
}

#[test]
fn bad_moves_are_rejected() {
    let mut table = setup();
    assert!(table.move_range(Kind::Row, 3, 0, 2).is_err());
    assert!(table.move_range(Kind::Row, 0, 3, 2).is_err());
    table.move_range(Kind::Row, 1, 1, 2).expect("moving in place is a no-op");
}

#[test]
fn huge_move_counts_are_rejected() {
    let mut table = setup();
    let before = table.entities(Kind::Row);
    assert!(matches!(
        table.move_range(Kind::Row, 1, 2, usize::MAX),
        Err(TableError::Argument(_))
    ));
    assert!(table.move_range(Kind::Row, usize::MAX, 0, 1).is_err());
    assert_eq!(table.entities(Kind::Row), before);
}

#[test]
fn relabel_notifies() {
    let mut table = setup();
    let c = table.row(2).unwrap();
    let log = Log::default();
    table
        .create_notifier(None, Kind::Row, Selector::Entity(c), NotifyFlags::RELABEL, recorder(&log))
        .unwrap();
    table.relabel(c, Some("charlie")).unwrap();
    table.relabel(table.row(0).unwrap(), Some("alpha")).unwrap();
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(table.label(c), Some("charlie"));
    table.relabel(c, None).unwrap();
    assert_eq!(table.label(c), None);
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn idle_notifiers_coalesce() {
    let mut table = setup();
    let log = Log::default();
    let mask = NotifyFlags::CREATE | NotifyFlags::RELABEL | NotifyFlags::WHENIDLE;
    table
        .create_notifier(None, Kind::Row, Selector::Any, mask, recorder(&log))
        .unwrap();

    let row = table.create(Kind::Row, None, None);
    table.relabel(row, Some("e")).unwrap();
    table.create(Kind::Row, None, None);
    assert!(log.borrow().is_empty());
    assert_eq!(table.notifiers().pending(), 1);

    assert_eq!(table.run_idle(), 1);
    {
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        // the first event is kept, with every flag seen since
        assert_eq!(log[0].entity, row);
        assert_eq!(log[0].flags, NotifyFlags::CREATE | NotifyFlags::RELABEL);
    }
    assert_eq!(table.run_idle(), 0);
}

#[test]
fn deleting_an_idle_notifier_drops_its_queue() {
    let mut table = setup();
    let log = Log::default();
    let id = table
        .create_notifier(
            None,
            Kind::Row,
            Selector::Any,
            NotifyFlags::CREATE | NotifyFlags::WHENIDLE,
            recorder(&log),
        )
        .unwrap();
    table.create(Kind::Row, None, None);
    assert_eq!(table.notifiers().pending(), 1);
    table.delete_notifier(id).unwrap();
    assert_eq!(table.notifiers().pending(), 0);
    assert_eq!(table.run_idle(), 0);
    assert!(table.delete_notifier(id).is_err());
}

#[test]
fn a_delete_notifier_may_delete_the_row_itself() {
    let mut table = setup();
    let count = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&count);
    table
        .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::DELETE, move |t, e| {
            *seen.borrow_mut() += 1;
            t.delete(e.entity);
            Ok(())
        })
        .unwrap();
    let b = table.row(1).unwrap();
    assert!(!table.delete(b));
    assert!(!table.exists(b));
    assert_eq!(*count.borrow(), 1);
    assert_eq!(table.num_rows(), 3);
}

#[test]
fn a_watch_needs_a_real_event() {
    let mut table = setup();
    assert!(
        table
            .create_notifier(None, Kind::Row, Selector::Any, NotifyFlags::WHENIDLE, |_, _| Ok(()))
            .is_err()
    );
    assert_eq!(
        (NotifyFlags::MOVE | NotifyFlags::WHENIDLE).event_names(),
        ["move", "whenidle"]
    );
}

#[test]
fn notifiers_on_a_deleted_row_go_with_it() {
    let mut table = setup();
    let d = table.row(3).unwrap();
    let id = table
        .create_notifier(Some(7), Kind::Row, Selector::Entity(d), NotifyFlags::ALL_EVENTS, |_, _| Ok(()))
        .unwrap();
    let kept = table
        .create_notifier(Some(7), Kind::Row, Selector::Any, NotifyFlags::CREATE, |_, _| Ok(()))
        .unwrap();
    table.delete(d);
    assert!(table.notifiers().get(id).is_none());
    assert_eq!(table.notifiers().get(kept).map(|n| n.kind()), Some(Kind::Row));
    assert_eq!(table.release_client(7), 1);
    assert!(table.notifiers().is_empty());
}
