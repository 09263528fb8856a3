use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use datatable::command::Session;
use datatable::construct::Kind;
use datatable::sort::{Compare, SortKey, SortMode, SortSpec};
use datatable::table::Table;

const ROWS: usize = 5000;

fn people() -> Table {
    let mut table = Table::new("people");
    let name = table.create(Kind::Column, None, Some("name"));
    let age = table.create(Kind::Column, None, Some("age"));
    for (i, row) in table.extend(Kind::Row, ROWS).into_iter().enumerate() {
        let _ = table.set_value(row, name, &format!("person{}", (i * 7919) % ROWS));
        let _ = table.set_value(row, age, &((i * 31) % 97).to_string());
        let _ = table.relabel(row, Some(&format!("p{i}")));
        if i % 10 == 0 {
            let _ = table.tag(row, "sampled");
        }
    }
    table
}

fn sort(c: &mut Criterion) {
    let mut table = people();
    let (name, age) = (
        table.column(0).expect("name column"),
        table.column(1).expect("age column"),
    );
    let by_age = SortSpec {
        keys: vec![SortKey::new(age), SortKey::new(name).compare(Compare::Dictionary)],
        ..SortSpec::default()
    };
    c.bench_function("sort rows by age then name", |b| {
        b.iter(|| black_box(table.sort(black_box(&by_age)).expect("sorted")))
    });
    let frequency = SortSpec {
        keys: vec![SortKey::new(age)],
        mode: SortMode::Frequency,
        ..SortSpec::default()
    };
    c.bench_function("age frequencies", |b| {
        b.iter(|| black_box(table.sort(black_box(&frequency)).expect("counted")))
    });
}

fn iterate(c: &mut Criterion) {
    let table = people();
    c.bench_function("resolve tag", |b| {
        b.iter(|| black_box(table.iterate(Kind::Row, black_box("tag:sampled")).expect("tagged")))
    });
    c.bench_function("resolve label pattern", |b| {
        b.iter(|| black_box(table.iterate(Kind::Row, black_box("label:p1*"))))
    });
}

fn script(c: &mut Criterion) {
    let mut session = Session::new();
    let _ = session.eval("datatable create bench");
    c.bench_function("eval set and get", |b| {
        b.iter(|| black_box(session.eval(black_box("bench set 5 x 42; bench get 5 x")).expect("evaluated")))
    });
}

criterion_group!(benches, sort, iterate, script);
criterion_main!(benches);
