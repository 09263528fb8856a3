//! Multi-key row sorting.
//!
//! The candidate rows are copied into a working array and sorted with a
//! stable comparator: first key, then the next key on ties, then original
//! order. The result is handed back as rows, primary-key values or value
//! frequencies, or written back to the table as its new row order.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use tracing::debug;

use crate::construct::{ColumnType, EntityRef, Kind};
use crate::error::{Result, TableError};
use crate::table::Table;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Compare {
    /// Numeric when both values parse as numbers, byte order otherwise.
    #[default]
    Auto,
    Ascii,
    /// Case-insensitive, with embedded digit runs compared as numbers.
    Dictionary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: EntityRef,
    pub compare: Compare,
    pub nocase: bool,
    pub decreasing: bool,
}

impl SortKey {
    pub fn new(column: EntityRef) -> Self {
        Self {
            column,
            compare: Compare::Auto,
            nocase: false,
            decreasing: false,
        }
    }
    pub fn compare(mut self, compare: Compare) -> Self {
        self.compare = compare;
        self
    }
    pub fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }
    pub fn decreasing(mut self) -> Self {
        self.decreasing = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Rows,
    Values,
    Frequency,
    Permanent,
}

#[derive(Clone, Debug, Default)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
    /// Candidate rows; every row when `None`.
    pub rows: Option<Vec<EntityRef>>,
    pub decreasing: bool,
    pub unique: bool,
    pub nonempty: bool,
    pub mode: SortMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortOutput {
    Rows(Vec<EntityRef>),
    Values(Vec<String>),
    Frequency(Vec<(String, usize)>),
    Applied,
}

impl SortOutput {
    fn empty(mode: SortMode) -> Self {
        match mode {
            SortMode::Rows => SortOutput::Rows(Vec::new()),
            SortMode::Values => SortOutput::Values(Vec::new()),
            SortMode::Frequency => SortOutput::Frequency(Vec::new()),
            SortMode::Permanent => SortOutput::Applied,
        }
    }
}

// ------------- Comparison -------------
fn ascii(a: &str, b: &str, nocase: bool) -> Ordering {
    if nocase {
        a.bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
    } else {
        a.cmp(b)
    }
}

fn take_digits(chars: &mut Peekable<Chars>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
}

pub fn dictionary(a: &str, b: &str, nocase: bool) -> Ordering {
    let (mut left, mut right) = (a.chars().peekable(), b.chars().peekable());
    let mut tiebreak = Ordering::Equal;
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return if nocase { Ordering::Equal } else { tiebreak },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (l, r) = (take_digits(&mut left), take_digits(&mut right));
                let (tl, tr) = (l.trim_start_matches('0'), r.trim_start_matches('0'));
                let ord = tl.len().cmp(&tr.len()).then_with(|| tl.cmp(tr));
                if ord != Ordering::Equal {
                    return ord;
                }
                if tiebreak == Ordering::Equal {
                    tiebreak = r.len().cmp(&l.len());
                }
            }
            (Some(x), Some(y)) => {
                let (lx, ly) = (x.to_lowercase().next(), y.to_lowercase().next());
                if lx != ly {
                    return lx.cmp(&ly);
                }
                if tiebreak == Ordering::Equal && x != y {
                    tiebreak = if x.is_uppercase() {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                }
                left.next();
                right.next();
            }
        }
    }
}

pub fn compare_values(a: &str, b: &str, compare: Compare, nocase: bool, column_type: ColumnType) -> Ordering {
    match compare {
        Compare::Ascii => ascii(a, b, nocase),
        Compare::Dictionary => dictionary(a, b, nocase),
        Compare::Auto => {
            let (ta, tb) = (a.trim(), b.trim());
            if column_type == ColumnType::Integer {
                if let (Ok(x), Ok(y)) = (ta.parse::<i64>(), tb.parse::<i64>()) {
                    return x.cmp(&y);
                }
            }
            match (ta.parse::<f64>(), tb.parse::<f64>()) {
                (Ok(x), Ok(y)) if !x.is_nan() && !y.is_nan() => x.total_cmp(&y),
                _ => ascii(a, b, nocase),
            }
        }
    }
}

/// Absent cells sort before present ones.
fn compare_cells(a: Option<&str>, b: Option<&str>, key: &SortKey, column_type: ColumnType, reverse: bool) -> Ordering {
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b, key.compare, key.nocase, column_type),
    };
    if key.decreasing != reverse {
        ord.reverse()
    } else {
        ord
    }
}

// ------------- Sorting -------------
impl Table {
    pub fn sort(&mut self, spec: &SortSpec) -> Result<SortOutput> {
        for key in &spec.keys {
            if key.column.kind() != Kind::Column || !self.exists(key.column) {
                return Err(self.not_found(key.column));
            }
        }
        if spec.keys.is_empty() {
            return Ok(SortOutput::empty(spec.mode));
        }
        if spec.mode == SortMode::Permanent && spec.unique {
            return Err(TableError::Argument(
                "a permanent sort can't drop duplicate rows".to_string(),
            ));
        }
        let candidates: Vec<EntityRef> = match &spec.rows {
            Some(rows) => rows.iter().copied().filter(|r| self.exists(*r)).collect(),
            None => self.entities(Kind::Row),
        };
        let types: Vec<ColumnType> = spec.keys.iter().map(|k| self.column_type(k.column)).collect();
        let primary = &spec.keys[0];

        // owned copy of the primary key values, so the borrow of the table ends here
        let (ordered, primary_values): (Vec<EntityRef>, Vec<Option<String>>) = {
            let mut keyed: Vec<(EntityRef, Vec<Option<&str>>)> = candidates
                .iter()
                .map(|row| {
                    let values = spec.keys.iter().map(|k| self.peek_value(*row, k.column)).collect();
                    (*row, values)
                })
                .collect();
            keyed.sort_by(|(_, a), (_, b)| {
                spec.keys
                    .iter()
                    .enumerate()
                    .map(|(i, key)| compare_cells(a[i], b[i], key, types[i], spec.decreasing))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            if spec.unique {
                keyed.dedup_by(|(_, later), (_, earlier)| {
                    compare_cells(later[0], earlier[0], primary, types[0], spec.decreasing) == Ordering::Equal
                });
            }
            keyed
                .into_iter()
                .map(|(row, values)| (row, values[0].map(str::to_string)))
                .unzip()
        };
        debug!(table = %self.name(), rows = ordered.len(), keys = spec.keys.len(), mode = ?spec.mode, "sorted");

        match spec.mode {
            SortMode::Rows => Ok(SortOutput::Rows(ordered)),
            SortMode::Values => Ok(SortOutput::Values(
                primary_values
                    .into_iter()
                    .filter(|v| !spec.nonempty || v.is_some())
                    .map(|v| v.unwrap_or_else(|| self.empty_value().to_string()))
                    .collect(),
            )),
            SortMode::Frequency => {
                let mut counts: Vec<(Option<String>, usize)> = Vec::new();
                for value in primary_values {
                    if spec.nonempty && value.is_none() {
                        continue;
                    }
                    let repeated = counts.last().is_some_and(|(last, _)| {
                        compare_cells(last.as_deref(), value.as_deref(), primary, types[0], false)
                            == Ordering::Equal
                    });
                    match counts.last_mut() {
                        Some((_, count)) if repeated => *count += 1,
                        _ => counts.push((value, 1)),
                    }
                }
                Ok(SortOutput::Frequency(
                    counts
                        .into_iter()
                        .map(|(v, n)| (v.unwrap_or_else(|| self.empty_value().to_string()), n))
                        .collect(),
                ))
            }
            SortMode::Permanent => {
                let mut positions: Vec<usize> = candidates.iter().filter_map(|r| self.index_of(*r)).collect();
                positions.sort_unstable();
                let mut order = self.entities(Kind::Row);
                for (position, row) in positions.into_iter().zip(ordered) {
                    order[position] = row;
                }
                self.reorder(Kind::Row, &order)?;
                Ok(SortOutput::Applied)
            }
        }
    }
}
