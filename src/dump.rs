//! Flat text serialization of a table or part of it.
//!
//! Every line is a word list in the script list syntax:
//!
//! ```text
//! i <rows> <columns>
//! c <column> <label> <type> <tags>
//! r <row> <label> <tags>
//! d <row> <column> <value>
//! ```
//!
//! Row and column numbers are positions within the dump, not table indices,
//! so a dump of a subset restores into any table.

use tracing::debug;

use crate::construct::{ColumnType, EntityRef, Kind};
use crate::error::{Result, TableError};
use crate::script::{format_list, parse_list};
use crate::table::Table;
use crate::tags;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Write rows and columns back at their dumped positions instead of
    /// appending rows and matching columns by label.
    pub overwrite: bool,
    /// Ignore the tag lists in the dump.
    pub notags: bool,
}

#[derive(Default)]
struct Header {
    label: String,
    column_type: ColumnType,
    tags: Vec<String>,
}

struct Parsed {
    rows: Vec<Header>,
    columns: Vec<Header>,
    values: Vec<(usize, usize, String)>,
}

fn bad_line(line: usize, message: impl Into<String>) -> TableError {
    TableError::Parse {
        message: format!("bad dump line {line}: {}", message.into()),
        line: Some(line),
        col: None,
    }
}

fn position(word: &str, limit: usize, line: usize) -> Result<usize> {
    match word.parse::<usize>() {
        Ok(p) if p < limit => Ok(p),
        _ => Err(bad_line(line, format!("\"{word}\" is not a position below {limit}"))),
    }
}

fn parse_dump(text: &str) -> Result<Parsed> {
    let mut parsed: Option<Parsed> = None;
    for (number, raw) in text.lines().enumerate() {
        let line = number + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let words = parse_list(raw)?;
        if parsed.is_none() {
            match words.as_slice() {
                [tag, rows, columns] if tag == "i" => {
                    let rows = rows.parse::<usize>().map_err(|_| bad_line(line, "row count"))?;
                    let columns = columns
                        .parse::<usize>()
                        .map_err(|_| bad_line(line, "column count"))?;
                    parsed = Some(Parsed {
                        rows: (0..rows).map(|_| Header::default()).collect(),
                        columns: (0..columns).map(|_| Header::default()).collect(),
                        values: Vec::new(),
                    });
                    continue;
                }
                _ => return Err(bad_line(line, "dump must start with \"i <rows> <columns>\"")),
            }
        }
        let Some(header) = parsed.as_mut() else {
            continue;
        };
        match words.as_slice() {
            [tag, at, label, column_type, tag_list] if tag == "c" => {
                let at = position(at, header.columns.len(), line)?;
                header.columns[at] = Header {
                    label: label.clone(),
                    column_type: column_type.parse()?,
                    tags: parse_list(tag_list)?,
                };
            }
            [tag, at, label, tag_list] if tag == "r" => {
                let at = position(at, header.rows.len(), line)?;
                header.rows[at] = Header {
                    label: label.clone(),
                    column_type: ColumnType::default(),
                    tags: parse_list(tag_list)?,
                };
            }
            [tag, row, column, value] if tag == "d" => {
                let row = position(row, header.rows.len(), line)?;
                let column = position(column, header.columns.len(), line)?;
                header.values.push((row, column, value.clone()));
            }
            _ => return Err(bad_line(line, format!("unexpected \"{raw}\""))),
        }
    }
    parsed.ok_or_else(|| bad_line(1, "empty dump"))
}

impl Table {
    /// Serializes the given rows and columns (every one when `None`). Cells
    /// are read without firing traces.
    pub fn dump(&self, rows: Option<&[EntityRef]>, columns: Option<&[EntityRef]>) -> String {
        let rows = rows.map_or_else(|| self.entities(Kind::Row), <[EntityRef]>::to_vec);
        let columns = columns.map_or_else(|| self.entities(Kind::Column), <[EntityRef]>::to_vec);
        let mut out = Vec::with_capacity(rows.len() + columns.len() + 1);
        out.push(format_list([
            "i".to_string(),
            rows.len().to_string(),
            columns.len().to_string(),
        ]));
        for (at, column) in columns.iter().enumerate() {
            out.push(format_list([
                "c".to_string(),
                at.to_string(),
                self.label(*column).unwrap_or_default().to_string(),
                self.column_type(*column).to_string(),
                format_list(self.tags_of(*column)),
            ]));
        }
        for (at, row) in rows.iter().enumerate() {
            out.push(format_list([
                "r".to_string(),
                at.to_string(),
                self.label(*row).unwrap_or_default().to_string(),
                format_list(self.tags_of(*row)),
            ]));
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, column) in columns.iter().enumerate() {
                if let Some(value) = self.peek_value(*row, *column) {
                    out.push(format_list([
                        "d".to_string(),
                        r.to_string(),
                        c.to_string(),
                        value.to_string(),
                    ]));
                }
            }
        }
        let mut text = out.join("\n");
        text.push('\n');
        text
    }

    /// The first `count` entities of the axis. Create watches fired while
    /// growing may have deleted some.
    fn leading(&self, kind: Kind, count: usize) -> Result<Vec<EntityRef>> {
        self.entities(kind)
            .get(..count)
            .map(<[EntityRef]>::to_vec)
            .ok_or_else(|| {
                TableError::Argument(format!(
                    "restore needs {count} {kind}s but the table has {}",
                    self.len(kind)
                ))
            })
    }

    /// Replays a dump. The whole text is parsed before the table is touched.
    /// Returns the number of rows restored.
    pub fn restore(&mut self, text: &str, options: RestoreOptions) -> Result<usize> {
        let parsed = parse_dump(text)?;
        for header in parsed.rows.iter().chain(&parsed.columns) {
            for tag in &header.tags {
                if !tags::is_reserved(tag) {
                    tags::validate_tag_name(tag)?;
                }
            }
        }

        let (rows, columns) = if options.overwrite {
            self.check_extent(Kind::Row, parsed.rows.len())?;
            self.check_extent(Kind::Column, parsed.columns.len())?;
            if self.num_rows() < parsed.rows.len() {
                self.set_len(Kind::Row, parsed.rows.len());
            }
            if self.num_columns() < parsed.columns.len() {
                self.set_len(Kind::Column, parsed.columns.len());
            }
            let rows = self.leading(Kind::Row, parsed.rows.len())?;
            let columns = self.leading(Kind::Column, parsed.columns.len())?;
            for row in &rows {
                for column in &columns {
                    self.unset_value(*row, *column);
                }
            }
            for (entity, header) in rows.iter().zip(&parsed.rows) {
                if self.exists(*entity) {
                    self.relabel(*entity, Some(&header.label))?;
                }
            }
            for (entity, header) in columns.iter().zip(&parsed.columns) {
                if !self.exists(*entity) {
                    continue;
                }
                self.relabel(*entity, Some(&header.label))?;
                self.set_column_type(*entity, header.column_type)?;
            }
            (rows, columns)
        } else {
            self.check_extent(Kind::Row, self.num_rows().saturating_add(parsed.rows.len()))?;
            let mut columns = Vec::with_capacity(parsed.columns.len());
            for header in &parsed.columns {
                let existing = match header.label.as_str() {
                    "" => None,
                    label => self.find_label(Kind::Column, label).first().copied(),
                };
                let column = match existing {
                    Some(column) => column,
                    None => {
                        let column = self.create(Kind::Column, None, Some(&header.label));
                        self.set_column_type(column, header.column_type)?;
                        column
                    }
                };
                columns.push(column);
            }
            let rows: Vec<EntityRef> = parsed
                .rows
                .iter()
                .map(|header| self.create(Kind::Row, None, Some(&header.label)))
                .collect();
            (rows, columns)
        };

        if !options.notags {
            for (entity, header) in rows.iter().zip(&parsed.rows).chain(columns.iter().zip(&parsed.columns)) {
                for tag in header.tags.iter().filter(|t| !tags::is_reserved(t)) {
                    if self.exists(*entity) {
                        self.tag(*entity, tag)?;
                    }
                }
            }
        }
        for (r, c, value) in &parsed.values {
            let (row, column) = (rows[*r], columns[*c]);
            if self.exists(row) && self.exists(column) {
                self.set_value(row, column, value)?;
            }
        }
        debug!(table = %self.name(), rows = rows.len(), columns = columns.len(), overwrite = options.overwrite, "restored");
        Ok(rows.len())
    }
}
