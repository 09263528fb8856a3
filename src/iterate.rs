//! Resolution of row/column specifiers into ordered entity selections.
//!
//! A single specifier is tried in this order:
//! 1. an integer index,
//! 2. the reserved words `all`, `end` and (rows only) `none`,
//! 3. the prefixed forms `name:<label>`, `index:<n>`, `tag:<name>`,
//!    `label:<glob>` and `range:<from>-<to>`,
//! 4. an existing label,
//! 5. an existing tag.
//!
//! Anything else is a "can't find" error. Selections are snapshots in
//! ascending index order, so callers may delete or move entities while
//! walking them.

use lazy_static::lazy_static;
use regex::Regex;

use crate::construct::{EntityRef, Kind, Selector};
use crate::error::{Result, TableError};
use crate::table::Table;
use crate::tags;

lazy_static! {
    static ref PREFIXED: Regex = Regex::new(r"(?s)^(name|index|tag|label|range):(.*)$").unwrap();
}

// ------------- Glob -------------
/// A glob pattern (`*`, `?`, `[a-z]`, `\x`) matched against whole strings.
#[derive(Debug, Clone)]
pub struct Glob(Regex);

impl Glob {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut re = String::from("(?s)^");
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                '[' => {
                    let mut class = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == ']' {
                            closed = true;
                            break;
                        }
                        class.push(n);
                    }
                    if !closed || class.is_empty() {
                        return Err(TableError::Argument(format!(
                            "unterminated character class in pattern \"{pattern}\""
                        )));
                    }
                    re.push('[');
                    for n in class.chars() {
                        if n == '-' {
                            re.push('-');
                        } else {
                            re.push_str(&regex::escape(n.encode_utf8(&mut [0; 4])));
                        }
                    }
                    re.push(']');
                }
                '\\' => {
                    if let Some(n) = chars.next() {
                        re.push_str(&regex::escape(n.encode_utf8(&mut [0; 4])));
                    }
                }
                _ => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');
        Regex::new(&re)
            .map(Glob)
            .map_err(|e| TableError::Argument(format!("bad pattern \"{pattern}\": {e}")))
    }
    pub fn matches(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

// ------------- Specifier -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Specifier<'a> {
    Index(i64),
    All,
    End,
    None,
    Label(&'a str),
    Tag(&'a str),
    Pattern(&'a str),
    Range(&'a str, &'a str),
    /// A plain word: a label if one matches, otherwise a tag.
    Bare(&'a str),
}

impl<'a> Specifier<'a> {
    pub fn parse(kind: Kind, spec: &'a str) -> Result<Self> {
        if let Ok(index) = spec.parse::<i64>() {
            return Ok(Specifier::Index(index));
        }
        match spec {
            tags::ALL => return Ok(Specifier::All),
            tags::END => return Ok(Specifier::End),
            "none" if kind == Kind::Row => return Ok(Specifier::None),
            _ => (),
        }
        let Some(captures) = PREFIXED.captures(spec) else {
            return Ok(Specifier::Bare(spec));
        };
        let body = captures.get(2).map_or("", |m| m.as_str());
        match captures.get(1).map_or("", |m| m.as_str()) {
            "name" => Ok(Specifier::Label(body)),
            "index" => match body {
                tags::END => Ok(Specifier::End),
                _ => body.parse::<i64>().map(Specifier::Index).map_err(|_| {
                    TableError::Argument(format!("bad index \"{body}\" in \"{spec}\""))
                }),
            },
            "tag" => Ok(Specifier::Tag(body)),
            "label" => Ok(Specifier::Pattern(body)),
            _ => match body.split_once('-') {
                Some((from, to)) if !from.is_empty() && !to.is_empty() => {
                    Ok(Specifier::Range(from, to))
                }
                _ => Err(TableError::Argument(format!(
                    "bad range \"{spec}\": should be range:<first>-<last>"
                ))),
            },
        }
    }
}

// ------------- Selection -------------
/// An ordered, duplicate-free snapshot of entities of one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    kind: Kind,
    entities: Vec<EntityRef>,
}

impl Selection {
    pub fn new(kind: Kind, entities: Vec<EntityRef>) -> Self {
        Self { kind, entities }
    }
    pub fn kind(&self) -> Kind {
        self.kind
    }
    pub fn len(&self) -> usize {
        self.entities.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
    pub fn first(&self) -> Option<EntityRef> {
        self.entities.first().copied()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, EntityRef> {
        self.entities.iter()
    }
    pub fn as_slice(&self) -> &[EntityRef] {
        &self.entities
    }
    pub fn into_vec(self) -> Vec<EntityRef> {
        self.entities
    }
}

impl IntoIterator for Selection {
    type Item = EntityRef;
    type IntoIter = std::vec::IntoIter<EntityRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'s> IntoIterator for &'s Selection {
    type Item = &'s EntityRef;
    type IntoIter = std::slice::Iter<'s, EntityRef>;
    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

// ------------- Resolution -------------
impl Table {
    fn cant_find(&self, kind: Kind, spec: &str) -> TableError {
        TableError::NotFound {
            kind,
            spec: spec.to_string(),
            table: self.name().to_string(),
        }
    }

    fn resolve(&self, kind: Kind, spec: &str) -> Result<Vec<EntityRef>> {
        match Specifier::parse(kind, spec)? {
            Specifier::Index(index) => usize::try_from(index)
                .ok()
                .and_then(|i| self.entity(kind, i))
                .map(|e| vec![e])
                .ok_or_else(|| TableError::OutOfRange {
                    kind,
                    index,
                    table: self.name().to_string(),
                }),
            Specifier::All => Ok(self.entities(kind)),
            Specifier::End => self.tagged(kind, tags::END),
            Specifier::None => Ok(Vec::new()),
            Specifier::Label(label) => {
                let found = self.find_label(kind, label);
                if found.is_empty() {
                    Err(self.cant_find(kind, spec))
                } else {
                    Ok(found)
                }
            }
            Specifier::Tag(tag) => self.tagged(kind, tag),
            Specifier::Pattern(pattern) => {
                let glob = Glob::new(pattern)?;
                Ok(self
                    .entities(kind)
                    .into_iter()
                    .filter(|e| self.label(*e).is_some_and(|l| glob.matches(l)))
                    .collect())
            }
            Specifier::Range(from, to) => {
                let first = self.resolve_index(kind, from)?;
                let last = self.resolve_index(kind, to)?;
                if first > last {
                    return Err(TableError::Argument(format!(
                        "bad range \"{spec}\": {from} comes after {to}"
                    )));
                }
                Ok((first..=last).filter_map(|i| self.entity(kind, i)).collect())
            }
            Specifier::Bare(word) => {
                let found = self.find_label(kind, word);
                if !found.is_empty() {
                    Ok(found)
                } else if self.tags(kind).contains(word) {
                    self.tagged(kind, word)
                } else {
                    Err(self.cant_find(kind, spec))
                }
            }
        }
    }

    fn resolve_index(&self, kind: Kind, spec: &str) -> Result<usize> {
        let entity = self.iterate_one(kind, spec)?;
        self.index_of(entity).ok_or_else(|| self.cant_find(kind, spec))
    }

    /// Every entity the specifier names, in index order.
    pub fn iterate(&self, kind: Kind, spec: &str) -> Result<Selection> {
        self.resolve(kind, spec).map(|v| Selection::new(kind, v))
    }

    /// The union of several specifiers, deduplicated, in index order.
    pub fn iterate_many<S: AsRef<str>>(&self, kind: Kind, specs: &[S]) -> Result<Selection> {
        let mut indexed: Vec<(usize, EntityRef)> = Vec::new();
        for spec in specs {
            for entity in self.resolve(kind, spec.as_ref())? {
                if let Some(index) = self.index_of(entity) {
                    indexed.push((index, entity));
                }
            }
        }
        indexed.sort_unstable_by_key(|(i, _)| *i);
        indexed.dedup_by_key(|(i, _)| *i);
        Ok(Selection::new(
            kind,
            indexed.into_iter().map(|(_, e)| e).collect(),
        ))
    }

    /// Exactly one entity; an expansion to zero or several is an error.
    pub fn iterate_one(&self, kind: Kind, spec: &str) -> Result<EntityRef> {
        let found = self.resolve(kind, spec)?;
        match found.as_slice() {
            [entity] => Ok(*entity),
            [] => Err(self.cant_find(kind, spec)),
            _ => Err(TableError::Ambiguous {
                kind,
                spec: spec.to_string(),
                count: found.len(),
            }),
        }
    }

    /// Resolves like [`Table::iterate_with_create`] without touching the
    /// table. `None` means the specifier would create entities.
    pub fn check_with_create(&self, kind: Kind, spec: &str) -> Result<Option<Selection>> {
        let error = match self.iterate(kind, spec) {
            Ok(selection) => return Ok(Some(selection)),
            Err(error) => error,
        };
        match Specifier::parse(kind, spec)? {
            Specifier::Index(index) if index >= 0 => {
                let needed = usize::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_add(1))
                    .unwrap_or(usize::MAX);
                self.check_extent(kind, needed)?;
                Ok(None)
            }
            Specifier::Label(label) | Specifier::Bare(label)
                if !label.is_empty() && !label.starts_with('-') && !self.tags(kind).contains(label) =>
            {
                self.check_extent(kind, self.len(kind) + 1)?;
                Ok(None)
            }
            _ => Err(error),
        }
    }

    /// Like [`Table::iterate`], but an index past the end grows the table and
    /// an unknown label creates a new entity carrying it.
    pub fn iterate_with_create(&mut self, kind: Kind, spec: &str) -> Result<Selection> {
        if let Some(selection) = self.check_with_create(kind, spec)? {
            return Ok(selection);
        }
        match Specifier::parse(kind, spec)? {
            Specifier::Index(index) => {
                let needed = index as usize + 1;
                if needed > self.len(kind) {
                    self.set_len(kind, needed);
                }
                self.iterate(kind, spec)
            }
            Specifier::Label(label) | Specifier::Bare(label) => {
                let entity = self.create(kind, None, Some(label));
                Ok(Selection::new(kind, vec![entity]))
            }
            _ => self.iterate(kind, spec),
        }
    }

    pub fn iterate_one_with_create(&mut self, kind: Kind, spec: &str) -> Result<EntityRef> {
        let selection = self.iterate_with_create(kind, spec)?;
        match selection.as_slice() {
            [entity] => Ok(*entity),
            [] => Err(self.cant_find(kind, spec)),
            _ => Err(TableError::Ambiguous {
                kind,
                spec: spec.to_string(),
                count: selection.len(),
            }),
        }
    }

    /// Turns a specifier into what a trace or notifier is registered against:
    /// a single entity, a tag, or every entity.
    pub fn selector(&self, kind: Kind, spec: &str) -> Result<Selector> {
        match Specifier::parse(kind, spec)? {
            Specifier::All => Ok(Selector::Any),
            Specifier::End => Ok(Selector::Tag(tags::END.to_string())),
            Specifier::Tag(tag) => {
                tags::validate_tag_name(tag)?;
                Ok(Selector::Tag(tag.to_string()))
            }
            Specifier::Bare(word)
                if self.find_label(kind, word).is_empty() && self.tags(kind).contains(word) =>
            {
                Ok(Selector::Tag(word.to_string()))
            }
            Specifier::Index(_) | Specifier::Label(_) | Specifier::Bare(_) => {
                self.iterate_one(kind, spec).map(Selector::Entity)
            }
            Specifier::None | Specifier::Pattern(_) | Specifier::Range(..) => {
                Err(TableError::Argument(format!(
                    "\"{spec}\" must name a single {kind} or a tag"
                )))
            }
        }
    }
}
