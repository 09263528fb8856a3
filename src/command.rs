//! Script commands: parsing words into closed command families and running
//! them against tables, plus the [`Session`] that owns a registry and the
//! handles a script opened.
//!
//! A table command is `<table> <option> ?arg ...?`. Trace and watch scripts
//! run against the table that fired them with `%`-substitutions applied, and
//! may only use that table's own commands.

use std::collections::HashMap;

use tracing::trace;

use crate::config::Settings;
use crate::construct::{ClientId, ColumnType, EntityRef, Kind, NameHasher, Selector};
use crate::dump::RestoreOptions;
use crate::error::{Result, TableError};
use crate::iterate::Glob;
use crate::notify::NotifyFlags;
use crate::registry::{Registry, TableHandle};
use crate::script::{format_list, parse_list, parse_script, quote};
use crate::sort::{Compare, SortKey, SortMode, SortOutput, SortSpec};
use crate::table::Table;
use crate::tags;
use crate::trace::TraceFlags;

// ------------- Words -------------
struct Words<'a> {
    words: &'a [String],
    at: usize,
    usage: &'static str,
}

impl<'a> Words<'a> {
    fn new(words: &'a [String], usage: &'static str) -> Self {
        Self {
            words,
            at: 0,
            usage,
        }
    }
    fn wrong(&self) -> TableError {
        TableError::Argument(format!("wrong # args: should be \"{}\"", self.usage))
    }
    fn next(&mut self) -> Result<&'a str> {
        let word = self.words.get(self.at).ok_or_else(|| self.wrong())?;
        self.at += 1;
        Ok(word.as_str())
    }
    fn optional(&mut self) -> Option<&'a str> {
        let word = self.words.get(self.at)?;
        self.at += 1;
        Some(word.as_str())
    }
    fn peek(&self) -> Option<&'a str> {
        self.words.get(self.at).map(String::as_str)
    }
    fn remaining(&self) -> usize {
        self.words.len() - self.at
    }
    fn rest(&mut self) -> Vec<String> {
        let rest = self.words[self.at..].to_vec();
        self.at = self.words.len();
        rest
    }
    fn count(&mut self) -> Result<usize> {
        let word = self.next()?;
        word.parse::<usize>()
            .map_err(|_| TableError::Argument(format!("expected a count but got \"{word}\"")))
    }
    fn finish(&self) -> Result<()> {
        if self.at == self.words.len() {
            Ok(())
        } else {
            Err(self.wrong())
        }
    }
}

fn bad_option(option: &str, choices: &str) -> TableError {
    TableError::Argument(format!("bad option \"{option}\": must be {choices}"))
}

fn parse_id(word: &str, prefix: &str) -> Result<u64> {
    word.strip_prefix(prefix)
        .unwrap_or(word)
        .parse::<u64>()
        .map_err(|_| TableError::Argument(format!("bad {prefix} id \"{word}\"")))
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

// ------------- Command families -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagOp {
    /// Declares the tag, then adds it to the entities.
    Add { tag: String, specs: Vec<String> },
    Delete { tag: String, specs: Vec<String> },
    Forget(Vec<String>),
    Names(Option<String>),
    Indices(Vec<String>),
    Exists { tag: String, spec: Option<String> },
    Get(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityOp {
    Create {
        before: Option<String>,
        after: Option<String>,
        label: Option<String>,
        tags: Vec<String>,
    },
    Delete(Vec<String>),
    Extend(usize),
    Move { from: String, to: String, count: usize },
    Label { spec: String, label: Option<String> },
    Index(String),
    Indices(Vec<String>),
    Names(Option<String>),
    Exists(String),
    Values { spec: String, values: Option<Vec<String>> },
    Unset(Vec<String>),
    Type { spec: String, column_type: Option<ColumnType> },
    Tag(TagOp),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceOp {
    Create {
        row: String,
        column: String,
        flags: TraceFlags,
        script: String,
    },
    Delete(Vec<String>),
    Info(String),
    Names,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchOp {
    Create {
        kind: Kind,
        spec: String,
        flags: NotifyFlags,
        script: String,
    },
    Delete(Vec<String>),
    Info(String),
    Names,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKeyArg {
    pub column: String,
    pub compare: Option<Compare>,
    pub nocase: bool,
    pub decreasing: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortArgs {
    pub keys: Vec<SortKeyArg>,
    pub rows: Option<String>,
    pub compare: Compare,
    pub nocase: bool,
    pub decreasing: bool,
    pub unique: bool,
    pub nonempty: bool,
    pub mode: SortMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellValue {
    pub row: String,
    pub column: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableCommand {
    Entity(Kind, EntityOp),
    Set(Vec<CellValue>),
    Get {
        row: String,
        column: String,
        default: Option<String>,
    },
    Append {
        row: String,
        column: String,
        text: Vec<String>,
    },
    Unset { row: String, column: String },
    Exists { row: String, column: String },
    EmptyValue(Option<String>),
    Extent(Kind, Option<usize>),
    Sort(SortArgs),
    Trace(TraceOp),
    Watch(WatchOp),
    Dump {
        rows: Option<String>,
        columns: Option<String>,
    },
    Restore { options: RestoreOptions, text: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryCommand {
    Create(Option<String>),
    Attach(String),
    Close(Vec<String>),
    Names(Option<String>),
    Exists(String),
    Update,
}

// ------------- Parsing -------------
impl TagOp {
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "tag option ?arg ...?");
        let option = w.next()?;
        let op = match option {
            "add" => {
                w.usage = "tag add tag ?spec ...?";
                TagOp::Add {
                    tag: w.next()?.to_string(),
                    specs: w.rest(),
                }
            }
            "delete" => {
                w.usage = "tag delete tag ?spec ...?";
                TagOp::Delete {
                    tag: w.next()?.to_string(),
                    specs: w.rest(),
                }
            }
            "forget" => TagOp::Forget(w.rest()),
            "names" => TagOp::Names(w.optional().map(str::to_string)),
            "indices" => TagOp::Indices(w.rest()),
            "exists" => {
                w.usage = "tag exists tag ?spec?";
                TagOp::Exists {
                    tag: w.next()?.to_string(),
                    spec: w.optional().map(str::to_string),
                }
            }
            "get" => {
                w.usage = "tag get spec";
                TagOp::Get(w.next()?.to_string())
            }
            _ => {
                return Err(bad_option(
                    option,
                    "add, delete, exists, forget, get, indices or names",
                ));
            }
        };
        w.finish()?;
        Ok(op)
    }
}

impl EntityOp {
    pub fn parse(kind: Kind, words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "row|column option ?arg ...?");
        let option = w.next()?;
        let op = match option {
            "create" => {
                w.usage = "create ?-before spec? ?-after spec? ?-label label? ?-tags list?";
                let (mut before, mut after, mut label, mut tags) = (None, None, None, Vec::new());
                while let Some(switch) = w.optional() {
                    match switch {
                        "-before" => before = Some(w.next()?.to_string()),
                        "-after" => after = Some(w.next()?.to_string()),
                        "-label" => label = Some(w.next()?.to_string()),
                        "-tags" => tags = parse_list(w.next()?)?,
                        _ => return Err(bad_option(switch, "-after, -before, -label or -tags")),
                    }
                }
                if before.is_some() && after.is_some() {
                    return Err(TableError::Argument(
                        "can't use both -before and -after".to_string(),
                    ));
                }
                EntityOp::Create {
                    before,
                    after,
                    label,
                    tags,
                }
            }
            "delete" => EntityOp::Delete(w.rest()),
            "extend" => {
                w.usage = "extend count";
                EntityOp::Extend(w.count()?)
            }
            "move" => {
                w.usage = "move from to ?count?";
                let from = w.next()?.to_string();
                let to = w.next()?.to_string();
                let count = if w.peek().is_some() { w.count()? } else { 1 };
                EntityOp::Move { from, to, count }
            }
            "label" => {
                w.usage = "label spec ?label?";
                EntityOp::Label {
                    spec: w.next()?.to_string(),
                    label: w.optional().map(str::to_string),
                }
            }
            "index" => {
                w.usage = "index spec";
                EntityOp::Index(w.next()?.to_string())
            }
            "indices" => EntityOp::Indices(w.rest()),
            "names" => EntityOp::Names(w.optional().map(str::to_string)),
            "exists" => {
                w.usage = "exists spec";
                EntityOp::Exists(w.next()?.to_string())
            }
            "values" => {
                w.usage = "values spec ?list?";
                let spec = w.next()?.to_string();
                let values = w.optional().map(parse_list).transpose()?;
                EntityOp::Values { spec, values }
            }
            "unset" => EntityOp::Unset(w.rest()),
            "type" if kind == Kind::Column => {
                w.usage = "column type spec ?type?";
                EntityOp::Type {
                    spec: w.next()?.to_string(),
                    column_type: w.optional().map(str::parse::<ColumnType>).transpose()?,
                }
            }
            "tag" => EntityOp::Tag(TagOp::parse(&w.rest())?),
            _ => {
                let choices = match kind {
                    Kind::Row => {
                        "create, delete, exists, extend, index, indices, label, move, names, tag, unset or values"
                    }
                    Kind::Column => {
                        "create, delete, exists, extend, index, indices, label, move, names, tag, type, unset or values"
                    }
                };
                return Err(bad_option(option, choices));
            }
        };
        w.finish()?;
        Ok(op)
    }
}

impl TraceOp {
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "trace row|column|cell|delete|info|names ?arg ...?");
        let option = w.next()?;
        let op = match option {
            "row" | "column" | "cell" => {
                let (row, column) = match option {
                    "row" => {
                        w.usage = "trace row spec flags script";
                        (w.next()?.to_string(), tags::ALL.to_string())
                    }
                    "column" => {
                        w.usage = "trace column spec flags script";
                        (tags::ALL.to_string(), w.next()?.to_string())
                    }
                    _ => {
                        w.usage = "trace cell row column flags script";
                        (w.next()?.to_string(), w.next()?.to_string())
                    }
                };
                let flags = TraceFlags::parse(w.next()?)?;
                TraceOp::Create {
                    row,
                    column,
                    flags,
                    script: w.next()?.to_string(),
                }
            }
            "delete" => TraceOp::Delete(w.rest()),
            "info" => {
                w.usage = "trace info id";
                TraceOp::Info(w.next()?.to_string())
            }
            "names" => TraceOp::Names,
            _ => return Err(bad_option(option, "cell, column, delete, info, names or row")),
        };
        w.finish()?;
        Ok(op)
    }
}

impl WatchOp {
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "watch row|column|delete|info|names ?arg ...?");
        let option = w.next()?;
        let op = match option {
            "row" | "column" => {
                w.usage = "watch row|column spec ?-create? ?-delete? ?-move? ?-relabel? ?-allevents? ?-whenidle? script";
                let kind = if option == "row" { Kind::Row } else { Kind::Column };
                let spec = w.next()?.to_string();
                let mut flags = NotifyFlags::empty();
                while w.remaining() > 1 {
                    let switch = w.next()?;
                    flags |= match switch {
                        "-create" => NotifyFlags::CREATE,
                        "-delete" => NotifyFlags::DELETE,
                        "-move" => NotifyFlags::MOVE,
                        "-relabel" => NotifyFlags::RELABEL,
                        "-allevents" => NotifyFlags::ALL_EVENTS,
                        "-whenidle" => NotifyFlags::WHENIDLE,
                        _ => {
                            return Err(bad_option(
                                switch,
                                "-allevents, -create, -delete, -move, -relabel or -whenidle",
                            ));
                        }
                    };
                }
                WatchOp::Create {
                    kind,
                    spec,
                    flags,
                    script: w.next()?.to_string(),
                }
            }
            "delete" => WatchOp::Delete(w.rest()),
            "info" => {
                w.usage = "watch info id";
                WatchOp::Info(w.next()?.to_string())
            }
            "names" => WatchOp::Names,
            _ => return Err(bad_option(option, "column, delete, info, names or row")),
        };
        w.finish()?;
        Ok(op)
    }
}

impl SortArgs {
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "sort ?switches? ?column ...?");
        let mut args = SortArgs::default();
        while let Some(switch) = w.peek().filter(|s| s.starts_with('-')) {
            w.next()?;
            match switch {
                "--" => break,
                "-increasing" => args.decreasing = false,
                "-decreasing" => args.decreasing = true,
                "-unique" => args.unique = true,
                "-nonempty" => args.nonempty = true,
                "-values" => args.mode = SortMode::Values,
                "-frequency" => args.mode = SortMode::Frequency,
                "-permanent" => args.mode = SortMode::Permanent,
                "-ascii" => args.compare = Compare::Ascii,
                "-dictionary" => args.compare = Compare::Dictionary,
                "-nocase" => args.nocase = true,
                "-rows" => args.rows = Some(w.next()?.to_string()),
                _ => {
                    return Err(bad_option(
                        switch,
                        "-ascii, -decreasing, -dictionary, -frequency, -increasing, -nocase, -nonempty, -permanent, -rows, -unique or -values",
                    ));
                }
            }
        }
        for key in w.rest() {
            let mut parts = parse_list(&key)?.into_iter();
            let column = parts
                .next()
                .ok_or_else(|| TableError::Argument("empty sort key".to_string()))?;
            let mut arg = SortKeyArg {
                column,
                compare: None,
                nocase: false,
                decreasing: false,
            };
            for switch in parts {
                match switch.as_str() {
                    "-ascii" => arg.compare = Some(Compare::Ascii),
                    "-dictionary" => arg.compare = Some(Compare::Dictionary),
                    "-nocase" => arg.nocase = true,
                    "-decreasing" => arg.decreasing = true,
                    "-increasing" => arg.decreasing = false,
                    _ => {
                        return Err(bad_option(
                            &switch,
                            "-ascii, -decreasing, -dictionary, -increasing or -nocase",
                        ));
                    }
                }
            }
            args.keys.push(arg);
        }
        Ok(args)
    }
}

impl TableCommand {
    /// Parses the words following the table name.
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "table option ?arg ...?");
        let option = w.next()?;
        let command = match option {
            "row" => TableCommand::Entity(Kind::Row, EntityOp::parse(Kind::Row, &words[1..])?),
            "column" => {
                TableCommand::Entity(Kind::Column, EntityOp::parse(Kind::Column, &words[1..])?)
            }
            "set" => {
                let rest = &words[1..];
                if rest.is_empty() || rest.len() % 3 != 0 {
                    w.usage = "set row column value ?row column value ...?";
                    return Err(w.wrong());
                }
                TableCommand::Set(
                    rest.chunks_exact(3)
                        .map(|c| CellValue {
                            row: c[0].clone(),
                            column: c[1].clone(),
                            value: c[2].clone(),
                        })
                        .collect(),
                )
            }
            "get" => {
                w.usage = "get row column ?default?";
                TableCommand::Get {
                    row: w.next()?.to_string(),
                    column: w.next()?.to_string(),
                    default: w.optional().map(str::to_string),
                }
            }
            "append" => {
                w.usage = "append row column ?text ...?";
                TableCommand::Append {
                    row: w.next()?.to_string(),
                    column: w.next()?.to_string(),
                    text: w.rest(),
                }
            }
            "unset" | "exists" => {
                w.usage = "unset|exists row column";
                let row = w.next()?.to_string();
                let column = w.next()?.to_string();
                if option == "unset" {
                    TableCommand::Unset { row, column }
                } else {
                    TableCommand::Exists { row, column }
                }
            }
            "emptyvalue" => TableCommand::EmptyValue(w.optional().map(str::to_string)),
            "numrows" | "numcolumns" => {
                w.usage = "numrows|numcolumns ?count?";
                let kind = if option == "numrows" { Kind::Row } else { Kind::Column };
                let count = if w.peek().is_some() { Some(w.count()?) } else { None };
                TableCommand::Extent(kind, count)
            }
            "sort" => TableCommand::Sort(SortArgs::parse(&words[1..])?),
            "trace" => TableCommand::Trace(TraceOp::parse(&words[1..])?),
            "watch" => TableCommand::Watch(WatchOp::parse(&words[1..])?),
            "dump" => {
                w.usage = "dump ?-rows specs? ?-columns specs?";
                let (mut rows, mut columns) = (None, None);
                while let Some(switch) = w.optional() {
                    match switch {
                        "-rows" => rows = Some(w.next()?.to_string()),
                        "-columns" => columns = Some(w.next()?.to_string()),
                        _ => return Err(bad_option(switch, "-columns or -rows")),
                    }
                }
                TableCommand::Dump { rows, columns }
            }
            "restore" => {
                w.usage = "restore ?-overwrite? ?-notags? text";
                let mut options = RestoreOptions::default();
                while w.remaining() > 1 {
                    match w.next()? {
                        "-overwrite" => options.overwrite = true,
                        "-notags" => options.notags = true,
                        switch => return Err(bad_option(switch, "-notags or -overwrite")),
                    }
                }
                TableCommand::Restore {
                    options,
                    text: w.next()?.to_string(),
                }
            }
            _ => {
                return Err(bad_option(
                    option,
                    "append, column, dump, emptyvalue, exists, get, numcolumns, numrows, restore, row, set, sort, trace, unset or watch",
                ));
            }
        };
        match command {
            TableCommand::Entity(..)
            | TableCommand::Set(_)
            | TableCommand::Append { .. }
            | TableCommand::Sort(_)
            | TableCommand::Trace(_)
            | TableCommand::Watch(_) => (),
            _ => w.finish()?,
        }
        Ok(command)
    }
}

impl RegistryCommand {
    pub fn parse(words: &[String]) -> Result<Self> {
        let mut w = Words::new(words, "datatable option ?arg ...?");
        let option = w.next()?;
        let command = match option {
            "create" => RegistryCommand::Create(w.optional().map(str::to_string)),
            "attach" => {
                w.usage = "datatable attach name";
                RegistryCommand::Attach(w.next()?.to_string())
            }
            "close" => RegistryCommand::Close(w.rest()),
            "names" => RegistryCommand::Names(w.optional().map(str::to_string)),
            "exists" => {
                w.usage = "datatable exists name";
                RegistryCommand::Exists(w.next()?.to_string())
            }
            "update" => RegistryCommand::Update,
            _ => {
                return Err(bad_option(
                    option,
                    "attach, close, create, exists, names or update",
                ));
            }
        };
        w.finish()?;
        Ok(command)
    }
}

// ------------- Execution -------------
fn cell(entity: EntityRef, other: EntityRef) -> (EntityRef, EntityRef) {
    match entity.kind() {
        Kind::Row => (entity, other),
        Kind::Column => (other, entity),
    }
}

fn indices(table: &Table, entities: &[EntityRef]) -> String {
    format_list(
        entities
            .iter()
            .filter_map(|e| table.index_of(*e))
            .map(|i| i.to_string()),
    )
}

fn many(table: &Table, kind: Kind, specs: &str) -> Result<Vec<EntityRef>> {
    Ok(table.iterate_many(kind, &parse_list(specs)?)?.into_vec())
}

fn describe(table: &Table, selector: &Selector) -> String {
    match selector {
        Selector::Any => tags::ALL.to_string(),
        Selector::Entity(e) => table
            .index_of(*e)
            .map_or_else(String::new, |i| i.to_string()),
        Selector::Tag(tag) => format!("tag:{tag}"),
    }
}

/// Replaces `%x` sequences from `values`; `%%` is a literal percent sign.
fn substitute(template: &str, values: &[(char, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(key) => match values.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => out.push_str(&quote(value)),
                None => {
                    out.push('%');
                    out.push(key);
                }
            },
            None => out.push('%'),
        }
    }
    out
}

fn not_found_as_false(result: Result<EntityRef>) -> Result<Option<EntityRef>> {
    match result {
        Ok(entity) => Ok(Some(entity)),
        Err(
            TableError::NotFound { .. }
            | TableError::OutOfRange { .. }
            | TableError::UnknownTag { .. },
        ) => Ok(None),
        Err(e) => Err(e),
    }
}

impl TagOp {
    fn execute(self, table: &mut Table, kind: Kind) -> Result<String> {
        match self {
            TagOp::Add { tag, specs } => {
                let tagged = table.iterate_many(kind, &specs)?;
                table.add_tag(kind, &tag)?;
                for entity in tagged {
                    table.tag(entity, &tag)?;
                }
                Ok(String::new())
            }
            TagOp::Delete { tag, specs } => {
                for entity in table.iterate_many(kind, &specs)? {
                    table.untag(entity, &tag);
                }
                Ok(String::new())
            }
            TagOp::Forget(names) => {
                for name in names {
                    table.forget_tag(kind, &name);
                }
                Ok(String::new())
            }
            TagOp::Names(None) => Ok(format_list(table.tags(kind).names())),
            TagOp::Names(Some(spec)) => {
                let mut names: Vec<String> = table
                    .iterate(kind, &spec)?
                    .iter()
                    .flat_map(|e| table.tags_of(*e))
                    .collect();
                names.sort();
                names.dedup();
                Ok(format_list(names))
            }
            TagOp::Indices(names) => {
                let mut found: Vec<usize> = Vec::new();
                for name in &names {
                    found.extend(
                        table
                            .tagged(kind, name)?
                            .into_iter()
                            .filter_map(|e| table.index_of(e)),
                    );
                }
                found.sort_unstable();
                found.dedup();
                Ok(format_list(found.into_iter().map(|i| i.to_string())))
            }
            TagOp::Exists { tag, spec: None } => {
                Ok(flag(tags::is_reserved(&tag) || table.tags(kind).contains(&tag)))
            }
            TagOp::Exists { tag, spec: Some(spec) } => {
                let entity = table.iterate_one(kind, &spec)?;
                Ok(flag(table.has_tag(entity, &tag)))
            }
            TagOp::Get(spec) => {
                let entity = table.iterate_one(kind, &spec)?;
                Ok(format_list(table.tags_of(entity)))
            }
        }
    }
}

impl EntityOp {
    pub fn execute(self, table: &mut Table, kind: Kind) -> Result<String> {
        match self {
            EntityOp::Create {
                before,
                after,
                label,
                tags,
            } => {
                for tag in &tags {
                    tags::validate_tag_name(tag)?;
                }
                let position = match (before, after) {
                    (Some(spec), _) => table.index_of(table.iterate_one(kind, &spec)?),
                    (None, Some(spec)) => table
                        .index_of(table.iterate_one(kind, &spec)?)
                        .map(|i| i + 1),
                    (None, None) => None,
                };
                table.check_extent(kind, table.len(kind) + 1)?;
                let entity = table.create(kind, position, label.as_deref());
                for tag in &tags {
                    if table.exists(entity) {
                        table.tag(entity, tag)?;
                    }
                }
                Ok(table
                    .index_of(entity)
                    .map_or_else(String::new, |i| i.to_string()))
            }
            EntityOp::Delete(specs) => {
                let doomed = table.iterate_many(kind, &specs)?;
                table.delete_many(doomed.as_slice());
                Ok(String::new())
            }
            EntityOp::Extend(count) => {
                table.check_extent(kind, table.len(kind).saturating_add(count))?;
                let created = table.extend(kind, count);
                Ok(indices(table, &created))
            }
            EntityOp::Move { from, to, count } => {
                let from = table.iterate_one(kind, &from)?;
                let to = table.iterate_one(kind, &to)?;
                let (Some(from), Some(to)) = (table.index_of(from), table.index_of(to)) else {
                    return Ok(String::new());
                };
                table.move_range(kind, from, to, count)?;
                Ok(String::new())
            }
            EntityOp::Label { spec, label: None } => {
                let entity = table.iterate_one(kind, &spec)?;
                Ok(table.label(entity).unwrap_or_default().to_string())
            }
            EntityOp::Label {
                spec,
                label: Some(label),
            } => {
                let entity = table.iterate_one(kind, &spec)?;
                table.relabel(entity, Some(&label))?;
                Ok(label)
            }
            EntityOp::Index(spec) => Ok(not_found_as_false(table.iterate_one(kind, &spec))?
                .and_then(|e| table.index_of(e))
                .map_or_else(|| "-1".to_string(), |i| i.to_string())),
            EntityOp::Indices(specs) => {
                let selection = table.iterate_many(kind, &specs)?;
                Ok(indices(table, selection.as_slice()))
            }
            EntityOp::Names(pattern) => {
                let glob = pattern.as_deref().map(Glob::new).transpose()?;
                Ok(format_list(
                    table
                        .entities(kind)
                        .into_iter()
                        .filter_map(|e| table.label(e))
                        .filter(|l| glob.as_ref().is_none_or(|g| g.matches(l))),
                ))
            }
            EntityOp::Exists(spec) => Ok(flag(
                table.iterate(kind, &spec).is_ok_and(|s| !s.is_empty()),
            )),
            EntityOp::Values { spec, values: None } => {
                let entity = table.iterate_one(kind, &spec)?;
                let mut values = Vec::new();
                for other in table.entities(kind.other()) {
                    let (row, column) = cell(entity, other);
                    let value = table.get_value(row, column);
                    values.push(value.unwrap_or_else(|| table.empty_value().to_string()));
                }
                Ok(format_list(values))
            }
            EntityOp::Values {
                spec,
                values: Some(values),
            } => {
                table.check_extent(kind.other(), values.len())?;
                let entity = table.iterate_one_with_create(kind, &spec)?;
                if table.len(kind.other()) < values.len() {
                    table.set_len(kind.other(), values.len());
                }
                for (other, value) in table.entities(kind.other()).into_iter().zip(&values) {
                    if !table.exists(entity) {
                        break;
                    }
                    if table.exists(other) {
                        let (row, column) = cell(entity, other);
                        table.set_value(row, column, value)?;
                    }
                }
                Ok(String::new())
            }
            EntityOp::Unset(specs) => {
                for entity in table.iterate_many(kind, &specs)? {
                    for other in table.entities(kind.other()) {
                        let (row, column) = cell(entity, other);
                        table.unset_value(row, column);
                    }
                }
                Ok(String::new())
            }
            EntityOp::Type {
                spec,
                column_type: None,
            } => {
                let column = table.iterate_one(Kind::Column, &spec)?;
                Ok(table.column_type(column).to_string())
            }
            EntityOp::Type {
                spec,
                column_type: Some(column_type),
            } => {
                for column in table.iterate(Kind::Column, &spec)? {
                    table.set_column_type(column, column_type)?;
                }
                Ok(column_type.to_string())
            }
            EntityOp::Tag(op) => op.execute(table, kind),
        }
    }
}

impl TraceOp {
    fn execute(self, table: &mut Table, client: ClientId) -> Result<String> {
        match self {
            TraceOp::Create {
                row,
                column,
                flags,
                script,
            } => {
                let row = table.selector(Kind::Row, &row)?;
                let column = table.selector(Kind::Column, &column)?;
                let id = table.create_trace(Some(client), row, column, flags, move |table, event| {
                    let script = substitute(
                        &script,
                        &[
                            ('t', table.name().to_string()),
                            ('r', event.row_index.to_string()),
                            ('c', event.column_index.to_string()),
                            ('e', event.flags.letters()),
                        ],
                    );
                    eval_in_table(table, client, &script).map(|_| ())
                })?;
                Ok(format!("trace{id}"))
            }
            TraceOp::Delete(ids) => {
                for id in ids {
                    table.delete_trace(parse_id(&id, "trace")?)?;
                }
                Ok(String::new())
            }
            TraceOp::Info(id) => {
                let id = parse_id(&id, "trace")?;
                let info = table.traces().get(id).ok_or(TableError::NoSuchTrace(id))?;
                Ok(format_list([
                    describe(table, info.row()),
                    describe(table, info.column()),
                    info.mask().letters(),
                ]))
            }
            TraceOp::Names => Ok(format_list(
                table.traces().ids().into_iter().map(|id| format!("trace{id}")),
            )),
        }
    }
}

impl WatchOp {
    fn execute(self, table: &mut Table, client: ClientId) -> Result<String> {
        match self {
            WatchOp::Create {
                kind,
                spec,
                flags,
                script,
            } => {
                let selector = table.selector(kind, &spec)?;
                let id = table.create_notifier(Some(client), kind, selector, flags, move |table, event| {
                    let script = substitute(
                        &script,
                        &[
                            ('t', table.name().to_string()),
                            ('i', event.index.to_string()),
                            ('k', event.entity.kind().to_string()),
                            ('e', format_list(event.flags.event_names())),
                        ],
                    );
                    eval_in_table(table, client, &script).map(|_| ())
                })?;
                Ok(format!("watch{id}"))
            }
            WatchOp::Delete(ids) => {
                for id in ids {
                    table.delete_notifier(parse_id(&id, "watch")?)?;
                }
                Ok(String::new())
            }
            WatchOp::Info(id) => {
                let id = parse_id(&id, "watch")?;
                let info = table.notifiers().get(id).ok_or(TableError::NoSuchNotifier(id))?;
                Ok(format_list([
                    info.kind().to_string(),
                    describe(table, info.selector()),
                    format_list(info.mask().event_names()),
                ]))
            }
            WatchOp::Names => Ok(format_list(
                table.notifiers().ids().into_iter().map(|id| format!("watch{id}")),
            )),
        }
    }
}

impl SortArgs {
    fn execute(self, table: &mut Table) -> Result<String> {
        let mut spec = SortSpec {
            decreasing: self.decreasing,
            unique: self.unique,
            nonempty: self.nonempty,
            mode: self.mode,
            ..SortSpec::default()
        };
        if let Some(rows) = &self.rows {
            spec.rows = Some(many(table, Kind::Row, rows)?);
        }
        for key in &self.keys {
            let column = table.iterate_one(Kind::Column, &key.column)?;
            let mut sort_key = SortKey::new(column).compare(key.compare.unwrap_or(self.compare));
            if key.nocase || self.nocase {
                sort_key = sort_key.nocase();
            }
            if key.decreasing {
                sort_key = sort_key.decreasing();
            }
            spec.keys.push(sort_key);
        }
        Ok(match table.sort(&spec)? {
            SortOutput::Rows(rows) => indices(table, &rows),
            SortOutput::Values(values) => format_list(values),
            SortOutput::Frequency(counts) => format_list(
                counts
                    .into_iter()
                    .flat_map(|(value, count)| [value, count.to_string()]),
            ),
            SortOutput::Applied => String::new(),
        })
    }
}

/// Resolves every cell of a `set` and checks each value against its column
/// type, so a bad triple fails before anything is created or written.
fn check_cells(table: &Table, cells: &[CellValue]) -> Result<()> {
    for CellValue { row, column, value } in cells {
        table.check_with_create(Kind::Row, row)?;
        if let Some(columns) = table.check_with_create(Kind::Column, column)? {
            for column in &columns {
                table.column_type(*column).check(value)?;
            }
        }
    }
    Ok(())
}

impl TableCommand {
    /// Runs the command on behalf of `client`, which owns any trace or
    /// watch it creates.
    pub fn execute(self, table: &mut Table, client: ClientId) -> Result<String> {
        match self {
            TableCommand::Entity(kind, op) => op.execute(table, kind),
            TableCommand::Set(cells) => {
                check_cells(table, &cells)?;
                for CellValue { row, column, value } in cells {
                    let rows = table.iterate_with_create(Kind::Row, &row)?;
                    let columns = table.iterate_with_create(Kind::Column, &column)?;
                    for row in &rows {
                        for column in &columns {
                            if table.exists(*row) && table.exists(*column) {
                                table.set_value(*row, *column, &value)?;
                            }
                        }
                    }
                }
                Ok(String::new())
            }
            TableCommand::Get {
                row,
                column,
                default,
            } => {
                let found = table
                    .iterate_one(Kind::Row, &row)
                    .and_then(|r| Ok((r, table.iterate_one(Kind::Column, &column)?)));
                match (found, default) {
                    (Ok((row, column)), default) => Ok(table
                        .get_value(row, column)
                        .or(default)
                        .unwrap_or_else(|| table.empty_value().to_string())),
                    (Err(_), Some(default)) => Ok(default),
                    (Err(e), None) => Err(e),
                }
            }
            TableCommand::Append { row, column, text } => {
                let row = table.iterate_one_with_create(Kind::Row, &row)?;
                let column = table.iterate_one_with_create(Kind::Column, &column)?;
                table.append_value(row, column, &text.concat())?;
                Ok(table.peek_value(row, column).unwrap_or_default().to_string())
            }
            TableCommand::Unset { row, column } => {
                let rows = table.iterate(Kind::Row, &row)?;
                let columns = table.iterate(Kind::Column, &column)?;
                for row in &rows {
                    for column in &columns {
                        table.unset_value(*row, *column);
                    }
                }
                Ok(String::new())
            }
            TableCommand::Exists { row, column } => {
                let row = not_found_as_false(table.iterate_one(Kind::Row, &row))?;
                let column = not_found_as_false(table.iterate_one(Kind::Column, &column))?;
                Ok(flag(match (row, column) {
                    (Some(row), Some(column)) => table.has_value(row, column),
                    _ => false,
                }))
            }
            TableCommand::EmptyValue(None) => Ok(table.empty_value().to_string()),
            TableCommand::EmptyValue(Some(value)) => {
                table.set_empty_value(value.clone());
                Ok(value)
            }
            TableCommand::Extent(kind, None) => Ok(table.len(kind).to_string()),
            TableCommand::Extent(kind, Some(len)) => {
                table.check_extent(kind, len)?;
                table.set_len(kind, len);
                Ok(table.len(kind).to_string())
            }
            TableCommand::Sort(args) => args.execute(table),
            TableCommand::Trace(op) => op.execute(table, client),
            TableCommand::Watch(op) => op.execute(table, client),
            TableCommand::Dump { rows, columns } => {
                let rows = rows.map(|specs| many(table, Kind::Row, &specs)).transpose()?;
                let columns = columns
                    .map(|specs| many(table, Kind::Column, &specs))
                    .transpose()?;
                Ok(table.dump(rows.as_deref(), columns.as_deref()))
            }
            TableCommand::Restore { options, text } => {
                table.restore(&text, options).map(|n| n.to_string())
            }
        }
    }
}

/// Runs a script whose commands all address `table` itself. This is how
/// trace and watch scripts run.
pub fn eval_in_table(table: &mut Table, client: ClientId, script: &str) -> Result<String> {
    let mut result = String::new();
    for command in parse_script(script)? {
        let Some((first, rest)) = command.words.split_first() else {
            continue;
        };
        if first != table.name() {
            return Err(TableError::Argument(format!(
                "callbacks of \"{}\" can't run \"{first}\"",
                table.name()
            )));
        }
        result = TableCommand::parse(rest)?.execute(table, client)?;
    }
    Ok(result)
}

// ------------- Session -------------
/// A registry plus the handles opened through it by scripts. Commands
/// addressing a table use the most recently opened handle for that name.
pub struct Session {
    registry: Registry,
    handles: HashMap<String, Vec<TableHandle>, NameHasher>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }
    pub fn with_settings(settings: &Settings) -> Self {
        let mut registry = Registry::new();
        registry.set_prefix(settings.table_prefix.clone());
        registry.set_default_empty_value(settings.empty_value.clone());
        registry.set_default_max_extent(settings.max_extent);
        Self {
            registry,
            handles: HashMap::default(),
        }
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
    fn handle(&self, name: &str) -> Result<TableHandle> {
        self.handles
            .get(name)
            .and_then(|h| h.last().copied())
            .ok_or_else(|| TableError::NoSuchTable(name.to_string()))
    }
    pub fn table(&self, name: &str) -> Result<&Table> {
        let handle = self.handle(name)?;
        self.registry.table(&handle)
    }
    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        let handle = self.handle(name)?;
        self.registry.table_mut(&handle)
    }

    /// Evaluates a script and returns the result of its last command. The
    /// first failing command stops the script.
    pub fn eval(&mut self, script: &str) -> Result<String> {
        let mut result = String::new();
        for command in parse_script(script)? {
            result = self.eval_command(&command.words)?;
        }
        Ok(result)
    }

    fn eval_command(&mut self, words: &[String]) -> Result<String> {
        let Some((first, rest)) = words.split_first() else {
            return Ok(String::new());
        };
        trace!(command = %first, args = rest.len(), "eval");
        if first == "datatable" {
            return RegistryCommand::parse(rest)?.execute(self);
        }
        let handle = self
            .handles
            .get(first.as_str())
            .and_then(|h| h.last().copied())
            .ok_or_else(|| TableError::Argument(format!("invalid command name \"{first}\"")))?;
        let command = TableCommand::parse(rest)?;
        let table = self.registry.table_mut(&handle)?;
        command.execute(table, handle.client())
    }

    /// Runs queued idle notifiers across every table.
    pub fn update(&mut self) -> usize {
        self.registry.run_idle()
    }
    pub fn take_background_errors(&mut self) -> Vec<TableError> {
        self.registry.take_background_errors()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryCommand {
    pub fn execute(self, session: &mut Session) -> Result<String> {
        match self {
            RegistryCommand::Create(name) => {
                if name.as_deref() == Some("datatable") {
                    return Err(TableError::Argument(
                        "\"datatable\" can't be used as a table name".to_string(),
                    ));
                }
                let handle = session.registry.create(name.as_deref())?;
                let name = session.registry.table(&handle)?.name().to_string();
                session.handles.entry(name.clone()).or_default().push(handle);
                Ok(name)
            }
            RegistryCommand::Attach(name) => {
                let handle = session.registry.attach(&name)?;
                session.handles.entry(name.clone()).or_default().push(handle);
                Ok(name)
            }
            RegistryCommand::Close(names) => {
                for name in names {
                    let handle = session
                        .handles
                        .get_mut(&name)
                        .and_then(Vec::pop)
                        .ok_or_else(|| TableError::NoSuchTable(name.clone()))?;
                    if session.handles.get(&name).is_some_and(Vec::is_empty) {
                        session.handles.remove(&name);
                    }
                    session.registry.close(handle)?;
                }
                Ok(String::new())
            }
            RegistryCommand::Names(pattern) => {
                Ok(format_list(session.registry.names(pattern.as_deref())?))
            }
            RegistryCommand::Exists(name) => Ok(flag(session.registry.exists(&name))),
            RegistryCommand::Update => Ok(session.update().to_string()),
        }
    }
}
