// the fundamental constructs every other module talks about
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TableError};

pub type IdHasher = BuildHasherDefault<SeaHasher>;
pub type NameHasher = BuildHasherDefault<SeaHasher>;

// ------------- Kind -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Row,
    Column,
}
impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Row => "row",
            Kind::Column => "column",
        }
    }
    /// The crossing axis.
    pub fn other(&self) -> Kind {
        match self {
            Kind::Row => Kind::Column,
            Kind::Column => Kind::Row,
        }
    }
}
impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------- Entity -------------
pub type EntityId = u64;

pub const GENESIS: EntityId = 0;

/// Opaque handle to a row or a column. The id is never reused, so a handle to
/// a deleted entity can never start pointing at a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    kind: Kind,
    id: EntityId,
}
impl EntityRef {
    pub fn new(kind: Kind, id: EntityId) -> Self {
        Self { kind, id }
    }
    pub fn kind(&self) -> Kind {
        self.kind
    }
    pub fn id(&self) -> EntityId {
        self.id
    }
}
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[derive(Debug)]
pub struct EntityGenerator {
    lower_bound: EntityId,
}
impl EntityGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
        }
    }
    pub fn generate(&mut self) -> EntityId {
        self.lower_bound += 1;
        self.lower_bound
    }
}
impl Default for EntityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Client -------------
/// Identifies the table handle that registered a trace or notifier.
pub type ClientId = u64;

// ------------- ColumnType -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Double,
    Boolean,
}
impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "int",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Double)
    }
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            ColumnType::String => true,
            ColumnType::Integer => value.trim().parse::<i64>().is_ok(),
            ColumnType::Double => value.trim().parse::<f64>().is_ok(),
            ColumnType::Boolean => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "1" | "true" | "false" | "yes" | "no" | "on" | "off"
            ),
        }
    }
    pub fn check(&self, value: &str) -> Result<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(TableError::Argument(format!(
                "expected {} value but got \"{}\"",
                self.name(),
                value
            )))
        }
    }
}
impl FromStr for ColumnType {
    type Err = TableError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(ColumnType::String),
            "int" | "integer" | "long" => Ok(ColumnType::Integer),
            "double" | "real" => Ok(ColumnType::Double),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            _ => Err(TableError::Argument(format!(
                "unknown column type \"{s}\": should be string, int, double or boolean"
            ))),
        }
    }
}
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------- Selector -------------
/// What a trace or notifier is registered against on one axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Any,
    Entity(EntityRef),
    Tag(String),
}
impl Selector {
    pub fn names(&self, entity: EntityRef) -> bool {
        matches!(self, Selector::Entity(e) if *e == entity)
    }
}
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Selector::Any => f.write_str("all"),
            Selector::Entity(e) => write!(f, "{e}"),
            Selector::Tag(t) => write!(f, "tag:{t}"),
        }
    }
}
