use thiserror::Error;

use crate::construct::Kind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("can't find {kind} \"{spec}\" in \"{table}\"")]
    NotFound { kind: Kind, spec: String, table: String },
    #[error("{kind} index {index} is out of range in \"{table}\"")]
    OutOfRange { kind: Kind, index: i64, table: String },
    #[error("{kind} specifier \"{spec}\" matches {count} entities, expected exactly one")]
    Ambiguous { kind: Kind, spec: String, count: usize },
    #[error("unknown {kind} tag \"{tag}\"")]
    UnknownTag { kind: Kind, tag: String },
    #[error("bad tag name \"{name}\": {reason}")]
    BadTagName { name: String, reason: &'static str },
    #[error("Invalid argument: {0}")]
    Argument(String),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Callback error: {0}")]
    Callback(String),
    #[error("no trace \"trace{0}\"")]
    NoSuchTrace(u64),
    #[error("no watch \"watch{0}\"")]
    NoSuchNotifier(u64),
    #[error("a table named \"{0}\" already exists")]
    TableExists(String),
    #[error("no table named \"{0}\"")]
    NoSuchTable(String),
    #[error("table handle is no longer valid")]
    StaleHandle,
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TableError>;

// Helper conversions
impl From<::config::ConfigError> for TableError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
