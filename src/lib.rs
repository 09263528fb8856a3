//! Datatable – named in-memory tables of rows and columns, driven by a small
//! command language.
//!
//! A [`table::Table`] is a grid of optional string values. Rows and columns
//! are [`construct::EntityRef`] handles with a dense index, an optional label
//! and any number of tags. Around that grid sit:
//! * tag registries ([`tags`]) with the computed `all`/`end` tags,
//! * a specifier resolver ([`iterate`]) turning `3`, `end`, `name:x`,
//!   `tag:t`, `label:a*` or `range:1-4` into ordered entity selections,
//! * value traces ([`trace`]) fired on read, write, create and unset,
//! * structural notifiers ([`notify`]) fired on create, delete, move and
//!   relabel, optionally deferred until [`table::Table::run_idle`],
//! * a multi-key sort ([`sort`]) returning rows, values or frequencies, or
//!   reordering the table in place,
//! * a flat dump/restore format ([`dump`]).
//!
//! Tables are owned by a [`registry::Registry`] and reached through per-client
//! handles. A [`command::Session`] evaluates scripts (grammar in
//! `script.pest`) against a registry:
//!
//! ```
//! use datatable::command::Session;
//! let mut session = Session::new();
//! session.eval("datatable create people").unwrap();
//! session.eval("people set 0 name Ada 1 name Brian 0 age 36").unwrap();
//! assert_eq!(session.eval("people get 0 age").unwrap(), "36");
//! assert_eq!(session.eval("people numrows").unwrap(), "2");
//! ```
//!
//! Tables keep `Rc` callbacks and are single-threaded. [`interface`] confines
//! a session to a worker thread and [`server`] exposes it over HTTP.

pub mod command;
pub mod config;
pub mod construct;
pub mod dump;
pub mod error;
pub mod interface;
pub mod iterate;
pub mod notify;
pub mod registry;
pub mod script;
pub mod server;
pub mod sort;
pub mod storage;
pub mod table;
pub mod tags;
pub mod trace;

pub use error::{Result, TableError};
