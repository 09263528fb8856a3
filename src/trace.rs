//! Value traces: callbacks fired when a matching cell is read, written,
//! created or unset.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use tracing::trace;

use crate::construct::{ClientId, EntityRef, Selector};
use crate::error::{Result, TableError};
use crate::table::Table;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TraceFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const UNSET = 1 << 2;
        const CREATE = 1 << 3;
    }
}

impl TraceFlags {
    /// Parses the letter form `rwuc` used by scripts.
    pub fn parse(letters: &str) -> Result<Self> {
        let mut flags = TraceFlags::empty();
        for c in letters.chars() {
            flags |= match c {
                'r' => TraceFlags::READ,
                'w' => TraceFlags::WRITE,
                'u' => TraceFlags::UNSET,
                'c' => TraceFlags::CREATE,
                _ => {
                    return Err(TableError::Argument(format!(
                        "unknown trace flag \"{c}\" in \"{letters}\": should be r, w, u or c"
                    )));
                }
            };
        }
        if flags.is_empty() {
            return Err(TableError::Argument("no trace flags given".to_string()));
        }
        Ok(flags)
    }
    pub fn letters(&self) -> String {
        let mut s = String::new();
        for (flag, c) in [
            (TraceFlags::READ, 'r'),
            (TraceFlags::WRITE, 'w'),
            (TraceFlags::UNSET, 'u'),
            (TraceFlags::CREATE, 'c'),
        ] {
            if self.contains(flag) {
                s.push(c);
            }
        }
        s
    }
}

pub type TraceId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub trace: TraceId,
    pub row: EntityRef,
    pub column: EntityRef,
    pub row_index: usize,
    pub column_index: usize,
    /// The subset of the trace's mask that this access triggered.
    pub flags: TraceFlags,
}

pub type TraceCallback = Rc<dyn Fn(&mut Table, &TraceEvent) -> Result<()>>;

pub struct Trace {
    id: TraceId,
    row: Selector,
    column: Selector,
    mask: TraceFlags,
    owner: Option<ClientId>,
    callback: TraceCallback,
    active: bool,
}
impl Trace {
    pub fn id(&self) -> TraceId {
        self.id
    }
    pub fn row(&self) -> &Selector {
        &self.row
    }
    pub fn column(&self) -> &Selector {
        &self.column
    }
    pub fn mask(&self) -> TraceFlags {
        self.mask
    }
    pub fn owner(&self) -> Option<ClientId> {
        self.owner
    }
}
impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Trace")
            .field("id", &self.id)
            .field("row", &self.row)
            .field("column", &self.column)
            .field("mask", &self.mask)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Registered traces in registration order.
#[derive(Default)]
pub struct TraceList {
    next_id: TraceId,
    traces: IndexMap<TraceId, Trace>,
}
impl TraceList {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(
        &mut self,
        row: Selector,
        column: Selector,
        mask: TraceFlags,
        owner: Option<ClientId>,
        callback: TraceCallback,
    ) -> TraceId {
        let id = self.next_id;
        self.next_id += 1;
        self.traces.insert(
            id,
            Trace {
                id,
                row,
                column,
                mask,
                owner,
                callback,
                active: false,
            },
        );
        id
    }
    pub fn remove(&mut self, id: TraceId) -> Option<Trace> {
        self.traces.shift_remove(&id)
    }
    pub fn get(&self, id: TraceId) -> Option<&Trace> {
        self.traces.get(&id)
    }
    pub fn ids(&self) -> Vec<TraceId> {
        self.traces.keys().copied().collect()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        self.traces.values()
    }
    pub fn len(&self) -> usize {
        self.traces.len()
    }
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
    /// Drops every trace registered directly against `entity`.
    pub fn forget_entity(&mut self, entity: EntityRef) -> usize {
        let before = self.traces.len();
        self.traces
            .retain(|_, t| !t.row.names(entity) && !t.column.names(entity));
        before - self.traces.len()
    }
    pub fn release_client(&mut self, client: ClientId) -> usize {
        let before = self.traces.len();
        self.traces.retain(|_, t| t.owner != Some(client));
        before - self.traces.len()
    }
    fn set_active(&mut self, id: TraceId, active: bool) -> bool {
        match self.traces.get_mut(&id) {
            Some(t) => {
                t.active = active;
                true
            }
            None => false,
        }
    }
}

impl Table {
    /// Invokes every trace matching the cell whose mask intersects `flags`.
    pub(crate) fn fire_traces(&mut self, row: EntityRef, column: EntityRef, flags: TraceFlags) {
        if self.traces.is_empty() {
            return;
        }
        let matched: Vec<(TraceId, TraceFlags, TraceCallback)> = self
            .traces
            .iter()
            .filter(|t| !t.active && t.mask.intersects(flags))
            .filter(|t| self.selects(&t.row, row) && self.selects(&t.column, column))
            .map(|t| (t.id, t.mask & flags, Rc::clone(&t.callback)))
            .collect();
        for (id, fired, callback) in matched {
            let (Some(row_index), Some(column_index)) = (self.index_of(row), self.index_of(column))
            else {
                break;
            };
            if !self.traces.set_active(id, true) {
                continue;
            }
            let event = TraceEvent {
                trace: id,
                row,
                column,
                row_index,
                column_index,
                flags: fired,
            };
            trace!(table = %self.name(), trace = id, row = row_index, column = column_index, flags = %fired.letters(), "firing trace");
            let outcome = callback(self, &event);
            self.traces.set_active(id, false);
            if let Err(e) = outcome {
                self.report(TableError::Callback(format!(
                    "trace{id} on \"{}\" ({}, {}): {e}",
                    self.name(),
                    row_index,
                    column_index
                )));
            }
        }
    }
}
