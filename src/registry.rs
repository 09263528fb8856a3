//! The table command registry: owns every table by name and hands out
//! per-client handles. A table lives as long as at least one handle to it is
//! open; closing a handle drops the traces and notifiers that client created.

use std::collections::HashMap;

use slab::Slab;
use tracing::{debug, info};

use crate::construct::{ClientId, NameHasher};
use crate::error::{Result, TableError};
use crate::iterate::Glob;
use crate::table::{DEFAULT_MAX_EXTENT, Table};

struct Slot {
    generation: u64,
    table: Table,
    clients: Vec<ClientId>,
}

/// One client's reference to a registered table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableHandle {
    slot: usize,
    generation: u64,
    client: ClientId,
}
impl TableHandle {
    pub fn client(&self) -> ClientId {
        self.client
    }
}

pub struct Registry {
    slots: Slab<Slot>,
    names: HashMap<String, usize, NameHasher>,
    generation: u64,
    next_client: ClientId,
    next_auto: usize,
    prefix: String,
    empty_value: String,
    max_extent: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            names: HashMap::default(),
            generation: 0,
            next_client: 0,
            next_auto: 0,
            prefix: "datatable".to_string(),
            empty_value: String::new(),
            max_extent: DEFAULT_MAX_EXTENT,
        }
    }
    /// Prefix used for generated table names (`<prefix><n>`).
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }
    /// Empty value given to tables created from now on.
    pub fn set_default_empty_value(&mut self, value: impl Into<String>) {
        self.empty_value = value.into();
    }
    /// Extent limit given to tables created from now on.
    pub fn set_default_max_extent(&mut self, max: usize) {
        self.max_extent = max;
    }
    fn client(&mut self) -> ClientId {
        self.next_client += 1;
        self.next_client
    }
    fn auto_name(&mut self) -> String {
        loop {
            let name = format!("{}{}", self.prefix, self.next_auto);
            self.next_auto += 1;
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    pub fn create(&mut self, name: Option<&str>) -> Result<TableHandle> {
        let name = match name {
            Some(n) if n.is_empty() || n.starts_with('-') || n.chars().any(char::is_whitespace) => {
                return Err(TableError::Argument(format!("bad table name \"{n}\"")));
            }
            Some(n) if self.names.contains_key(n) => {
                return Err(TableError::TableExists(n.to_string()));
            }
            Some(n) => n.to_string(),
            None => self.auto_name(),
        };
        self.generation += 1;
        let client = self.client();
        let mut table = Table::new(name.clone());
        table.set_empty_value(self.empty_value.clone());
        table.set_max_extent(self.max_extent);
        let slot = self.slots.insert(Slot {
            generation: self.generation,
            table,
            clients: vec![client],
        });
        self.names.insert(name.clone(), slot);
        info!(table = %name, client, "table created");
        Ok(TableHandle {
            slot,
            generation: self.generation,
            client,
        })
    }

    /// Opens another handle on an existing table.
    pub fn attach(&mut self, name: &str) -> Result<TableHandle> {
        let slot = *self
            .names
            .get(name)
            .ok_or_else(|| TableError::NoSuchTable(name.to_string()))?;
        let client = self.client();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| TableError::NoSuchTable(name.to_string()))?;
        entry.clients.push(client);
        debug!(table = %name, client, handles = entry.clients.len(), "table attached");
        Ok(TableHandle {
            slot,
            generation: entry.generation,
            client,
        })
    }

    fn slot(&self, handle: &TableHandle) -> Result<&Slot> {
        self.slots
            .get(handle.slot)
            .filter(|s| s.generation == handle.generation && s.clients.contains(&handle.client))
            .ok_or(TableError::StaleHandle)
    }

    /// Closes a handle. Returns true when it was the last one and the table
    /// has been finalized.
    pub fn close(&mut self, handle: TableHandle) -> Result<bool> {
        self.slot(&handle)?;
        let entry = &mut self.slots[handle.slot];
        entry.clients.retain(|c| *c != handle.client);
        let released = entry.table.release_client(handle.client);
        if !entry.clients.is_empty() {
            debug!(table = %entry.table.name(), client = handle.client, released, "table detached");
            return Ok(false);
        }
        let slot = self.slots.remove(handle.slot);
        self.names.remove(slot.table.name());
        info!(table = %slot.table.name(), "table finalized");
        Ok(true)
    }

    pub fn table(&self, handle: &TableHandle) -> Result<&Table> {
        self.slot(handle).map(|s| &s.table)
    }
    pub fn table_mut(&mut self, handle: &TableHandle) -> Result<&mut Table> {
        self.slot(handle)?;
        Ok(&mut self.slots[handle.slot].table)
    }

    /// Registered table names matching `pattern` (every name when `None`), sorted.
    pub fn names(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let glob = pattern.map(Glob::new).transpose()?;
        let mut names: Vec<String> = self
            .names
            .keys()
            .filter(|n| glob.as_ref().is_none_or(|g| g.matches(n)))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
    pub fn exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
    /// Number of open handles on the named table.
    pub fn refcount(&self, name: &str) -> usize {
        self.names
            .get(name)
            .and_then(|slot| self.slots.get(*slot))
            .map_or(0, |s| s.clients.len())
    }
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Runs the queued idle notifiers of every table.
    pub fn run_idle(&mut self) -> usize {
        self.slots.iter_mut().map(|(_, s)| s.table.run_idle()).sum()
    }
    pub fn take_background_errors(&mut self) -> Vec<TableError> {
        self.slots
            .iter_mut()
            .flat_map(|(_, s)| s.table.take_background_errors())
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
