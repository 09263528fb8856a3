//! Physical storage of rows, columns and cell values.
//!
//! The table engine only consumes the [`Storage`] trait: dense ordering of the
//! entities on each axis, their labels, column types and the cells themselves.
//! Tags, traces and notifiers are kept by the engine, not by the storage.
//! [`MemoryStorage`] is the in-process implementation every table starts with.

use std::collections::HashMap;

use crate::construct::{ColumnType, EntityGenerator, EntityId, EntityRef, IdHasher, Kind};

pub trait Storage {
    fn len(&self, kind: Kind) -> usize;
    fn entity(&self, kind: Kind, index: usize) -> Option<EntityRef>;
    fn index_of(&self, entity: EntityRef) -> Option<usize>;
    fn label(&self, entity: EntityRef) -> Option<&str>;
    fn set_label(&mut self, entity: EntityRef, label: Option<String>);
    /// Every entity carrying `label`, in index order.
    fn find_label(&self, kind: Kind, label: &str) -> Vec<EntityRef>;
    /// Inserts a new entity at `position` (or at the end) and renumbers.
    fn create(&mut self, kind: Kind, position: Option<usize>, label: Option<String>) -> EntityRef;
    fn extend(&mut self, kind: Kind, count: usize) -> Vec<EntityRef> {
        (0..count).map(|_| self.create(kind, None, None)).collect()
    }
    /// Removes the entity and all of its cells. False if it was already gone.
    fn delete(&mut self, entity: EntityRef) -> bool;
    /// Moves `count` entities starting at `from` so that the first lands at `to`.
    /// Bounds are checked by the caller.
    fn move_range(&mut self, kind: Kind, from: usize, to: usize, count: usize);
    /// Replaces the order of an axis with a permutation of its current entities.
    fn reorder(&mut self, kind: Kind, order: &[EntityRef]);
    fn column_type(&self, column: EntityRef) -> ColumnType;
    fn set_column_type(&mut self, column: EntityRef, column_type: ColumnType);
    fn get(&self, row: EntityRef, column: EntityRef) -> Option<&str>;
    /// Stores a value, returning the previous one.
    fn set(&mut self, row: EntityRef, column: EntityRef, value: String) -> Option<String>;
    fn unset(&mut self, row: EntityRef, column: EntityRef) -> Option<String>;
}

// ------------- MemoryStorage -------------
#[derive(Debug, Default)]
struct Entry {
    index: usize,
    label: Option<String>,
    column_type: ColumnType,
}

#[derive(Debug, Default)]
struct Axis {
    order: Vec<EntityId>,
    entries: HashMap<EntityId, Entry, IdHasher>,
}
impl Axis {
    fn renumber(&mut self, from: usize) {
        for (index, id) in self.order.iter().enumerate().skip(from) {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.index = index;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    generator: EntityGenerator,
    rows: Axis,
    columns: Axis,
    cells: HashMap<(EntityId, EntityId), String, IdHasher>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
    fn axis(&self, kind: Kind) -> &Axis {
        match kind {
            Kind::Row => &self.rows,
            Kind::Column => &self.columns,
        }
    }
    fn axis_mut(&mut self, kind: Kind) -> &mut Axis {
        match kind {
            Kind::Row => &mut self.rows,
            Kind::Column => &mut self.columns,
        }
    }
}

impl Storage for MemoryStorage {
    fn len(&self, kind: Kind) -> usize {
        self.axis(kind).order.len()
    }
    fn entity(&self, kind: Kind, index: usize) -> Option<EntityRef> {
        self.axis(kind)
            .order
            .get(index)
            .map(|id| EntityRef::new(kind, *id))
    }
    fn index_of(&self, entity: EntityRef) -> Option<usize> {
        self.axis(entity.kind())
            .entries
            .get(&entity.id())
            .map(|e| e.index)
    }
    fn label(&self, entity: EntityRef) -> Option<&str> {
        self.axis(entity.kind())
            .entries
            .get(&entity.id())
            .and_then(|e| e.label.as_deref())
    }
    fn set_label(&mut self, entity: EntityRef, label: Option<String>) {
        if let Some(entry) = self.axis_mut(entity.kind()).entries.get_mut(&entity.id()) {
            entry.label = label;
        }
    }
    fn find_label(&self, kind: Kind, label: &str) -> Vec<EntityRef> {
        let axis = self.axis(kind);
        axis.order
            .iter()
            .filter(|id| {
                axis.entries
                    .get(*id)
                    .and_then(|e| e.label.as_deref())
                    .is_some_and(|l| l == label)
            })
            .map(|id| EntityRef::new(kind, *id))
            .collect()
    }
    fn create(&mut self, kind: Kind, position: Option<usize>, label: Option<String>) -> EntityRef {
        let id = self.generator.generate();
        let axis = self.axis_mut(kind);
        let index = position.unwrap_or(axis.order.len()).min(axis.order.len());
        axis.order.insert(index, id);
        axis.entries.insert(
            id,
            Entry {
                index,
                label,
                column_type: ColumnType::default(),
            },
        );
        axis.renumber(index + 1);
        EntityRef::new(kind, id)
    }
    fn delete(&mut self, entity: EntityRef) -> bool {
        let kind = entity.kind();
        let index = match self.axis_mut(kind).entries.remove(&entity.id()) {
            Some(entry) => entry.index,
            None => return false,
        };
        let axis = self.axis_mut(kind);
        axis.order.remove(index);
        axis.renumber(index);
        match kind {
            Kind::Row => {
                for column in &self.columns.order {
                    self.cells.remove(&(entity.id(), *column));
                }
            }
            Kind::Column => {
                for row in &self.rows.order {
                    self.cells.remove(&(*row, entity.id()));
                }
            }
        }
        true
    }
    fn move_range(&mut self, kind: Kind, from: usize, to: usize, count: usize) {
        let axis = self.axis_mut(kind);
        let moved: Vec<EntityId> = axis.order.drain(from..from + count).collect();
        axis.order.splice(to..to, moved);
        axis.renumber(from.min(to));
    }
    fn reorder(&mut self, kind: Kind, order: &[EntityRef]) {
        let axis = self.axis_mut(kind);
        axis.order = order.iter().map(|e| e.id()).collect();
        axis.renumber(0);
    }
    fn column_type(&self, column: EntityRef) -> ColumnType {
        self.columns
            .entries
            .get(&column.id())
            .map(|e| e.column_type)
            .unwrap_or_default()
    }
    fn set_column_type(&mut self, column: EntityRef, column_type: ColumnType) {
        if let Some(entry) = self.columns.entries.get_mut(&column.id()) {
            entry.column_type = column_type;
        }
    }
    fn get(&self, row: EntityRef, column: EntityRef) -> Option<&str> {
        self.cells
            .get(&(row.id(), column.id()))
            .map(|v| v.as_str())
    }
    fn set(&mut self, row: EntityRef, column: EntityRef, value: String) -> Option<String> {
        self.cells.insert((row.id(), column.id()), value)
    }
    fn unset(&mut self, row: EntityRef, column: EntityRef) -> Option<String> {
        self.cells.remove(&(row.id(), column.id()))
    }
}
