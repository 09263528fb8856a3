//! A named table: storage plus the tag registries, traces and notifiers that
//! observe it. Every structural or value change goes through here so that the
//! observers stay consistent with the storage.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::construct::{ClientId, ColumnType, EntityRef, Kind, Selector};
use crate::error::{Result, TableError};
use crate::notify::{NotifierId, NotifierList, NotifyEvent, NotifyFlags};
use crate::storage::{MemoryStorage, Storage};
use crate::tags::{self, TagRegistry};
use crate::trace::{TraceEvent, TraceFlags, TraceId, TraceList};

pub struct Table {
    name: String,
    storage: Box<dyn Storage>,
    row_tags: TagRegistry,
    column_tags: TagRegistry,
    pub(crate) traces: TraceList,
    pub(crate) notifiers: NotifierList,
    empty_value: String,
    max_extent: usize,
    background_errors: Vec<TableError>,
}

/// Largest number of rows or columns a table grows to unless configured.
pub const DEFAULT_MAX_EXTENT: usize = 10_000_000;

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_storage(name, Box::new(MemoryStorage::new()))
    }
    pub fn with_storage(name: impl Into<String>, storage: Box<dyn Storage>) -> Self {
        Self {
            name: name.into(),
            storage,
            row_tags: TagRegistry::new(),
            column_tags: TagRegistry::new(),
            traces: TraceList::new(),
            notifiers: NotifierList::new(),
            empty_value: String::new(),
            max_extent: DEFAULT_MAX_EXTENT,
            background_errors: Vec::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------- Extent -------------
    pub fn len(&self, kind: Kind) -> usize {
        self.storage.len(kind)
    }
    pub fn num_rows(&self) -> usize {
        self.storage.len(Kind::Row)
    }
    pub fn num_columns(&self) -> usize {
        self.storage.len(Kind::Column)
    }
    pub fn entity(&self, kind: Kind, index: usize) -> Option<EntityRef> {
        self.storage.entity(kind, index)
    }
    pub fn row(&self, index: usize) -> Option<EntityRef> {
        self.storage.entity(Kind::Row, index)
    }
    pub fn column(&self, index: usize) -> Option<EntityRef> {
        self.storage.entity(Kind::Column, index)
    }
    /// Every live entity of the axis, in index order.
    pub fn entities(&self, kind: Kind) -> Vec<EntityRef> {
        (0..self.len(kind))
            .filter_map(|i| self.storage.entity(kind, i))
            .collect()
    }
    pub fn index_of(&self, entity: EntityRef) -> Option<usize> {
        self.storage.index_of(entity)
    }
    pub fn exists(&self, entity: EntityRef) -> bool {
        self.storage.index_of(entity).is_some()
    }
    pub fn label(&self, entity: EntityRef) -> Option<&str> {
        self.storage.label(entity)
    }
    pub fn find_label(&self, kind: Kind, label: &str) -> Vec<EntityRef> {
        self.storage.find_label(kind, label)
    }
    pub fn max_extent(&self) -> usize {
        self.max_extent
    }
    pub fn set_max_extent(&mut self, max: usize) {
        self.max_extent = max;
    }
    /// Errors when growing the axis to `len` would pass the maximum extent.
    pub fn check_extent(&self, kind: Kind, len: usize) -> Result<()> {
        if len > self.max_extent && len > self.len(kind) {
            return Err(TableError::Argument(format!(
                "can't grow to {len} {kind}s: the limit is {}",
                self.max_extent
            )));
        }
        Ok(())
    }
    pub(crate) fn not_found(&self, entity: EntityRef) -> TableError {
        TableError::NotFound {
            kind: entity.kind(),
            spec: entity.to_string(),
            table: self.name.clone(),
        }
    }
    fn check_entity(&self, entity: EntityRef) -> Result<usize> {
        self.index_of(entity).ok_or_else(|| self.not_found(entity))
    }
    fn check_cell(&self, row: EntityRef, column: EntityRef) -> Result<()> {
        if row.kind() != Kind::Row || column.kind() != Kind::Column {
            return Err(TableError::Argument(format!(
                "cell needs a row and a column, got {} and {}",
                row.kind(),
                column.kind()
            )));
        }
        self.check_entity(row)?;
        self.check_entity(column)?;
        Ok(())
    }

    // ------------- Structure -------------
    pub fn create(&mut self, kind: Kind, position: Option<usize>, label: Option<&str>) -> EntityRef {
        let label = label.filter(|l| !l.is_empty()).map(str::to_string);
        let entity = self.storage.create(kind, position, label);
        self.notify(entity, NotifyFlags::CREATE);
        entity
    }
    pub fn extend(&mut self, kind: Kind, count: usize) -> Vec<EntityRef> {
        let created = self.storage.extend(kind, count);
        for entity in &created {
            self.notify(*entity, NotifyFlags::CREATE);
        }
        created
    }
    /// Grows the axis with new entities or shrinks it by deleting trailing ones.
    pub fn set_len(&mut self, kind: Kind, len: usize) {
        let current = self.len(kind);
        if len > current {
            self.extend(kind, len - current);
        } else {
            let doomed: Vec<EntityRef> = (len..current)
                .rev()
                .filter_map(|i| self.entity(kind, i))
                .collect();
            self.delete_many(&doomed);
        }
    }
    /// Deletes the entity and everything that names it directly. Deleting an
    /// entity that is already gone is a no-op returning false.
    pub fn delete(&mut self, entity: EntityRef) -> bool {
        if !self.exists(entity) {
            return false;
        }
        self.notify(entity, NotifyFlags::DELETE);
        // a delete notifier may have removed it already
        if !self.exists(entity) {
            return false;
        }
        self.tags_mut(entity.kind()).purge_entity(entity.id());
        let traces = self.traces.forget_entity(entity);
        let notifiers = self.notifiers.forget_entity(entity);
        self.storage.delete(entity);
        debug!(table = %self.name, %entity, traces, notifiers, "deleted");
        true
    }
    /// Deletes a snapshot of entities, walking from the highest index down.
    pub fn delete_many(&mut self, entities: &[EntityRef]) -> usize {
        let mut ordered: Vec<(usize, EntityRef)> = entities
            .iter()
            .filter_map(|e| self.index_of(*e).map(|i| (i, *e)))
            .collect();
        ordered.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        ordered.dedup_by_key(|(_, e)| *e);
        ordered
            .into_iter()
            .filter(|(_, e)| self.delete(*e))
            .count()
    }
    /// Moves `count` entities starting at index `from` so that the first one
    /// ends up at index `to`. Only the moved entities are notified.
    pub fn move_range(&mut self, kind: Kind, from: usize, to: usize, count: usize) -> Result<()> {
        let len = self.len(kind);
        let fits = |start: usize| start.checked_add(count).is_some_and(|end| end <= len);
        if !fits(from) || !fits(to) {
            return Err(TableError::Argument(format!(
                "can't move {count} {kind}s from {from} to {to}: only {len} {kind}s"
            )));
        }
        if count == 0 || from == to {
            return Ok(());
        }
        let moved: Vec<EntityRef> = (from..from + count)
            .filter_map(|i| self.entity(kind, i))
            .collect();
        self.storage.move_range(kind, from, to, count);
        for entity in moved {
            self.notify(entity, NotifyFlags::MOVE);
        }
        Ok(())
    }
    /// Replaces the order of the axis with `order`, which must be a permutation
    /// of the live entities. Entities whose index changed are notified.
    pub fn reorder(&mut self, kind: Kind, order: &[EntityRef]) -> Result<()> {
        let current = self.entities(kind);
        let mut check: Vec<EntityRef> = order.to_vec();
        check.sort_unstable();
        check.dedup();
        let mut expected = current.clone();
        expected.sort_unstable();
        if check != expected || order.len() != current.len() {
            return Err(TableError::Argument(format!(
                "new {kind} order is not a permutation of the table's {kind}s"
            )));
        }
        self.storage.reorder(kind, order);
        let moved: Vec<EntityRef> = order
            .iter()
            .zip(current.iter())
            .filter(|(new, old)| new != old)
            .map(|(new, _)| *new)
            .collect();
        for entity in moved {
            self.notify(entity, NotifyFlags::MOVE);
        }
        Ok(())
    }
    /// Sets or (with `None` or an empty string) clears the label.
    pub fn relabel(&mut self, entity: EntityRef, label: Option<&str>) -> Result<()> {
        self.check_entity(entity)?;
        let label = label.filter(|l| !l.is_empty()).map(str::to_string);
        self.storage.set_label(entity, label);
        self.notify(entity, NotifyFlags::RELABEL);
        Ok(())
    }
    pub fn column_type(&self, column: EntityRef) -> ColumnType {
        self.storage.column_type(column)
    }
    /// Changes the column type after checking every stored value converts.
    pub fn set_column_type(&mut self, column: EntityRef, column_type: ColumnType) -> Result<()> {
        self.check_entity(column)?;
        for (index, row) in self.entities(Kind::Row).into_iter().enumerate() {
            if let Some(value) = self.storage.get(row, column) {
                if !column_type.accepts(value) {
                    return Err(TableError::Argument(format!(
                        "can't convert \"{value}\" in row {index} to {column_type}"
                    )));
                }
            }
        }
        self.storage.set_column_type(column, column_type);
        Ok(())
    }

    // ------------- Tags -------------
    pub fn tags(&self, kind: Kind) -> &TagRegistry {
        match kind {
            Kind::Row => &self.row_tags,
            Kind::Column => &self.column_tags,
        }
    }
    pub fn tags_mut(&mut self, kind: Kind) -> &mut TagRegistry {
        match kind {
            Kind::Row => &mut self.row_tags,
            Kind::Column => &mut self.column_tags,
        }
    }
    pub fn add_tag(&mut self, kind: Kind, name: &str) -> Result<()> {
        self.tags_mut(kind).add_tag(name)
    }
    pub fn tag(&mut self, entity: EntityRef, name: &str) -> Result<()> {
        self.check_entity(entity)?;
        self.tags_mut(entity.kind()).tag_entity(name, entity.id())
    }
    pub fn untag(&mut self, entity: EntityRef, name: &str) {
        self.tags_mut(entity.kind()).untag_entity(name, entity.id());
    }
    pub fn forget_tag(&mut self, kind: Kind, name: &str) {
        self.tags_mut(kind).forget_tag(name);
    }
    pub fn has_tag(&self, entity: EntityRef, name: &str) -> bool {
        match name {
            tags::ALL => self.exists(entity),
            tags::END => {
                let len = self.len(entity.kind());
                len > 0 && self.index_of(entity) == Some(len - 1)
            }
            _ => self.tags(entity.kind()).has_tag(name, entity.id()),
        }
    }
    pub fn tags_of(&self, entity: EntityRef) -> Vec<String> {
        self.tags(entity.kind()).tags_of(entity.id())
    }
    /// Members of a tag in index order, including the computed `all`/`end`.
    pub fn tagged(&self, kind: Kind, name: &str) -> Result<Vec<EntityRef>> {
        match name {
            tags::ALL => Ok(self.entities(kind)),
            tags::END => Ok(self
                .len(kind)
                .checked_sub(1)
                .and_then(|i| self.entity(kind, i))
                .into_iter()
                .collect()),
            _ => {
                let members = self
                    .tags(kind)
                    .entities(name)
                    .ok_or_else(|| TableError::UnknownTag {
                        kind,
                        tag: name.to_string(),
                    })?;
                let mut indexed: Vec<(usize, EntityRef)> = members
                    .iter()
                    .map(|id| EntityRef::new(kind, id))
                    .filter_map(|e| self.index_of(e).map(|i| (i, e)))
                    .collect();
                indexed.sort_unstable_by_key(|(i, _)| *i);
                Ok(indexed.into_iter().map(|(_, e)| e).collect())
            }
        }
    }
    pub(crate) fn selects(&self, selector: &Selector, entity: EntityRef) -> bool {
        match selector {
            Selector::Any => true,
            Selector::Entity(e) => *e == entity,
            Selector::Tag(tag) => self.has_tag(entity, tag),
        }
    }

    // ------------- Values -------------
    /// Reads a cell. Read traces run first, so they may supply the value.
    pub fn get_value(&mut self, row: EntityRef, column: EntityRef) -> Option<String> {
        if self.check_cell(row, column).is_err() {
            return None;
        }
        self.fire_traces(row, column, TraceFlags::READ);
        self.storage.get(row, column).map(str::to_string)
    }
    /// Reads a cell without firing traces.
    pub fn peek_value(&self, row: EntityRef, column: EntityRef) -> Option<&str> {
        self.storage.get(row, column)
    }
    pub fn has_value(&self, row: EntityRef, column: EntityRef) -> bool {
        self.storage.get(row, column).is_some()
    }
    pub fn set_value(&mut self, row: EntityRef, column: EntityRef, value: &str) -> Result<()> {
        self.check_cell(row, column)?;
        self.storage.column_type(column).check(value)?;
        let previous = self.storage.set(row, column, value.to_string());
        let mut flags = TraceFlags::WRITE;
        if previous.is_none() {
            flags |= TraceFlags::CREATE;
        }
        self.fire_traces(row, column, flags);
        Ok(())
    }
    pub fn append_value(&mut self, row: EntityRef, column: EntityRef, text: &str) -> Result<()> {
        self.check_cell(row, column)?;
        let mut value = self.storage.get(row, column).unwrap_or_default().to_string();
        value.push_str(text);
        self.set_value(row, column, &value)
    }
    /// Removes a cell value. False when there was nothing to remove.
    pub fn unset_value(&mut self, row: EntityRef, column: EntityRef) -> bool {
        if self.check_cell(row, column).is_err() {
            return false;
        }
        if self.storage.unset(row, column).is_none() {
            return false;
        }
        self.fire_traces(row, column, TraceFlags::UNSET);
        true
    }
    /// Placeholder reported for absent cells.
    pub fn empty_value(&self) -> &str {
        &self.empty_value
    }
    pub fn set_empty_value(&mut self, value: impl Into<String>) {
        self.empty_value = value.into();
    }

    // ------------- Observers -------------
    fn check_selector(&self, kind: Kind, selector: &Selector) -> Result<()> {
        match selector {
            Selector::Any => Ok(()),
            Selector::Entity(e) if e.kind() != kind => Err(TableError::Argument(format!(
                "expected a {kind} but got a {}",
                e.kind()
            ))),
            Selector::Entity(e) => self.check_entity(*e).map(|_| ()),
            Selector::Tag(tag) if tags::is_reserved(tag) => Ok(()),
            Selector::Tag(tag) => tags::validate_tag_name(tag),
        }
    }
    pub fn create_trace<F>(
        &mut self,
        owner: Option<ClientId>,
        row: Selector,
        column: Selector,
        mask: TraceFlags,
        callback: F,
    ) -> Result<TraceId>
    where
        F: Fn(&mut Table, &TraceEvent) -> Result<()> + 'static,
    {
        if mask.is_empty() {
            return Err(TableError::Argument("trace needs at least one event".to_string()));
        }
        self.check_selector(Kind::Row, &row)?;
        self.check_selector(Kind::Column, &column)?;
        let id = self.traces.insert(row, column, mask, owner, Rc::new(callback));
        debug!(table = %self.name, trace = id, flags = %mask.letters(), "trace created");
        Ok(id)
    }
    pub fn delete_trace(&mut self, id: TraceId) -> Result<()> {
        self.traces
            .remove(id)
            .map(|_| ())
            .ok_or(TableError::NoSuchTrace(id))
    }
    pub fn traces(&self) -> &TraceList {
        &self.traces
    }
    pub fn create_notifier<F>(
        &mut self,
        owner: Option<ClientId>,
        kind: Kind,
        selector: Selector,
        mask: NotifyFlags,
        callback: F,
    ) -> Result<NotifierId>
    where
        F: Fn(&mut Table, &NotifyEvent) -> Result<()> + 'static,
    {
        if !mask.intersects(NotifyFlags::ALL_EVENTS) {
            return Err(TableError::Argument("watch needs at least one event".to_string()));
        }
        self.check_selector(kind, &selector)?;
        let id = self
            .notifiers
            .insert(kind, selector, mask, owner, Rc::new(callback));
        debug!(table = %self.name, notifier = id, %kind, "watch created");
        Ok(id)
    }
    pub fn delete_notifier(&mut self, id: NotifierId) -> Result<()> {
        self.notifiers
            .remove(id)
            .map(|_| ())
            .ok_or(TableError::NoSuchNotifier(id))
    }
    pub fn notifiers(&self) -> &NotifierList {
        &self.notifiers
    }
    /// Drops the traces and notifiers registered by `client`.
    pub fn release_client(&mut self, client: ClientId) -> usize {
        self.traces.release_client(client) + self.notifiers.release_client(client)
    }

    // ------------- Background errors -------------
    pub(crate) fn report(&mut self, error: TableError) {
        warn!(table = %self.name, %error, "background error");
        self.background_errors.push(error);
    }
    pub fn background_errors(&self) -> &[TableError] {
        &self.background_errors
    }
    pub fn take_background_errors(&mut self) -> Vec<TableError> {
        std::mem::take(&mut self.background_errors)
    }
}
