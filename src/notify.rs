//! Structural notifiers ("watches"): callbacks fired when rows or columns are
//! created, deleted, moved or relabeled. Notifiers flagged `WHENIDLE` are
//! queued, coalesced per notifier, and run by [`Table::run_idle`].

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::construct::{ClientId, EntityRef, Kind, Selector};
use crate::error::{Result, TableError};
use crate::table::Table;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NotifyFlags: u8 {
        const CREATE = 1 << 0;
        const DELETE = 1 << 1;
        const MOVE = 1 << 2;
        const RELABEL = 1 << 3;
        const WHENIDLE = 1 << 4;
        const ALL_EVENTS = Self::CREATE.bits() | Self::DELETE.bits() | Self::MOVE.bits() | Self::RELABEL.bits();
    }
}

impl NotifyFlags {
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (flag, name) in [
            (NotifyFlags::CREATE, "create"),
            (NotifyFlags::DELETE, "delete"),
            (NotifyFlags::MOVE, "move"),
            (NotifyFlags::RELABEL, "relabel"),
            (NotifyFlags::WHENIDLE, "whenidle"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names
    }
}

pub type NotifierId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotifyEvent {
    pub notifier: NotifierId,
    pub entity: EntityRef,
    /// Index of the entity when the event happened.
    pub index: usize,
    pub flags: NotifyFlags,
}

pub type NotifyCallback = Rc<dyn Fn(&mut Table, &NotifyEvent) -> Result<()>>;

pub struct Notifier {
    id: NotifierId,
    kind: Kind,
    selector: Selector,
    mask: NotifyFlags,
    owner: Option<ClientId>,
    callback: NotifyCallback,
    active: bool,
}
impl Notifier {
    pub fn id(&self) -> NotifierId {
        self.id
    }
    pub fn kind(&self) -> Kind {
        self.kind
    }
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
    pub fn mask(&self) -> NotifyFlags {
        self.mask
    }
    pub fn owner(&self) -> Option<ClientId> {
        self.owner
    }
}
impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("selector", &self.selector)
            .field("mask", &self.mask)
            .field("owner", &self.owner)
            .finish()
    }
}

#[derive(Default)]
pub struct NotifierList {
    next_id: NotifierId,
    notifiers: IndexMap<NotifierId, Notifier>,
    pending: IndexMap<NotifierId, NotifyEvent>,
}
impl NotifierList {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(
        &mut self,
        kind: Kind,
        selector: Selector,
        mask: NotifyFlags,
        owner: Option<ClientId>,
        callback: NotifyCallback,
    ) -> NotifierId {
        let id = self.next_id;
        self.next_id += 1;
        self.notifiers.insert(
            id,
            Notifier {
                id,
                kind,
                selector,
                mask,
                owner,
                callback,
                active: false,
            },
        );
        id
    }
    pub fn remove(&mut self, id: NotifierId) -> Option<Notifier> {
        self.pending.shift_remove(&id);
        self.notifiers.shift_remove(&id)
    }
    pub fn get(&self, id: NotifierId) -> Option<&Notifier> {
        self.notifiers.get(&id)
    }
    pub fn ids(&self) -> Vec<NotifierId> {
        self.notifiers.keys().copied().collect()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Notifier> {
        self.notifiers.values()
    }
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
    pub fn forget_entity(&mut self, entity: EntityRef) -> usize {
        let before = self.notifiers.len();
        self.notifiers.retain(|_, n| !n.selector.names(entity));
        let notifiers = &self.notifiers;
        self.pending.retain(|id, _| notifiers.contains_key(id));
        before - self.notifiers.len()
    }
    pub fn release_client(&mut self, client: ClientId) -> usize {
        let before = self.notifiers.len();
        self.notifiers.retain(|_, n| n.owner != Some(client));
        let notifiers = &self.notifiers;
        self.pending.retain(|id, _| notifiers.contains_key(id));
        before - self.notifiers.len()
    }
    /// Queues an idle event; a notifier already pending just accumulates flags.
    fn defer(&mut self, event: NotifyEvent) {
        self.pending
            .entry(event.notifier)
            .and_modify(|queued| queued.flags |= event.flags)
            .or_insert(event);
    }
    fn set_active(&mut self, id: NotifierId, active: bool) -> bool {
        match self.notifiers.get_mut(&id) {
            Some(n) => {
                n.active = active;
                true
            }
            None => false,
        }
    }
}

impl Table {
    /// Runs (or, for idle notifiers, queues) every notifier watching `entity`
    /// for one of `flags`.
    pub(crate) fn notify(&mut self, entity: EntityRef, flags: NotifyFlags) {
        if self.notifiers.is_empty() {
            return;
        }
        if !self.exists(entity) {
            return;
        }
        let matched: Vec<(NotifierId, NotifyFlags, bool, NotifyCallback)> = self
            .notifiers
            .iter()
            .filter(|n| n.kind == entity.kind() && !n.active && n.mask.intersects(flags))
            .filter(|n| self.selects(&n.selector, entity))
            .map(|n| {
                (
                    n.id,
                    n.mask & flags,
                    n.mask.contains(NotifyFlags::WHENIDLE),
                    Rc::clone(&n.callback),
                )
            })
            .collect();
        for (id, fired, idle, callback) in matched {
            let Some(index) = self.index_of(entity) else {
                break;
            };
            let event = NotifyEvent {
                notifier: id,
                entity,
                index,
                flags: fired,
            };
            if idle {
                self.notifiers.defer(event);
                continue;
            }
            if !self.notifiers.set_active(id, true) {
                continue;
            }
            trace!(table = %self.name(), notifier = id, kind = %entity.kind(), index, "firing notifier");
            let outcome = callback(self, &event);
            self.notifiers.set_active(id, false);
            if let Err(e) = outcome {
                self.report(TableError::Callback(format!(
                    "watch{id} on \"{}\" ({} {index}): {e}",
                    self.name(),
                    entity.kind()
                )));
            }
        }
    }

    /// Runs the idle notifiers queued so far. Events raised by these callbacks
    /// stay queued for the next call. Returns how many callbacks ran.
    pub fn run_idle(&mut self) -> usize {
        let mut ran = 0;
        let queued: Vec<NotifyEvent> = self.notifiers.pending.drain(..).map(|(_, e)| e).collect();
        for event in queued {
            let Some(callback) = self.notifiers.get(event.notifier).map(|n| Rc::clone(&n.callback))
            else {
                continue;
            };
            self.notifiers.set_active(event.notifier, true);
            let outcome = callback(self, &event);
            self.notifiers.set_active(event.notifier, false);
            ran += 1;
            if let Err(e) = outcome {
                self.report(TableError::Callback(format!(
                    "watch{} on \"{}\" (idle, {} {}): {e}",
                    event.notifier,
                    self.name(),
                    event.entity.kind(),
                    event.index
                )));
            }
        }
        if ran > 0 {
            debug!(table = %self.name(), ran, "idle notifiers flushed");
        }
        ran
    }
}
