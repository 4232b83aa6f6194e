//! Contract between the scheduling core and the entry/teacher store.
//!
//! Stores push full snapshots, never deltas. A subscriber receives the current
//! snapshot on subscribe and again after every committed change.

use crate::model::{EntryId, Teacher, TimetableEntry, TimetableEntryDraft};
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use thiserror::Error;

pub type EntriesCallback = Box<dyn FnMut(&[TimetableEntry])>;
pub type TeachersCallback = Box<dyn FnMut(&[Teacher])>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("entry {0} does not exist")]
    NotFound(EntryId),
    #[error("store write failed: {0}")]
    Backend(String),
}

impl PersistenceError {
    pub fn code(&self) -> &'static str {
        "persistence_failed"
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            PersistenceError::NotFound(id) => json!({ "reason": "not_found", "entryId": id }),
            PersistenceError::Backend(_) => json!({ "reason": "backend" }),
        }
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Backend(e.to_string())
    }
}

pub trait TimetableStore {
    fn subscribe_entries(&self, on_change: EntriesCallback) -> Result<Subscription, PersistenceError>;

    fn subscribe_teachers(&self, on_change: TeachersCallback) -> Result<Subscription, PersistenceError>;

    fn create_entry(&self, draft: &TimetableEntryDraft) -> Result<EntryId, PersistenceError>;

    /// Fails with [`PersistenceError::NotFound`] when `id` is already gone.
    fn delete_entry(&self, id: &EntryId) -> Result<(), PersistenceError>;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, EntriesCallback>,
    teachers: BTreeMap<u64, TeachersCallback>,
}

#[derive(Default)]
struct HubInner {
    listeners: RefCell<Listeners>,
    // Subscriptions dropped while `listeners` was borrowed, e.g. from inside
    // a callback. Removed on the next registry access.
    detached: RefCell<Vec<u64>>,
}

impl HubInner {
    fn purge(&self, l: &mut Listeners) {
        loop {
            let ids = std::mem::take(&mut *self.detached.borrow_mut());
            if ids.is_empty() {
                break;
            }
            for id in ids {
                l.entries.remove(&id);
                l.teachers.remove(&id);
            }
        }
    }

    fn is_detached(&self, id: u64) -> bool {
        self.detached.borrow().contains(&id)
    }
}

/// Subscriber registry shared by store implementations.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Rc<HubInner>,
}

impl Hub {
    pub fn add_entries(&self, cb: EntriesCallback) -> Subscription {
        let mut l = self.inner.listeners.borrow_mut();
        self.inner.purge(&mut l);
        l.next_id += 1;
        let id = l.next_id;
        l.entries.insert(id, cb);
        self.subscription(id)
    }

    pub fn add_teachers(&self, cb: TeachersCallback) -> Subscription {
        let mut l = self.inner.listeners.borrow_mut();
        self.inner.purge(&mut l);
        l.next_id += 1;
        let id = l.next_id;
        l.teachers.insert(id, cb);
        self.subscription(id)
    }

    /// Delivers `snapshot` to one subscriber, or to all when `only` is None.
    pub fn notify_entries(&self, snapshot: &[TimetableEntry], only: Option<&Subscription>) {
        let mut l = self.inner.listeners.borrow_mut();
        self.inner.purge(&mut l);
        for (id, cb) in l.entries.iter_mut() {
            if only.map_or(true, |s| s.id == *id) && !self.inner.is_detached(*id) {
                cb(snapshot);
            }
        }
        self.inner.purge(&mut l);
    }

    pub fn notify_teachers(&self, snapshot: &[Teacher], only: Option<&Subscription>) {
        let mut l = self.inner.listeners.borrow_mut();
        self.inner.purge(&mut l);
        for (id, cb) in l.teachers.iter_mut() {
            if only.map_or(true, |s| s.id == *id) && !self.inner.is_detached(*id) {
                cb(snapshot);
            }
        }
        self.inner.purge(&mut l);
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        let mut l = self.inner.listeners.borrow_mut();
        self.inner.purge(&mut l);
        l.entries.len() + l.teachers.len()
    }

    fn subscription(&self, id: u64) -> Subscription {
        Subscription {
            id,
            hub: Rc::downgrade(&self.inner),
        }
    }
}

/// Live registration; delivery stops when this is dropped, including when it
/// is dropped from inside a callback.
pub struct Subscription {
    id: u64,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        match hub.listeners.try_borrow_mut() {
            Ok(mut l) => {
                l.entries.remove(&self.id);
                l.teachers.remove(&self.id);
            }
            Err(_) => hub.detached.borrow_mut().push(self.id),
        };
    }
}
