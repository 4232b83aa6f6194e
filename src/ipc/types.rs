use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use serde::Deserialize;

use crate::index::SubjectIndex;
use crate::model::TimetableEntry;
use crate::session::SchedulingSession;
use crate::store::SqliteStore;
use crate::sync::Subscription;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Latest snapshots pushed by the store subscriptions.
#[derive(Clone, Default)]
pub struct Feeds {
    pub entries: Rc<RefCell<Vec<TimetableEntry>>>,
    pub index: Rc<RefCell<SubjectIndex>>,
}

impl Feeds {
    /// Owned copy, so no borrow is held while the store notifies.
    pub fn entries(&self) -> Vec<TimetableEntry> {
        self.entries.borrow().clone()
    }

    pub fn index(&self) -> SubjectIndex {
        self.index.borrow().clone()
    }
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub feeds: Feeds,
    pub subscriptions: Vec<Subscription>,
    pub session: SchedulingSession,
}
