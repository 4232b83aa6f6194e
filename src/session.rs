//! In-progress slot selection for one scheduler.
//!
//! `Empty -> Partial -> Complete -> Submitting -> {Committed | Rejected}`.
//! A commit keeps day, time and grade so several subjects can be entered for
//! the same slot in a row; a rejection keeps every field for correction.

use crate::conflict::{self, Rejection};
use crate::index::SubjectIndex;
use crate::model::{Candidate, Day, EntryId, Field, Grade, SlotTime, TimetableEntry};
use crate::sync::{PersistenceError, TimetableStore};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Empty,
    Partial,
    Complete,
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Committed {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
    },
    Rejected {
        code: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::Rejected(r) => r.code(),
            ScheduleError::Persistence(p) => p.code(),
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            ScheduleError::Rejected(r) => r.details(),
            ScheduleError::Persistence(p) => p.details(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedulingSession {
    selection: Candidate,
    submitting: bool,
    last_outcome: Option<Outcome>,
}

impl SchedulingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.submitting {
            SessionState::Submitting
        } else if self.selection.is_complete() {
            SessionState::Complete
        } else if self.selection == Candidate::default() {
            SessionState::Empty
        } else {
            SessionState::Partial
        }
    }

    pub fn selection(&self) -> &Candidate {
        &self.selection
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn set_day(&mut self, day: Day) {
        self.selection.day = Some(day);
    }

    pub fn set_time(&mut self, time: SlotTime) {
        self.selection.time = Some(time);
    }

    pub fn set_grade(&mut self, grade: Grade) {
        self.selection.grade = Some(grade);
    }

    /// Changing the subject drops the chosen teacher, whose eligibility was
    /// tied to the previous subject.
    pub fn set_subject(&mut self, subject: &str) {
        let subject = non_blank(subject);
        if self.selection.subject != subject {
            self.selection.teacher_id = None;
        }
        self.selection.subject = subject;
    }

    pub fn set_teacher(&mut self, teacher_id: &str) {
        self.selection.teacher_id = non_blank(teacher_id);
    }

    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Day => self.selection.day = None,
            Field::Time => self.selection.time = None,
            Field::Grade => self.selection.grade = None,
            Field::Subject => {
                self.selection.subject = None;
                self.selection.teacher_id = None;
            }
            Field::TeacherId => self.selection.teacher_id = None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Validates the selection against `entries` and persists it through `store`.
    ///
    /// Every call revalidates from scratch; nothing is retried.
    pub fn submit<S: TimetableStore + ?Sized>(
        &mut self,
        entries: &[TimetableEntry],
        index: &SubjectIndex,
        store: &S,
        curriculum: &str,
    ) -> Result<EntryId, ScheduleError> {
        self.submitting = true;
        let result = conflict::validate_assignment(&self.selection, entries, index)
            .map_err(ScheduleError::from)
            .and_then(|slot| {
                store
                    .create_entry(&slot.into_draft(curriculum))
                    .map_err(ScheduleError::from)
            });
        self.submitting = false;

        match &result {
            Ok(id) => {
                tracing::info!(entry_id = %id, "session committed");
                self.selection.subject = None;
                self.selection.teacher_id = None;
                self.last_outcome = Some(Outcome::Committed {
                    entry_id: id.clone(),
                });
            }
            Err(e) => {
                tracing::info!(code = e.code(), reason = %e, "session submit rejected");
                self.last_outcome = Some(Outcome::Rejected {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
        result
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Teacher, TimetableEntryDraft};
    use crate::sync::{EntriesCallback, Hub, Subscription, TeachersCallback};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};

    /// In-memory store for exercising the session without SQLite.
    #[derive(Default)]
    struct MemoryStore {
        entries: RefCell<Vec<TimetableEntry>>,
        fail_writes: Cell<bool>,
        hub: Hub,
    }

    impl TimetableStore for MemoryStore {
        fn subscribe_entries(&self, on_change: EntriesCallback) -> Result<Subscription, PersistenceError> {
            let sub = self.hub.add_entries(on_change);
            self.hub.notify_entries(&self.entries.borrow(), Some(&sub));
            Ok(sub)
        }

        fn subscribe_teachers(&self, on_change: TeachersCallback) -> Result<Subscription, PersistenceError> {
            let sub = self.hub.add_teachers(on_change);
            self.hub.notify_teachers(&[], Some(&sub));
            Ok(sub)
        }

        fn create_entry(&self, draft: &TimetableEntryDraft) -> Result<EntryId, PersistenceError> {
            if self.fail_writes.get() {
                return Err(PersistenceError::Backend("offline".into()));
            }
            let id = EntryId(format!("e{}", self.entries.borrow().len() + 1));
            self.entries
                .borrow_mut()
                .push(draft.clone().into_entry(id.clone()));
            self.hub.notify_entries(&self.entries.borrow(), None);
            Ok(id)
        }

        fn delete_entry(&self, id: &EntryId) -> Result<(), PersistenceError> {
            let mut entries = self.entries.borrow_mut();
            let before = entries.len();
            entries.retain(|e| &e.id != id);
            if entries.len() == before {
                return Err(PersistenceError::NotFound(id.clone()));
            }
            Ok(())
        }
    }

    fn index() -> SubjectIndex {
        SubjectIndex::build(&[
            Teacher {
                id: "A".into(),
                name: "Amal".into(),
                subjects: vec!["English".into(), "Science".into()],
            },
            Teacher {
                id: "B".into(),
                name: "Basel".into(),
                subjects: vec!["Math".into()],
            },
        ])
    }

    fn fill(s: &mut SchedulingSession, grade: Grade, subject: &str, teacher: &str) {
        s.set_day(Day::Tuesday);
        s.set_time("10:00".parse().unwrap());
        s.set_grade(grade);
        s.set_subject(subject);
        s.set_teacher(teacher);
    }

    fn submit(s: &mut SchedulingSession, store: &MemoryStore) -> Result<EntryId, ScheduleError> {
        let snapshot = store.entries.borrow().clone();
        s.submit(&snapshot, &index(), store, "cambridge")
    }

    #[test]
    fn states_follow_field_coverage() {
        let mut s = SchedulingSession::new();
        assert_eq!(s.state(), SessionState::Empty);
        s.set_day(Day::Monday);
        assert_eq!(s.state(), SessionState::Partial);
        fill(&mut s, Grade::Stage1, "English", "A");
        assert_eq!(s.state(), SessionState::Complete);
        s.set_grade(Grade::Stage2);
        assert_eq!(s.state(), SessionState::Complete);
        s.clear(Field::Time);
        assert_eq!(s.state(), SessionState::Partial);
        s.reset();
        assert_eq!(s.state(), SessionState::Empty);
    }

    #[test]
    fn changing_subject_clears_teacher() {
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage1, "English", "A");
        s.set_subject("English");
        assert_eq!(s.selection().teacher_id.as_deref(), Some("A"));
        s.set_subject("Math");
        assert_eq!(s.selection().teacher_id, None);
        assert_eq!(s.state(), SessionState::Partial);
    }

    #[test]
    fn commit_keeps_slot_and_clears_subject_and_teacher() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage1, "English", "A");
        let id = submit(&mut s, &store).expect("committed");

        let sel = s.selection();
        assert_eq!(sel.day, Some(Day::Tuesday));
        assert_eq!(sel.grade, Some(Grade::Stage1));
        assert!(sel.time.is_some());
        assert_eq!(sel.subject, None);
        assert_eq!(sel.teacher_id, None);
        assert_eq!(s.state(), SessionState::Partial);
        assert_eq!(s.last_outcome(), Some(&Outcome::Committed { entry_id: id }));
    }

    #[test]
    fn rejection_retains_every_field() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage1, "English", "A");
        submit(&mut s, &store).unwrap();

        fill(&mut s, Grade::Stage1, "English", "A");
        let before = s.selection().clone();
        let err = submit(&mut s, &store).unwrap_err();
        assert_eq!(err.code(), "slot_already_scheduled");
        assert_eq!(s.selection(), &before);
        assert_eq!(s.state(), SessionState::Complete);
        assert!(matches!(s.last_outcome(), Some(Outcome::Rejected { code, .. }) if code == "slot_already_scheduled"));
    }

    #[test]
    fn canonical_scenario_through_the_session() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();

        fill(&mut s, Grade::Stage1, "English", "A");
        assert!(submit(&mut s, &store).is_ok());

        fill(&mut s, Grade::Stage1, "English", "A");
        assert_eq!(submit(&mut s, &store).unwrap_err().code(), "slot_already_scheduled");

        fill(&mut s, Grade::Stage4, "Science", "A");
        assert_eq!(submit(&mut s, &store).unwrap_err().code(), "teacher_double_booked");
        assert_eq!(store.entries.borrow().len(), 1);
    }

    #[test]
    fn ineligible_teacher_is_rejected() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage3, "Math", "A");
        assert_eq!(submit(&mut s, &store).unwrap_err().code(), "teacher_not_eligible");
    }

    #[test]
    fn store_failure_is_distinct_from_rule_rejection() {
        let store = MemoryStore::default();
        store.fail_writes.set(true);
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage2, "Math", "B");
        let err = submit(&mut s, &store).unwrap_err();
        assert!(matches!(err, ScheduleError::Persistence(_)));
        assert_eq!(err.code(), "persistence_failed");
        assert_eq!(s.state(), SessionState::Complete);

        store.fail_writes.set(false);
        assert!(submit(&mut s, &store).is_ok());
    }

    #[test]
    fn incomplete_submit_reports_missing_fields() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();
        s.set_day(Day::Monday);
        let err = submit(&mut s, &store).unwrap_err();
        assert_eq!(err.code(), "incomplete_selection");
        assert_eq!(err.details()["missing"][0], "time");
        assert_eq!(s.state(), SessionState::Partial);
    }

    #[test]
    fn memory_store_delete_is_strict() {
        let store = MemoryStore::default();
        let mut s = SchedulingSession::new();
        fill(&mut s, Grade::Stage2, "Math", "B");
        let id = submit(&mut s, &store).unwrap();
        store.delete_entry(&id).unwrap();
        assert!(store.delete_entry(&id).is_err());
    }
}
