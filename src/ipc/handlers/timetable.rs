use crate::conflict;
use crate::index::SubjectIndex;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_grid_setup, load_timetable_setup};
use crate::ipc::helpers::{
    candidate_from_params, optional_parsed, optional_str, required_str, schedule_err, store,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Day, EntryId, Grade, SlotTime, TimetableEntry};
use crate::session::ScheduleError;
use crate::sync::TimetableStore;
use serde_json::{json, Value};
use std::collections::BTreeSet;

fn entry_json(entry: &TimetableEntry, index: &SubjectIndex) -> Value {
    let mut v = serde_json::to_value(entry).unwrap_or_default();
    v["teacherName"] = index
        .teacher(&entry.teacher_id)
        .map(|t| Value::String(t.name.clone()))
        .unwrap_or(Value::Null);
    v
}

fn handle_options(state: &mut AppState, req: &Request) -> Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let setup = load_timetable_setup(store.conn());
    let index = state.feeds.index.borrow();
    ok(
        &req.id,
        json!({
            "curriculum": store.curriculum(),
            "days": Day::ALL,
            "grades": Grade::ALL,
            "times": setup.time_options(),
            "subjects": index.subjects_offered(),
        }),
    )
}

struct ListFilter {
    day: Option<Day>,
    grade: Option<Grade>,
    teacher_id: Option<String>,
    subject: Option<String>,
}

impl ListFilter {
    fn from_params(req: &Request) -> Result<Self, Value> {
        Ok(Self {
            day: optional_parsed(req, "day")?,
            grade: optional_parsed(req, "grade")?,
            teacher_id: optional_str(req, "teacherId")?,
            subject: optional_str(req, "subject")?,
        })
    }

    fn matches(&self, e: &TimetableEntry) -> bool {
        self.day.map_or(true, |d| e.day == d)
            && self.grade.map_or(true, |g| e.grade == g)
            && self.teacher_id.as_deref().map_or(true, |t| e.teacher_id == t)
            && self.subject.as_deref().map_or(true, |s| e.subject == s)
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let filter = match ListFilter::from_params(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let entries = state.feeds.entries.borrow();
    let index = state.feeds.index.borrow();
    let rows: Vec<Value> = entries
        .iter()
        .filter(|e| filter.matches(e))
        .map(|e| entry_json(e, &index))
        .collect();
    ok(&req.id, json!({ "entries": rows }))
}

/// Times down, days across; each cell lists the entries at that day and time.
fn handle_grid(state: &mut AppState, req: &Request) -> Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let grid_setup = load_grid_setup(store.conn());
    let grade: Option<Grade> = match optional_parsed(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match optional_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let show_empty_rows = req
        .params
        .get("showEmptyRows")
        .and_then(|v| v.as_bool())
        .unwrap_or(grid_setup.show_empty_rows);

    let (view, filter) = match (grade, teacher_id) {
        (Some(g), None) => (
            "grade",
            ListFilter {
                day: None,
                grade: Some(g),
                teacher_id: None,
                subject: None,
            },
        ),
        (None, Some(t)) => (
            "teacher",
            ListFilter {
                day: None,
                grade: None,
                teacher_id: Some(t),
                subject: None,
            },
        ),
        (Some(_), Some(_)) => {
            return err(&req.id, "bad_params", "pass either grade or teacherId, not both", None)
        }
        (None, None) => {
            let missing = if grid_setup.default_view == "teacher" { "teacherId" } else { "grade" };
            return err(&req.id, "bad_params", format!("missing {}", missing), None);
        }
    };

    let entries = state.feeds.entries.borrow();
    let index = state.feeds.index.borrow();
    let selected: Vec<&TimetableEntry> = entries.iter().filter(|e| filter.matches(e)).collect();

    let mut times: BTreeSet<SlotTime> = selected.iter().map(|e| e.time).collect();
    if show_empty_rows {
        times.extend(load_timetable_setup(store.conn()).time_options());
    }

    let rows: Vec<Value> = times
        .into_iter()
        .map(|time| {
            let cells: Vec<Value> = Day::ALL
                .into_iter()
                .map(|day| {
                    let here: Vec<Value> = selected
                        .iter()
                        .filter(|e| e.day == day && e.time == time)
                        .map(|e| entry_json(e, &index))
                        .collect();
                    json!({ "day": day, "entries": here })
                })
                .collect();
            json!({ "time": time, "cells": cells })
        })
        .collect();

    ok(
        &req.id,
        json!({ "view": view, "days": Day::ALL, "rows": rows }),
    )
}

fn handle_validate(state: &mut AppState, req: &Request) -> Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let candidate = match candidate_from_params(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let entries = state.feeds.entries.borrow();
    let index = state.feeds.index.borrow();
    match conflict::validate_assignment(&candidate, &entries, &index) {
        Ok(slot) => ok(
            &req.id,
            json!({
                "accepted": true,
                "day": slot.day,
                "time": slot.time,
                "grade": slot.grade,
                "subject": slot.subject,
                "teacherId": slot.teacher_id,
            }),
        ),
        Err(r) => schedule_err(req, &ScheduleError::Rejected(r)),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let candidate = match candidate_from_params(req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let entries = state.feeds.entries();
    let index = state.feeds.index();
    let slot = match conflict::validate_assignment(&candidate, &entries, &index) {
        Ok(s) => s,
        Err(r) => {
            tracing::info!(code = r.code(), reason = %r, "timetable.create rejected");
            return schedule_err(req, &ScheduleError::Rejected(r));
        }
    };
    let draft = slot.into_draft(store.curriculum());
    match store.create_entry(&draft) {
        Ok(id) => {
            let entry = draft.into_entry(id.clone());
            ok(
                &req.id,
                json!({ "entryId": id, "entry": entry_json(&entry, &index) }),
            )
        }
        Err(p) => schedule_err(req, &ScheduleError::Persistence(p)),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let entry_id = match required_str(req, "entryId") {
        Ok(v) => EntryId(v),
        Err(e) => return e,
    };
    match store.delete_entry(&entry_id) {
        Ok(()) => ok(&req.id, json!({ "entryId": entry_id })),
        Err(p) => schedule_err(req, &ScheduleError::Persistence(p)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "timetable.options" => Some(handle_options(state, req)),
        "timetable.list" => Some(handle_list(state, req)),
        "timetable.grid" => Some(handle_grid(state, req)),
        "timetable.validate" => Some(handle_validate(state, req)),
        "timetable.create" => Some(handle_create(state, req)),
        "timetable.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
