use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, store, string_list};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let include_pending = req
        .params
        .get("includePending")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    match store.teacher_records(include_pending) {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Entry point for the application-approval workflow.
fn handle_teachers_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let teacher_id = match optional_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = match string_list(req, "subjects") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let approved = match req.params.get("approved") {
        None => true,
        Some(v) => match v.as_bool() {
            Some(b) => b,
            None => return err(&req.id, "bad_params", "approved must be boolean", None),
        },
    };

    match store.upsert_teacher(teacher_id.as_deref(), &name, &subjects, approved) {
        Ok(id) => ok(&req.id, json!({ "teacherId": id, "approved": approved })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        ),
    }
}

fn handle_teachers_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store.remove_teacher(&teacher_id) {
        Ok(true) => ok(&req.id, json!({ "teacherId": teacher_id })),
        Ok(false) => err(&req.id, "not_found", "teacher not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_teachers_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = state.feeds.index.borrow();
    ok(
        &req.id,
        json!({
            "teacherId": teacher_id,
            "subjects": index.subjects_for(&teacher_id),
        }),
    )
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let index = state.feeds.index.borrow();
    ok(&req.id, json!({ "subjects": index.subjects_offered() }))
}

fn handle_subjects_teachers(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = state.feeds.index.borrow();
    ok(
        &req.id,
        json!({
            "subject": subject,
            "teachers": index.teachers_for(&subject),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.upsert" => Some(handle_teachers_upsert(state, req)),
        "teachers.remove" => Some(handle_teachers_remove(state, req)),
        "teachers.subjects" => Some(handle_teachers_subjects(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.teachers" => Some(handle_subjects_teachers(state, req)),
        _ => None,
    }
}
