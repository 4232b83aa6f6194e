use crate::ipc::error::{err, ok};
use crate::ipc::helpers::schedule_err;
use crate::ipc::types::{AppState, Request};
use crate::model::{Day, Field, Grade, SlotTime};
use crate::session::SchedulingSession;
use serde_json::{json, Value};

fn session_json(session: &SchedulingSession) -> Value {
    json!({
        "state": session.state(),
        "selection": session.selection(),
        "lastOutcome": session.last_outcome(),
    })
}

fn parse_field(req: &Request) -> Result<Field, Value> {
    let raw = req
        .params
        .get("field")
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", "missing field", None))?;
    raw.parse::<Field>()
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, session_json(&state.session))
}

/// Sets one field; an empty value clears it.
fn handle_set(state: &mut AppState, req: &Request) -> Value {
    let field = match parse_field(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let value = match req.params.get("value") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return err(&req.id, "bad_params", "value must be string or null", None),
    };
    if value.is_empty() {
        state.session.clear(field);
        return ok(&req.id, session_json(&state.session));
    }

    let bad = |msg: String| err(&req.id, "bad_params", msg, Some(json!({ "field": field })));
    let session = &mut state.session;
    match field {
        Field::Day => match value.parse::<Day>() {
            Ok(d) => session.set_day(d),
            Err(e) => return bad(e.to_string()),
        },
        Field::Time => match value.parse::<SlotTime>() {
            Ok(t) => session.set_time(t),
            Err(e) => return bad(e.to_string()),
        },
        Field::Grade => match value.parse::<Grade>() {
            Ok(g) => session.set_grade(g),
            Err(e) => return bad(e.to_string()),
        },
        Field::Subject => session.set_subject(&value),
        Field::TeacherId => session.set_teacher(&value),
    }
    ok(&req.id, session_json(&state.session))
}

fn handle_clear(state: &mut AppState, req: &Request) -> Value {
    let field = match parse_field(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    state.session.clear(field);
    ok(&req.id, session_json(&state.session))
}

fn handle_reset(state: &mut AppState, req: &Request) -> Value {
    state.session.reset();
    ok(&req.id, session_json(&state.session))
}

fn handle_submit(state: &mut AppState, req: &Request) -> Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let entries = state.feeds.entries();
    let index = state.feeds.index();
    let curriculum = store.curriculum().to_string();
    match state.session.submit(&entries, &index, store, &curriculum) {
        Ok(id) => {
            let mut body = session_json(&state.session);
            body["entryId"] = json!(id);
            ok(&req.id, body)
        }
        Err(e) => schedule_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "session.get" => Some(handle_get(state, req)),
        "session.set" => Some(handle_set(state, req)),
        "session.clear" => Some(handle_clear(state, req)),
        "session.reset" => Some(handle_reset(state, req)),
        "session.submit" => Some(handle_submit(state, req)),
        _ => None,
    }
}
