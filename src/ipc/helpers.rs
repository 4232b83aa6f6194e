use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{Candidate, Field};
use crate::session::ScheduleError;
use crate::store::SqliteStore;
use serde_json::Value;
use std::str::FromStr;

pub fn store<'a>(state: &'a AppState, req: &Request) -> Result<&'a SqliteStore, Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent, null and blank all read as None; a non-string is an error.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be string or null", key),
            None,
        )),
    }
}

pub fn optional_parsed<T>(req: &Request, key: &str) -> Result<Option<T>, Value>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_str(req, key)? {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", e.to_string(), Some(serde_json::json!({ "field": key })))),
    }
}

/// Reads the five entry fields from params. Missing fields stay None so that
/// the conflict checks can report them.
pub fn candidate_from_params(req: &Request) -> Result<Candidate, Value> {
    Ok(Candidate {
        day: optional_parsed(req, Field::Day.as_str())?,
        time: optional_parsed(req, Field::Time.as_str())?,
        grade: optional_parsed(req, Field::Grade.as_str())?,
        subject: optional_str(req, Field::Subject.as_str())?,
        teacher_id: optional_str(req, Field::TeacherId.as_str())?,
    })
}

pub fn schedule_err(req: &Request, e: &ScheduleError) -> Value {
    err(&req.id, e.code(), e.to_string(), Some(e.details()))
}

pub fn string_list(req: &Request, key: &str) -> Result<Vec<String>, Value> {
    let Some(v) = req.params.get(key) else {
        return Ok(Vec::new());
    };
    let Some(arr) = v.as_array() else {
        return Err(err(&req.id, "bad_params", format!("{} must be an array", key), None));
    };
    arr.iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must contain only strings", key),
                    None,
                )
            })
        })
        .collect()
}
