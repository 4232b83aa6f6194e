use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::types::{AppState, Request};
use crate::model::SlotTime;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_CURRICULUM: &str = "cambridge";

#[derive(Clone, Copy)]
enum SetupSection {
    Timetable,
    Grid,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "timetable" => Some(Self::Timetable),
            "grid" => Some(Self::Grid),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Timetable => "setup.timetable",
            Self::Grid => "setup.grid",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Timetable => json!({
            "curriculum": DEFAULT_CURRICULUM,
            "dayStart": "07:30",
            "dayEnd": "15:30",
            "timeStepMinutes": 5
        }),
        SetupSection::Grid => json!({
            "defaultView": "grade",
            "showEmptyRows": false
        }),
    }
}

#[derive(Clone, Debug)]
pub struct TimetableSetup {
    pub curriculum: String,
    pub day_start: SlotTime,
    pub day_end: SlotTime,
    pub time_step_minutes: u32,
}

impl TimetableSetup {
    /// Every selectable start time from `day_start` to `day_end` inclusive.
    pub fn time_options(&self) -> Vec<SlotTime> {
        let step = self.time_step_minutes.max(1);
        (self.day_start.minutes_since_midnight()..=self.day_end.minutes_since_midnight())
            .step_by(step as usize)
            .filter_map(SlotTime::from_minutes)
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct GridSetup {
    pub default_view: String,
    pub show_empty_rows: bool,
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_slot_time(v: &Value, key: &str) -> Result<SlotTime, String> {
    let s = parse_string_max(v, key, 5)?;
    s.parse::<SlotTime>()
        .map_err(|_| format!("{} must be HH:MM", key))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Timetable => match k.as_str() {
                "curriculum" => {
                    let s = parse_string_max(v, k, 64)?.to_ascii_lowercase();
                    if s.is_empty() {
                        return Err("curriculum must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "dayStart" | "dayEnd" => {
                    let t = parse_slot_time(v, k)?;
                    obj.insert(k.clone(), Value::String(t.to_string()));
                }
                "timeStepMinutes" => {
                    let n = parse_i64_range(v, k, 5, 60)?;
                    if n % 5 != 0 {
                        return Err("timeStepMinutes must be a multiple of 5".into());
                    }
                    obj.insert(k.clone(), Value::from(n));
                }
                _ => return Err(format!("unknown timetable field: {}", k)),
            },
            SetupSection::Grid => match k.as_str() {
                "defaultView" => {
                    let s = parse_string_max(v, k, 16)?.to_ascii_lowercase();
                    if s != "grade" && s != "teacher" {
                        return Err("defaultView must be one of: grade, teacher".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "showEmptyRows" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown grid field: {}", k)),
            },
        }
    }

    if let SetupSection::Timetable = section {
        let start = obj.get("dayStart").map(|v| parse_slot_time(v, "dayStart"));
        let end = obj.get("dayEnd").map(|v| parse_slot_time(v, "dayEnd"));
        if let (Some(Ok(start)), Some(Ok(end))) = (start, end) {
            if start >= end {
                return Err("dayStart must be earlier than dayEnd".into());
            }
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed saved value falls back to defaults.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

pub fn load_timetable_setup(conn: &Connection) -> TimetableSetup {
    let obj = load_section(conn, SetupSection::Timetable)
        .unwrap_or_else(|_| default_section(SetupSection::Timetable));
    let time = |key: &str, fallback: (u32, u32)| {
        obj.get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<SlotTime>().ok())
            .or_else(|| SlotTime::from_hm(fallback.0, fallback.1))
    };
    let day_start = time("dayStart", (7, 30));
    let day_end = time("dayEnd", (15, 30));
    TimetableSetup {
        curriculum: obj
            .get("curriculum")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CURRICULUM)
            .to_string(),
        day_start: day_start.unwrap_or_default(),
        day_end: day_end.unwrap_or_default(),
        time_step_minutes: obj
            .get("timeStepMinutes")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(5),
    }
}

pub fn load_grid_setup(conn: &Connection) -> GridSetup {
    let obj = load_section(conn, SetupSection::Grid)
        .unwrap_or_else(|_| default_section(SetupSection::Grid));
    GridSetup {
        default_view: obj
            .get("defaultView")
            .and_then(|v| v.as_str())
            .unwrap_or("grade")
            .to_string(),
        show_empty_rows: obj
            .get("showEmptyRows")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let timetable = match load_section(store.conn(), SetupSection::Timetable) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grid = match load_section(store.conn(), SetupSection::Grid) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "timetable": timetable, "grid": grid }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let conn = store.conn();
    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let curriculum_changed = current
        .get("curriculum")
        .and_then(|v| v.as_str())
        .is_some_and(|c| c != store.curriculum());
    if curriculum_changed {
        // Snapshots are scoped per curriculum; reattach so the feeds follow.
        let Some(path) = state.workspace.clone() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        if let Err(e) = open_workspace(state, &path) {
            return err(&req.id, "db_open_failed", format!("{e:#}"), None);
        }
    }
    ok(&req.id, json!({ "ok": true, "section": section_raw }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
