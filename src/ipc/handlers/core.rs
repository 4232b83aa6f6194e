use crate::db;
use crate::index::SubjectIndex;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Feeds, Request};
use crate::session::SchedulingSession;
use crate::store::SqliteStore;
use crate::sync::TimetableStore;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "curriculum": state.store.as_ref().map(|s| s.curriculum().to_string()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "curriculum": state.store.as_ref().map(|s| s.curriculum().to_string()),
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

/// Opens the workspace database and wires both store feeds into `state`.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let curriculum = setup::load_timetable_setup(&conn).curriculum;

    for sub in state.subscriptions.drain(..) {
        sub.unsubscribe();
    }
    state.store = None;

    let store = SqliteStore::new(conn, curriculum);
    let feeds = Feeds::default();

    let entries = feeds.entries.clone();
    let entries_sub = store.subscribe_entries(Box::new(move |snapshot| {
        *entries.borrow_mut() = snapshot.to_vec();
    }))?;
    let index = feeds.index.clone();
    let teachers_sub = store.subscribe_teachers(Box::new(move |snapshot| {
        *index.borrow_mut() = SubjectIndex::build(snapshot);
    }))?;

    tracing::info!(
        workspace = %path.to_string_lossy(),
        curriculum = store.curriculum(),
        entries = feeds.entries.borrow().len(),
        "workspace opened"
    );

    state.feeds = feeds;
    state.subscriptions = vec![entries_sub, teachers_sub];
    state.store = Some(store);
    state.workspace = Some(path.to_path_buf());
    state.session = SchedulingSession::new();
    Ok(())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
