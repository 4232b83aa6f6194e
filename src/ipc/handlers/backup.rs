use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{optional_parsed, store};
use crate::ipc::types::{AppState, Request};
use crate::model::Grade;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };
    tracing::info!(
        path = %out_path,
        sha256 = %export.db_sha256,
        entries = export.workspace.entry_count,
        "workspace bundle exported"
    );

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "fileCount": export.file_count,
            "dbSha256": export.db_sha256,
            "workspace": export.workspace
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Verified while the current store stays attached; a refused file leaves
    // the workspace as it was.
    let staged = match backup::stage_import(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %in_path, error = %format!("{e:#}"), "bundle refused");
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            );
        }
    };
    tracing::info!(
        path = %in_path,
        format = staged.bundle_format_detected(),
        entries = staged.workspace().entry_count,
        "bundle staged"
    );

    let previous = state.workspace.clone();
    for sub in state.subscriptions.drain(..) {
        sub.unsubscribe();
    }
    state.store = None;

    let import = match staged.commit() {
        Ok(v) => v,
        Err(e) => {
            if let Some(prev) = previous {
                if let Err(reopen) = open_workspace(state, &prev) {
                    tracing::error!(error = %format!("{reopen:#}"), "previous workspace did not reopen");
                }
            }
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            );
        }
    };

    match open_workspace(state, &workspace_path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "ok": true,
                "workspacePath": workspace_path.to_string_lossy(),
                "bundleFormatDetected": import.bundle_format_detected,
                "workspace": import.workspace
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_exchange_export_timetable_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = store(state, req) {
        return e;
    }
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let grade: Option<Grade> = match optional_parsed(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let entries = state.feeds.entries.borrow();
    let index = state.feeds.index.borrow();
    let mut text = String::from("day,time,grade,subject,teacher_id,teacher_name\n");
    let mut rows = 0usize;
    for e in entries.iter().filter(|e| grade.map_or(true, |g| e.grade == g)) {
        let teacher_name = index
            .teacher(&e.teacher_id)
            .map(|t| t.name.as_str())
            .unwrap_or("");
        text.push_str(&format!(
            "{},{},{},{},{},{}\n",
            e.day,
            e.time,
            csv_quote(e.grade.label()),
            csv_quote(&e.subject),
            csv_quote(&e.teacher_id),
            csv_quote(teacher_name)
        ));
        rows += 1;
    }

    let write = std::fs::File::create(&out_path).and_then(|mut f| f.write_all(text.as_bytes()));
    if let Err(e) = write {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }
    ok(&req.id, json!({ "ok": true, "path": out_path, "rowsExported": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        "exchange.exportTimetableCsv" => Some(handle_exchange_export_timetable_csv(state, req)),
        _ => None,
    }
}
