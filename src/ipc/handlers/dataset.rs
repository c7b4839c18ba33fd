use crate::backup;
use crate::catalog::institution_catalog;
use crate::db::{self, SqliteStore};
use crate::error::DatasetError;
use crate::gate::{DestructiveGate, ResetConfirmation};
use crate::ipc::error::{dataset_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::operators::OperatorDirectory;
use crate::snapshot;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

struct Session<'s> {
    conn: &'s Connection,
    operator: &'s str,
}

fn require_session<'s>(state: &'s AppState, req: &Request) -> Result<Session<'s>, serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let Some(operator) = state.operator.as_deref() else {
        return Err(err(&req.id, "not_signed_in", "sign in first", None));
    };
    Ok(Session { conn, operator })
}

fn param_str<'r>(req: &'r Request, key: &str) -> Option<&'r str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn read_snapshot_input(req: &Request) -> Result<(String, String), serde_json::Value> {
    let Some(in_path) = param_str(req, "inPath") else {
        return Err(dataset_err(&req.id, &DatasetError::NoInputProvided));
    };
    match std::fs::read_to_string(in_path) {
        Ok(text) => Ok((in_path.to_string(), text)),
        Err(e) => Err(err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": in_path })),
        )),
    }
}

fn handle_dataset_catalog(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let collections: Vec<serde_json::Value> = institution_catalog()
        .order()
        .map(|d| {
            json!({
                "name": d.name,
                "key": d.key,
                "dependsOn": d.depends_on
            })
        })
        .collect();
    ok(&req.id, json!({ "collections": collections }))
}

fn handle_dataset_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match db::collection_counts(conn, institution_catalog()) {
        Ok(counts) => {
            let counts: serde_json::Map<String, serde_json::Value> = counts
                .into_iter()
                .map(|(name, n)| (name, json!(n)))
                .collect();
            ok(&req.id, json!({ "counts": counts }))
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_dataset_backup(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let out_path = match param_str(req, "outPath") {
        Some(p) => PathBuf::from(p),
        None => {
            let dir = param_str(req, "outDir")
                .map(PathBuf::from)
                .or_else(|| state.workspace.as_ref().map(|w| w.join("backups")));
            let Some(dir) = dir else {
                return err(&req.id, "bad_params", "missing outPath", None);
            };
            let today = chrono::Local::now().date_naive();
            dir.join(snapshot::snapshot_file_name(&state.institution, today))
        }
    };

    let catalog = institution_catalog();
    let store = SqliteStore::new(session.conn, catalog);
    let output = backup::backup(&store, catalog);

    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path.to_string_lossy() })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out_path, output.document.as_bytes()) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path.to_string_lossy() })),
        );
    }

    let mut result = output.report.to_json();
    result["path"] = json!(out_path.to_string_lossy());
    result["fileName"] = json!(out_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string()));
    ok(&req.id, result)
}

fn handle_dataset_preview_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let (in_path, text) = match read_snapshot_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let collections = match snapshot::decode(&text) {
        Ok(c) => c,
        Err(e) => return dataset_err(&req.id, &e),
    };

    let catalog = institution_catalog();
    let restore_order: Vec<serde_json::Value> = catalog
        .order()
        .map(|d| {
            json!({
                "collection": d.name,
                "records": collections.get(&d.name).map(|r| r.len()).unwrap_or(0)
            })
        })
        .collect();
    let ignored: Vec<&str> = collections
        .names()
        .filter(|n| !catalog.contains(n))
        .collect();
    ok(
        &req.id,
        json!({
            "path": in_path,
            "recordsTotal": collections.record_count(),
            "restoreOrder": restore_order,
            "ignored": ignored
        }),
    )
}

fn handle_dataset_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let (_, text) = match read_snapshot_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let directory = OperatorDirectory::new(session.conn);
    let auth = match DestructiveGate::new(&directory).authorize(session.operator, password) {
        Ok(a) => a,
        Err(e) => return dataset_err(&req.id, &e),
    };

    let catalog = institution_catalog();
    let store = SqliteStore::new(session.conn, catalog);
    match backup::restore(&auth, &store, catalog, &text) {
        Ok(report) => ok(&req.id, report.to_json()),
        Err(e) => dataset_err(&req.id, &e),
    }
}

fn handle_dataset_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let confirm = req
        .params
        .get("confirm")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let confirmation = match ResetConfirmation::parse(confirm) {
        Ok(c) => c,
        Err(e) => return dataset_err(&req.id, &e),
    };
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let directory = OperatorDirectory::new(session.conn);
    let auth = match DestructiveGate::new(&directory).authorize(session.operator, password) {
        Ok(a) => a,
        Err(e) => return dataset_err(&req.id, &e),
    };

    let catalog = institution_catalog();
    let store = SqliteStore::new(session.conn, catalog);
    let report = backup::reset(&auth, confirmation, &store, catalog);
    ok(&req.id, report.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dataset.catalog" => Some(handle_dataset_catalog(state, req)),
        "dataset.counts" => Some(handle_dataset_counts(state, req)),
        "dataset.backup" => Some(handle_dataset_backup(state, req)),
        "dataset.previewSnapshot" => Some(handle_dataset_preview_snapshot(state, req)),
        "dataset.restore" => Some(handle_dataset_restore(state, req)),
        "dataset.reset" => Some(handle_dataset_reset(state, req)),
        _ => None,
    }
}
