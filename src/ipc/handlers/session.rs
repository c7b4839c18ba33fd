use crate::gate::CredentialVerifier;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::operators::{normalize_email, OperatorDirectory};
use serde_json::json;
use tracing::{info, warn};

fn get_required_str<'r>(req: &'r Request, key: &str) -> Result<&'r str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_operators_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let email = match get_required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match get_required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let directory = OperatorDirectory::new(conn);
    let existing = match directory.count_operators() {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    // The first operator bootstraps the workspace; after that only a
    // signed-in operator may add more.
    if existing > 0 && state.operator.is_none() {
        return err(&req.id, "not_signed_in", "sign in to add operators", None);
    }

    match directory.create_operator(email, password) {
        Ok(email) => {
            info!(operator = %email, "operator created");
            ok(&req.id, json!({ "email": email, "bootstrap": existing == 0 }))
        }
        Err(e) => err(&req.id, "bad_params", format!("{e:#}"), None),
    }
}

fn handle_session_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let email = match get_required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match get_required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match OperatorDirectory::new(conn).verify_credential(email, password) {
        Ok(true) => {
            let email = normalize_email(email);
            info!(operator = %email, "signed in");
            state.operator = Some(email.clone());
            ok(&req.id, json!({ "operator": email }))
        }
        Ok(false) => {
            warn!("sign-in rejected");
            err(&req.id, "access_denied", "credential incorrect", None)
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_session_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was = state.operator.take();
    ok(&req.id, json!({ "signedOut": was.is_some() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "operators.create" => Some(handle_operators_create(state, req)),
        "session.signIn" => Some(handle_session_sign_in(state, req)),
        "session.signOut" => Some(handle_session_sign_out(state, req)),
        _ => None,
    }
}
