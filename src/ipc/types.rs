use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub institution: String,
    /// Email of the signed-in operator.
    pub operator: Option<String>,
}

impl AppState {
    pub fn new(institution: impl Into<String>) -> Self {
        Self {
            workspace: None,
            db: None,
            institution: institution.into(),
            operator: None,
        }
    }
}
