//! Backup, restore and reset of the campus admin dataset.
//!
//! The engine walks an [`catalog::EntityCatalog`] in dependency order against
//! any [`store::RecordStore`]. Restore and reset only run behind a
//! [`gate::DestructiveGate`]. The `campusd` binary exposes it over JSON lines.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod ipc;
pub mod logging;
pub mod operators;
pub mod sanitize;
pub mod snapshot;
pub mod store;
