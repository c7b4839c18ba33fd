use crate::catalog::EntityCatalog;
use crate::error::DatasetError;
use crate::gate::{Authorization, ResetConfirmation};
use crate::sanitize::sanitize;
use crate::snapshot::{self, Collections};
use crate::store::{Filter, Record, RecordStore};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Backup,
    Restore,
    Reset,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    Done { records: usize },
    Skipped,
    Failed(DatasetError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub collection: String,
    pub status: CollectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialSuccess,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial-success",
        }
    }
}

/// Per-collection results of one executor pass, in the order attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub action: Action,
    pub outcomes: Vec<CollectionOutcome>,
    /// Snapshot keys that are not catalog collections; never written.
    pub ignored: Vec<String>,
}

impl OperationReport {
    fn new(action: Action) -> Self {
        Self {
            action,
            outcomes: Vec::new(),
            ignored: Vec::new(),
        }
    }

    fn push(&mut self, collection: &str, status: CollectionStatus) {
        self.outcomes.push(CollectionOutcome {
            collection: collection.to_string(),
            status,
        });
    }

    pub fn status(&self) -> RunStatus {
        if self.failures().next().is_some() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &DatasetError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            CollectionStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn outcome(&self, collection: &str) -> Option<&CollectionStatus> {
        self.outcomes
            .iter()
            .find(|o| o.collection == collection)
            .map(|o| &o.status)
    }

    pub fn records_total(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                CollectionStatus::Done { records } => records,
                _ => 0,
            })
            .sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let outcomes: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|o| match &o.status {
                CollectionStatus::Done { records } => json!({
                    "collection": o.collection,
                    "status": "done",
                    "records": records
                }),
                CollectionStatus::Skipped => json!({
                    "collection": o.collection,
                    "status": "skipped"
                }),
                CollectionStatus::Failed(e) => json!({
                    "collection": o.collection,
                    "status": "failed",
                    "message": e.to_string()
                }),
            })
            .collect();
        let failures: Vec<String> = self.failures().map(|e| e.to_string()).collect();
        json!({
            "action": self.action.as_str(),
            "status": self.status().as_str(),
            "recordsTotal": self.records_total(),
            "outcomes": outcomes,
            "failures": failures,
            "ignored": self.ignored
        })
    }
}

#[derive(Debug, Clone)]
pub struct BackupOutput {
    pub document: String,
    pub collections: Collections,
    pub report: OperationReport,
}

/// Reads every collection in catalog order. Unreadable collections are left
/// out of the document and listed as failures.
pub fn backup<S: RecordStore + ?Sized>(store: &S, catalog: &EntityCatalog) -> BackupOutput {
    let mut report = OperationReport::new(Action::Backup);
    let mut collections = Collections::new();

    for def in catalog.order() {
        match store.select(&def.name, &[]) {
            Ok(records) => {
                info!(collection = %def.name, records = records.len(), "collection exported");
                report.push(&def.name, CollectionStatus::Done { records: records.len() });
                collections.insert(&def.name, records);
            }
            Err(e) => {
                let failure = DatasetError::collection_failed(&def.name, &e);
                warn!(error = %failure, "collection export failed");
                report.push(&def.name, CollectionStatus::Failed(failure));
            }
        }
    }

    BackupOutput {
        document: snapshot::encode(&collections),
        collections,
        report,
    }
}

/// Upserts every snapshot collection in forward catalog order.
///
/// Nothing is written unless the document decodes. After that a failing
/// collection is recorded and the next one is still attempted.
pub fn restore<S: RecordStore + ?Sized>(
    auth: &Authorization,
    store: &S,
    catalog: &EntityCatalog,
    document: &str,
) -> Result<OperationReport, DatasetError> {
    if document.trim().is_empty() {
        return Err(DatasetError::NoInputProvided);
    }
    let collections = snapshot::decode(document)?;
    let mut report = OperationReport::new(Action::Restore);

    for name in collections.names() {
        if !catalog.contains(name) {
            warn!(collection = name, "snapshot collection is not in the catalog; ignored");
            report.ignored.push(name.to_string());
        }
    }

    info!(operator = auth.operator(), collections = collections.len(), "restore started");
    for def in catalog.order() {
        let records = match collections.get(&def.name) {
            Some(records) if !records.is_empty() => records,
            _ => {
                report.push(&def.name, CollectionStatus::Skipped);
                continue;
            }
        };
        let batch: Vec<Record> = records.iter().map(sanitize).collect();
        match store.upsert(&def.name, &def.key, &batch) {
            Ok(written) => {
                info!(collection = %def.name, records = written, "collection restored");
                report.push(&def.name, CollectionStatus::Done { records: written });
            }
            Err(e) => {
                let failure = DatasetError::collection_failed(&def.name, &e);
                warn!(error = %failure, "collection restore failed");
                report.push(&def.name, CollectionStatus::Failed(failure));
            }
        }
    }
    info!(status = report.status().as_str(), "restore finished");
    Ok(report)
}

/// Deletes every record of every collection, children first.
pub fn reset<S: RecordStore + ?Sized>(
    auth: &Authorization,
    _confirmed: ResetConfirmation,
    store: &S,
    catalog: &EntityCatalog,
) -> OperationReport {
    let mut report = OperationReport::new(Action::Reset);
    warn!(operator = auth.operator(), "reset started");

    for def in catalog.reverse_order() {
        match store.delete(&def.name, &[Filter::not_null(&def.key)]) {
            Ok(removed) => {
                info!(collection = %def.name, records = removed, "collection cleared");
                report.push(&def.name, CollectionStatus::Done { records: removed });
            }
            Err(e) => {
                let failure = DatasetError::collection_failed(&def.name, &e);
                warn!(error = %failure, "collection reset failed");
                report.push(&def.name, CollectionStatus::Failed(failure));
            }
        }
    }
    info!(status = report.status().as_str(), "reset finished");
    report
}
