use anyhow::anyhow;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn is_null(field: &str) -> Self {
        Self::IsNull(field.to_string())
    }

    pub fn not_null(field: &str) -> Self {
        Self::NotNull(field.to_string())
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq(f, _) | Self::IsNull(f) | Self::NotNull(f) => f,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let value = record.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => value == expected,
            Self::IsNull(_) => value.is_null(),
            Self::NotNull(_) => !value.is_null(),
        }
    }
}

/// The relational data service the engine reads from and writes to.
///
/// Each call is one blocking round trip. Filters are conjunctive.
pub trait RecordStore {
    fn select(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<Vec<Record>>;

    /// Insert-or-update keyed by `key`. Returns the number of records written.
    fn upsert(&self, collection: &str, key: &str, records: &[Record]) -> anyhow::Result<usize>;

    /// Returns the number of records removed.
    fn delete(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Select,
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    pub kind: OpKind,
    pub collection: String,
}

/// In-process store that records every call.
///
/// Failures can be injected per operation and collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, Vec<Record>>>,
    ops: RefCell<Vec<StoreOp>>,
    failing: RefCell<HashSet<(OpKind, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: &str, records: Vec<Record>) {
        self.tables
            .borrow_mut()
            .insert(collection.to_string(), records);
    }

    pub fn fail_on(&self, kind: OpKind, collection: &str) {
        self.failing
            .borrow_mut()
            .insert((kind, collection.to_string()));
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.tables
            .borrow()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, kind: OpKind, collection: &str) -> anyhow::Result<()> {
        self.ops.borrow_mut().push(StoreOp {
            kind,
            collection: collection.to_string(),
        });
        if self
            .failing
            .borrow()
            .contains(&(kind, collection.to_string()))
        {
            return Err(anyhow!("{kind:?} on {collection} rejected by store"));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn select(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<Vec<Record>> {
        self.enter(OpKind::Select, collection)?;
        let tables = self.tables.borrow();
        let rows = tables.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|r| filters.iter().all(|f| f.matches(r)))
            .cloned()
            .collect())
    }

    fn upsert(&self, collection: &str, key: &str, records: &[Record]) -> anyhow::Result<usize> {
        self.enter(OpKind::Upsert, collection)?;
        if let Some(idx) = records.iter().position(|r| r.get(key).map_or(true, Value::is_null)) {
            return Err(anyhow!("{collection}[{idx}] has no {key}"));
        }
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(collection.to_string()).or_default();
        for record in records {
            match rows.iter_mut().find(|r| r.get(key) == record.get(key)) {
                Some(existing) => {
                    for (k, v) in record {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                None => rows.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    fn delete(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<usize> {
        self.enter(OpKind::Delete, collection)?;
        let mut tables = self.tables.borrow_mut();
        let Some(rows) = tables.get_mut(collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filters.iter().all(|f| f.matches(r)));
        Ok(before - rows.len())
    }
}
