use crate::catalog::EntityCatalog;
use crate::store::{Filter, Record, RecordStore};
use anyhow::{anyhow, bail, Context};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;

pub const DB_FILE: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS branches(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT,
            phone TEXT,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            branch_id INTEGER NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            qualification TEXT,
            joined_on TEXT,
            active BOOLEAN NOT NULL DEFAULT 1,
            FOREIGN KEY(branch_id) REFERENCES branches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_branch ON teachers(branch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY,
            branch_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            section TEXT,
            class_teacher_id TEXT,
            FOREIGN KEY(branch_id) REFERENCES branches(id),
            FOREIGN KEY(class_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_branch ON classes(branch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            branch_id INTEGER NOT NULL,
            class_id INTEGER,
            roll_no INTEGER,
            full_name TEXT NOT NULL,
            guardian_name TEXT,
            guardian_phone TEXT,
            birth_date TEXT,
            admitted_on TEXT,
            active BOOLEAN NOT NULL DEFAULT 1,
            FOREIGN KEY(branch_id) REFERENCES branches(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            remark TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            subject_id INTEGER,
            title TEXT NOT NULL,
            held_on TEXT,
            max_marks REAL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            id INTEGER PRIMARY KEY,
            exam_id INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            marks REAL,
            grade TEXT,
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(exam_id, student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_structures(
            id INTEGER PRIMARY KEY,
            class_id INTEGER NOT NULL,
            label TEXT NOT NULL,
            amount REAL NOT NULL,
            due_day INTEGER,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_payments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_structure_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            paid_on TEXT NOT NULL,
            method TEXT,
            receipt_no TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(fee_structure_id) REFERENCES fee_structures(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_payments_student ON fee_payments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id INTEGER PRIMARY KEY,
            branch_id INTEGER,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            published_on TEXT,
            pinned BOOLEAN NOT NULL DEFAULT 0,
            FOREIGN KEY(branch_id) REFERENCES branches(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS site_content(
            slug TEXT PRIMARY KEY,
            title TEXT,
            body TEXT,
            image_urls JSON,
            updated_at TEXT
        )",
        [],
    )?;

    // Identities live outside the catalog: never exported, never wiped.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS operators(
            email TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// [`RecordStore`] over one SQLite connection.
///
/// Only catalog collections can be addressed, so table names never come from
/// snapshot text unchecked.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
    catalog: &'a EntityCatalog,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection, catalog: &'a EntityCatalog) -> Self {
        Self { conn, catalog }
    }

    fn table(&self, collection: &str) -> anyhow::Result<String> {
        if !self.catalog.contains(collection) {
            bail!("unknown collection: {collection}");
        }
        quote_ident(collection)
    }

    fn order_key(&self, collection: &str) -> anyhow::Result<String> {
        let key = self
            .catalog
            .get(collection)
            .map(|d| d.key.as_str())
            .unwrap_or("rowid");
        quote_ident(key)
    }
}

impl RecordStore for SqliteStore<'_> {
    fn select(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<Vec<Record>> {
        let table = self.table(collection)?;
        let (clause, params) = where_clause(filters)?;
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {}",
            table,
            clause,
            self.order_key(collection)?
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("failed to query {collection}"))?;
        let columns: Vec<(String, ColumnKind)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), ColumnKind::from_decl(c.decl_type())))
            .collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, (name, kind)) in columns.iter().enumerate() {
                record.insert(name.clone(), sql_to_json(row.get_ref(i)?, *kind));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn upsert(&self, collection: &str, key: &str, records: &[Record]) -> anyhow::Result<usize> {
        let table = self.table(collection)?;
        let key_col = quote_ident(key)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to begin transaction")?;
        for (idx, record) in records.iter().enumerate() {
            if record.get(key).map_or(true, Value::is_null) {
                bail!("{collection}[{idx}] has no {key}");
            }
            let mut cols = Vec::with_capacity(record.len());
            let mut values = Vec::with_capacity(record.len());
            for (field, value) in record {
                cols.push(quote_ident(field)?);
                values.push(json_to_sql(value));
            }
            let placeholders = vec!["?"; cols.len()].join(", ");
            let updates: Vec<String> = cols
                .iter()
                .filter(|c| **c != key_col)
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            let on_conflict = if updates.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", updates.join(", "))
            };
            let sql = format!(
                "INSERT INTO {}({}) VALUES({}) ON CONFLICT({}) {}",
                table,
                cols.join(", "),
                placeholders,
                key_col,
                on_conflict
            );
            tx.execute(&sql, params_from_iter(values.iter()))
                .with_context(|| format!("failed to write {collection}[{idx}]"))?;
        }
        tx.commit().context("failed to commit")?;
        Ok(records.len())
    }

    fn delete(&self, collection: &str, filters: &[Filter]) -> anyhow::Result<usize> {
        let table = self.table(collection)?;
        let (clause, params) = where_clause(filters)?;
        let sql = format!("DELETE FROM {}{}", table, clause);
        let removed = self
            .conn
            .execute(&sql, params_from_iter(params.iter()))
            .with_context(|| format!("failed to delete from {collection}"))?;
        Ok(removed)
    }
}

/// Record count per catalog collection, in catalog order.
pub fn collection_counts(
    conn: &Connection,
    catalog: &EntityCatalog,
) -> anyhow::Result<Vec<(String, i64)>> {
    let mut out = Vec::with_capacity(catalog.len());
    for def in catalog.order() {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&def.name)?);
        let n: i64 = conn
            .query_row(&sql, [], |r| r.get(0))
            .with_context(|| format!("failed to count {}", def.name))?;
        out.push((def.name.clone(), n));
    }
    Ok(out)
}

fn quote_ident(name: &str) -> anyhow::Result<String> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(anyhow!("invalid field name: {name:?}"));
    }
    Ok(format!("\"{}\"", name))
}

fn where_clause(filters: &[Filter]) -> anyhow::Result<(String, Vec<SqlValue>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::with_capacity(filters.len());
    let mut params = Vec::new();
    for f in filters {
        let col = quote_ident(f.field())?;
        match f {
            Filter::Eq(_, Value::Null) | Filter::IsNull(_) => parts.push(format!("{col} IS NULL")),
            Filter::Eq(_, v) => {
                parts.push(format!("{col} = ?"));
                params.push(json_to_sql(v));
            }
            Filter::NotNull(_) => parts.push(format!("{col} IS NOT NULL")),
        }
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

/// Declared column types that SQLite has no storage class for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Plain,
    Boolean,
    Json,
}

impl ColumnKind {
    fn from_decl(decl: Option<&str>) -> Self {
        match decl {
            Some(d) if d.eq_ignore_ascii_case("BOOLEAN") => ColumnKind::Boolean,
            Some(d) if d.eq_ignore_ascii_case("JSON") => ColumnKind::Json,
            _ => ColumnKind::Plain,
        }
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Primitive arrays are stored as their JSON text.
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>, kind: ColumnKind) -> Value {
    match (kind, value) {
        (ColumnKind::Boolean, ValueRef::Integer(i)) => return Value::Bool(i != 0),
        (ColumnKind::Json, ValueRef::Text(t)) => {
            if let Ok(v) = serde_json::from_slice::<Value>(t) {
                if v.is_array() {
                    return v;
                }
            }
        }
        _ => {}
    }
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}
