use crate::error::DatasetError;
use crate::store::Record;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Collection name to records, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    entries: Vec<(String, Vec<Record>)>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the records of an existing collection in place.
    pub fn insert(&mut self, name: &str, records: Vec<Record>) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = records;
        } else {
            self.entries.push((name.to_string(), records));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Record]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.entries.iter().map(|(_, r)| r.len()).sum()
    }
}

pub fn encode(collections: &Collections) -> String {
    let mut doc = Map::new();
    for (name, records) in collections.iter() {
        let rows = records.iter().cloned().map(Value::Object).collect();
        doc.insert(name.to_string(), Value::Array(rows));
    }
    format!("{:#}", Value::Object(doc))
}

pub fn decode(text: &str) -> Result<Collections, DatasetError> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| DatasetError::MalformedSnapshot(format!("invalid JSON: {e}")))?;
    let Value::Object(doc) = doc else {
        return Err(DatasetError::MalformedSnapshot(
            "top level must be an object of collections".to_string(),
        ));
    };

    let mut out = Collections::new();
    for (name, rows) in doc {
        let Value::Array(rows) = rows else {
            return Err(DatasetError::MalformedSnapshot(format!(
                "collection {name} is not an array"
            )));
        };
        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            match row {
                Value::Object(record) => records.push(record),
                _ => {
                    return Err(DatasetError::MalformedSnapshot(format!(
                        "{name}[{idx}] is not an object"
                    )))
                }
            }
        }
        out.insert(&name, records);
    }
    Ok(out)
}

/// `<institution-slug>_backup_<YYYY-MM-DD>.json`
pub fn snapshot_file_name(institution: &str, date: NaiveDate) -> String {
    let mut slug = String::new();
    for word in institution
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_lowercase());
    }
    if slug.is_empty() {
        slug.push_str("institution");
    }
    format!("{}_backup_{}.json", slug, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("record literal must be an object"),
        }
    }

    #[test]
    fn encode_decode_roundtrip_keeps_order_and_types() {
        let mut m = Collections::new();
        m.insert(
            "branches",
            vec![record(json!({ "id": 1, "name": "North", "active": true, "fee": 12.5 }))],
        );
        m.insert(
            "students",
            vec![
                record(json!({ "id": "1c0e1a6e-0b7e-4b1c-9f57-3d9d3c1a2b11", "branch_id": 1, "subject_id": null })),
                record(json!({ "id": "b4f3", "branch_id": 1, "tags": ["a", "b"], "branch": { "name": "North" } })),
            ],
        );
        m.insert("attendance", vec![]);

        let doc = encode(&m);
        let back = decode(&doc).expect("decode");
        assert_eq!(back, m);
        assert_eq!(back.names().collect::<Vec<_>>(), vec!["branches", "students", "attendance"]);
        assert!(doc.contains('\n'), "document should be human readable");
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for text in [
            "not json",
            "[]",
            "42",
            r#"{"branches": {"id": 1}}"#,
            r#"{"branches": [1, 2]}"#,
            r#"{"branches": [{"id": 1}, "x"]}"#,
        ] {
            let err = decode(text).expect_err(text);
            assert!(
                matches!(err, DatasetError::MalformedSnapshot(_)),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn malformed_message_names_the_position() {
        let err = decode(r#"{"classes": [{"id": 1}, []]}"#).expect_err("bad row");
        assert_eq!(
            err,
            DatasetError::MalformedSnapshot("classes[1] is not an object".to_string())
        );
    }

    #[test]
    fn empty_object_is_a_valid_empty_snapshot() {
        let back = decode("{}").expect("decode");
        assert!(back.is_empty());
    }

    #[test]
    fn file_name_embeds_institution_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).expect("date");
        assert_eq!(
            snapshot_file_name("St. Mary's High School", date),
            "st-mary-s-high-school_backup_2024-03-07.json"
        );
        assert_eq!(snapshot_file_name("  ", date), "institution_backup_2024-03-07.json");
    }
}
