use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::table::{Table, Value};

/// Where catalog metadata and project records come from.
///
/// [`Client`](crate::Client) reads them from the popler API;
/// [`MemorySource`] serves tables already in memory, e.g. loaded from files
/// saved with [`save_table`](crate::save_table).
pub trait DataSource {
    /// Identifies where the data comes from. Cached catalogs are only reused
    /// for a source with the same id.
    fn source_id(&self) -> String;

    /// The full project-metadata table.
    fn fetch_metadata(&self) -> Result<Table>;

    /// All observational records of one project.
    fn fetch_project(&self, key: &Value) -> Result<Table>;
}

#[derive(Debug, Clone)]
pub struct MemorySource {
    metadata: Table,
    projects: HashMap<Value, Table>,
    id: String,
}

impl MemorySource {
    pub fn new(metadata: Table) -> Self {
        let mut hasher = DefaultHasher::new();
        metadata.hash(&mut hasher);
        Self {
            id: format!("memory:{:016x}", hasher.finish()),
            metadata,
            projects: HashMap::new(),
        }
    }

    pub fn with_project(mut self, key: impl Into<Value>, records: Table) -> Self {
        self.projects.insert(key.into(), records);
        self
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(Table::default())
    }
}

impl DataSource for MemorySource {
    fn source_id(&self) -> String {
        self.id.clone()
    }

    fn fetch_metadata(&self) -> Result<Table> {
        Ok(self.metadata.clone())
    }

    fn fetch_project(&self, key: &Value) -> Result<Table> {
        self.projects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no records for project {}", key))
    }
}
