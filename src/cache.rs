//! Process-wide copy of the metadata catalog.
//!
//! The first [`MetadataCache::get_or_fetch`] loads the catalog, from the disk
//! mirror when one exists and from the [`DataSource`] otherwise, and later
//! calls reuse it. Both copies remember the [`DataSource::source_id`] they
//! came from and are only served to that source; the disk mirror is also
//! dropped once it is older than [`MetadataCache::max_age`].
//! [`MetadataCache::refresh`] re-fetches from the source and
//! [`MetadataCache::invalidate`] forgets both copies.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, SystemTime};

use crate::persist::{load_tagged, save_tagged};
use crate::source::DataSource;
use crate::table::Table;

/// How long a disk mirror is trusted by default.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug)]
struct Entry {
    source: String,
    table: Arc<Table>,
}

#[derive(Debug)]
pub struct MetadataCache {
    memory: Mutex<Option<Entry>>,
    disk: Option<PathBuf>,
    max_age: Duration,
}

static GLOBAL: OnceLock<MetadataCache> = OnceLock::new();

/// The cache shared by [`browse`](crate::browse) and
/// [`get_data`](crate::get_data), mirrored to [`MetadataCache::default_disk_path`].
pub fn global_cache() -> &'static MetadataCache {
    GLOBAL.get_or_init(|| match MetadataCache::default_disk_path() {
        Some(path) => MetadataCache::with_disk(path),
        None => MetadataCache::in_memory(),
    })
}

impl MetadataCache {
    pub const fn in_memory() -> Self {
        Self {
            memory: Mutex::new(None),
            disk: None,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            memory: Mutex::new(None),
            disk: Some(path.into()),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Disk mirrors older than `max_age` are fetched again.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// `<user cache dir>/popler/metadata.json.gz`
    pub fn default_disk_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("popler").join("metadata.json.gz"))
    }

    pub fn disk_path(&self) -> Option<&Path> {
        self.disk.as_deref()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// The memoized catalog, if it has been loaded.
    pub fn cached(&self) -> Option<Arc<Table>> {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| Arc::clone(&e.table))
    }

    pub fn get_or_fetch(&self, source: &dyn DataSource) -> Result<Arc<Table>> {
        let id = source.source_id();
        let mut slot = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(entry) if entry.source == id => {
                tracing::debug!(source = %id, "metadata served from memory");
                return Ok(Arc::clone(&entry.table));
            }
            Some(entry) => {
                tracing::debug!(cached = %entry.source, source = %id, "memoized metadata belongs to another source");
            }
            None => {}
        }

        let table = match self.read_disk(&id) {
            Some(table) => Arc::new(table),
            None => Arc::new(self.fetch(source, &id)?),
        };
        *slot = Some(Entry {
            source: id,
            table: Arc::clone(&table),
        });
        Ok(table)
    }

    /// Re-fetches the catalog from `source`, replacing both copies.
    pub fn refresh(&self, source: &dyn DataSource) -> Result<Arc<Table>> {
        let id = source.source_id();
        let mut slot = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let table = Arc::new(self.fetch(source, &id)?);
        *slot = Some(Entry {
            source: id,
            table: Arc::clone(&table),
        });
        Ok(table)
    }

    /// Drops the memoized catalog and removes the disk mirror.
    pub fn invalidate(&self) -> Result<()> {
        *self.memory.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(path) = &self.disk {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("failed to remove cached metadata {}", path.display())
                    });
                }
            }
        }
        Ok(())
    }

    fn fetch(&self, source: &dyn DataSource, id: &str) -> Result<Table> {
        let table = source
            .fetch_metadata()
            .context("failed to fetch project metadata")?;
        tracing::info!(
            source = %id,
            rows = table.n_rows(),
            columns = table.n_cols(),
            "fetched project metadata"
        );
        if let Some(path) = &self.disk {
            // Not fatal: the next session fetches again.
            if let Err(e) = save_tagged(&table, path, Some(id)) {
                tracing::warn!(path = %path.display(), error = %e, "could not write metadata cache");
            }
        }
        Ok(table)
    }

    fn read_disk(&self, id: &str) -> Option<Table> {
        let path = self.disk.as_ref()?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.max_age {
            tracing::debug!(path = %path.display(), ?age, "metadata cache expired");
            return None;
        }

        match load_tagged(path) {
            Ok((table, Some(source))) if source == id => {
                tracing::debug!(path = %path.display(), "metadata served from disk cache");
                Some(table)
            }
            Ok((_, source)) => {
                tracing::debug!(path = %path.display(), cached = ?source, source = %id, "metadata cache belongs to another source");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable metadata cache");
                None
            }
        }
    }
}
