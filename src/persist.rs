//! Saving and loading tables.
//!
//! A saved table is gzip-compressed JSON wrapped in a small header. Loading
//! gives back a table equal to the one saved.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::table::Table;

const FORMAT: &str = "popler-table";
const VERSION: u32 = 1;

#[derive(Serialize)]
struct FileRef<'a> {
    format: &'static str,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    table: &'a Table,
}

#[derive(Deserialize)]
struct FileOwned {
    format: String,
    version: u32,
    #[serde(default)]
    source: Option<String>,
    table: Table,
}

fn io_error<'a>(
    operation: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> Error + 'a {
    move |source| Error::Io {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `table` to `path`, replacing any existing file. The data goes to a
/// sibling temporary file first and is renamed into place.
pub fn save_table(table: &Table, path: &Path) -> Result<()> {
    save_tagged(table, path, None)
}

/// Reads a table written by [`save_table`].
pub fn load_table(path: &Path) -> Result<Table> {
    load_tagged(path).map(|(table, _)| table)
}

/// [`save_table`] recording which source the table came from.
pub(crate) fn save_tagged(table: &Table, path: &Path, source: Option<&str>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error("create directory for", path))?;
        }
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(io_error("create", &tmp))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(
        &mut encoder,
        &FileRef {
            format: FORMAT,
            version: VERSION,
            source,
            table,
        },
    )
    .map_err(|e| io_error("write", &tmp)(e.into()))?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .map_err(io_error("write", &tmp))?;

    fs::rename(&tmp, path).map_err(io_error("replace", path))?;
    tracing::debug!(path = %path.display(), rows = table.n_rows(), "saved table");
    Ok(())
}

/// Reads a table and the source tag it was saved with.
pub(crate) fn load_tagged(path: &Path) -> Result<(Table, Option<String>)> {
    let file = File::open(path).map_err(io_error("open", path))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let saved: FileOwned =
        serde_json::from_reader(decoder).map_err(|e| Error::InvalidFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if saved.format != FORMAT {
        return Err(Error::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!("unexpected format tag `{}`", saved.format),
        });
    }
    if saved.version > VERSION {
        return Err(Error::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!(
                "file version {} is newer than supported version {}",
                saved.version, VERSION
            ),
        });
    }

    saved.table.validate()?;
    Ok((saved.table, saved.source))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
