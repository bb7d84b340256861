//! Downloading the observational records of selected projects.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::browse::criteria_filter;
use crate::cache::{MetadataCache, global_cache};
use crate::covariates;
use crate::error::Error;
use crate::expr::{Expr, col};
use crate::schema::Schema;
use crate::schema::fields::COVARIATES;
use crate::source::DataSource;
use crate::table::{Table, Value};

/// Which projects to download.
#[derive(Debug, Clone)]
pub enum Selection<'a> {
    /// Projects of the catalog for which the expression holds.
    Criteria(Expr),
    /// Projects listed in a table returned by [`browse`](crate::browse).
    Browsed(&'a Table),
}

#[derive(Debug, Clone, Copy)]
pub struct GetDataOptions {
    /// Append the unpacked `covariates` column to the records.
    pub cov_unpack: bool,
    /// Show a progress bar over projects.
    pub progress: bool,
}

impl Default for GetDataOptions {
    fn default() -> Self {
        Self {
            cov_unpack: false,
            progress: true,
        }
    }
}

/// Records of the selected projects together with their catalog rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Row-bound records of every project.
    pub data: Table,
    /// Catalog rows of the downloaded projects.
    pub metadata: Table,
}

impl Dataset {
    /// Distinct project keys present in the catalog rows.
    pub fn project_keys(&self) -> Vec<Value> {
        self.metadata
            .unique(Schema::popler().primary_key())
            .unwrap_or_default()
    }
}

/// Downloads the records selected by `selection`, using the process-wide
/// catalog cache to resolve criteria.
pub fn get_data(
    source: &dyn DataSource,
    selection: Selection<'_>,
    options: GetDataOptions,
) -> Result<Dataset> {
    get_data_with(global_cache(), source, selection, options)
}

pub fn get_data_with(
    cache: &MetadataCache,
    source: &dyn DataSource,
    selection: Selection<'_>,
    options: GetDataOptions,
) -> Result<Dataset> {
    let schema = Schema::popler();
    let pk = schema.primary_key();
    let catalog = cache.get_or_fetch(source)?;

    let keys: Vec<Value> = match &selection {
        Selection::Criteria(expr) => criteria_filter(&catalog, expr)?.unique(pk)?,
        Selection::Browsed(table) => table
            .unique(pk)?
            .into_iter()
            .filter(|k| !k.is_null())
            .collect(),
    };
    if keys.is_empty() {
        return Err(Error::EmptyResult.into());
    }

    let by_key = col(pk).is_in(keys.iter().cloned());
    let metadata = criteria_filter(&catalog, &by_key)?;

    let pb = if options.progress {
        let pb = ProgressBar::new(keys.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {pos}/{len} projects {wide_bar} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut parts = Vec::with_capacity(keys.len());
    for key in &keys {
        if let Some(pb) = &pb {
            pb.set_message(format!("{pk} {key}"));
        }
        let records = source.fetch_project(key)?;
        tracing::info!(project = %key, rows = records.n_rows(), "downloaded project");
        parts.push(with_key_column(records, pk, key)?);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let mut data = Table::bind_rows(&parts);
    if options.cov_unpack {
        if data.has_column(COVARIATES) {
            data = covariates::append(&data, COVARIATES)
                .context("failed to unpack covariates")?;
        } else {
            tracing::warn!("records carry no covariates column; nothing to unpack");
        }
    }

    Ok(Dataset { data, metadata })
}

/// Adds the project key as the first column when the records lack it.
fn with_key_column(records: Table, pk: &str, key: &Value) -> Result<Table> {
    if records.has_column(pk) {
        return Ok(records);
    }
    let keys = Table::from_rows([pk], vec![vec![key.clone()]; records.n_rows()])?;
    Ok(keys.append_columns(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::PROJECT_KEY;
    use crate::source::MemorySource;

    fn source() -> MemorySource {
        let catalog = Table::from_rows(
            [PROJECT_KEY, "genus"],
            vec![
                vec![1.into(), "Poa".into()],
                vec![1.into(), "Bouteloua".into()],
                vec![2.into(), "Larrea".into()],
            ],
        )
        .unwrap();
        let p1 = Table::from_rows(
            ["year", "count_observation", "covariates"],
            vec![
                vec![2001.into(), 3.into(), "temp=1".into()],
                vec![2002.into(), 5.into(), "temp=2.5".into()],
            ],
        )
        .unwrap();
        let p2 = Table::from_rows(
            [PROJECT_KEY, "year", "biomass"],
            vec![vec![2.into(), 1999.into(), 0.7.into()]],
        )
        .unwrap();
        MemorySource::new(catalog)
            .with_project(1, p1)
            .with_project(2, p2)
    }

    fn quiet() -> GetDataOptions {
        GetDataOptions {
            progress: false,
            ..GetDataOptions::default()
        }
    }

    #[test]
    fn criteria_downloads_each_matching_project_once() {
        let cache = MetadataCache::in_memory();
        let ds = get_data_with(
            &cache,
            &source(),
            Selection::Criteria(col("genus").eq("Poa")),
            quiet(),
        )
        .unwrap();
        assert_eq!(ds.data.n_rows(), 2);
        assert_eq!(ds.data.columns()[0], PROJECT_KEY);
        assert_eq!(ds.metadata.n_rows(), 2);
        assert_eq!(ds.project_keys(), [Value::Int(1)]);
    }

    #[test]
    fn browsed_tables_row_bind_over_the_union_of_columns() {
        let cache = MetadataCache::in_memory();
        let browsed = Table::from_rows([PROJECT_KEY], vec![vec![1.into()], vec![2.into()]]).unwrap();
        let ds = get_data_with(&cache, &source(), Selection::Browsed(&browsed), quiet()).unwrap();
        assert_eq!(
            ds.data.columns(),
            [PROJECT_KEY, "year", "count_observation", "covariates", "biomass"]
        );
        assert_eq!(ds.data.n_rows(), 3);
        assert_eq!(ds.data.get(2, "count_observation"), Some(&Value::Null));
    }

    #[test]
    fn cov_unpack_appends_typed_columns() {
        let cache = MetadataCache::in_memory();
        let opts = GetDataOptions {
            cov_unpack: true,
            progress: false,
        };
        let ds = get_data_with(
            &cache,
            &source(),
            Selection::Criteria(col(PROJECT_KEY).eq(1)),
            opts,
        )
        .unwrap();
        assert!(!ds.data.has_column(COVARIATES));
        assert_eq!(ds.data.get(0, "temp"), Some(&Value::Float(1.0)));
        assert_eq!(ds.data.get(1, "temp"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn empty_criteria_is_reported_as_such() {
        let cache = MetadataCache::in_memory();
        let err = get_data_with(
            &cache,
            &source(),
            Selection::Criteria(col("genus").eq("Quercus")),
            quiet(),
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyResult)));
    }
}
