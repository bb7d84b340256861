//! Subsetting the metadata catalog.
//!
//! The building blocks ([`criteria_filter`], [`keyword_filter`],
//! [`select_columns`], [`nest_taxonomy`](crate::nest_taxonomy)) work on any
//! table. [`browse`] strings them together over the cached catalog.

use std::collections::BTreeSet;

use crate::cache::{MetadataCache, global_cache};
use crate::error::{Error, Result};
use crate::expr::{Expr, col};
use crate::nest::nest_taxonomy;
use crate::schema::{Schema, TaxonomySet};
use crate::source::DataSource;
use crate::table::{Table, Value};

/// Text cells longer than this are shortened when [`BrowseOptions::trim`] is set.
pub const TRIM_WIDTH: usize = 50;

/// Rows of `table` for which `expr` holds.
///
/// Fails with [`Error::UnknownColumns`] when the expression mentions a column
/// the table lacks, and with [`Error::EmptyResult`] when no row matches.
pub fn criteria_filter(table: &Table, expr: &Expr) -> Result<Table> {
    let bound = expr.bind(table)?;
    let rows = bound.matching_rows();
    if rows.is_empty() {
        return Err(Error::EmptyResult);
    }
    tracing::debug!(criteria = %expr, rows = rows.len(), "criteria filter");
    Ok(table.take_rows(&rows))
}

/// Projects found by a keyword search.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    /// Matching primary keys, in table order.
    pub keys: Vec<Value>,
    /// `key == k1 | key == k2 | ...`; selects the same rows again later.
    pub expr: Expr,
}

impl KeywordMatch {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The rows of `table` belonging to the matched projects.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        criteria_filter(table, &self.expr)
    }
}

/// Case-insensitive substring search over every column that holds text.
///
/// A project matches when any of its rows contains `keyword` in any text
/// cell. The match is returned as keys plus an equivalent criteria
/// expression; no match is not an error at this level.
pub fn keyword_filter(table: &Table, schema: &Schema, keyword: &str) -> Result<KeywordMatch> {
    let key_idx = table.require_column(schema.primary_key())?;
    let needle = keyword.to_lowercase();

    let text_columns: Vec<usize> = (0..table.n_cols())
        .filter(|&c| {
            table
                .rows()
                .iter()
                .any(|r| matches!(r[c], Value::Text(_)))
        })
        .collect();

    let mut matched = BTreeSet::new();
    for &c in &text_columns {
        for (i, row) in table.rows().iter().enumerate() {
            if let Value::Text(s) = &row[c] {
                if s.to_lowercase().contains(&needle) {
                    matched.insert(i);
                }
            }
        }
    }

    let mut keys: Vec<Value> = Vec::new();
    for i in matched {
        let key = &table.rows()[i][key_idx];
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    let pk = schema.primary_key();
    let expr = Expr::any(keys.iter().map(|k| col(pk).eq(k.clone())));
    tracing::debug!(keyword, projects = keys.len(), "keyword filter");
    Ok(KeywordMatch { keys, expr })
}

/// Which columns a browse returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnSelection {
    /// The schema's default selection.
    #[default]
    Default,
    /// Every column of the schema.
    Full,
    /// These columns; the primary key is added in front when missing.
    List(Vec<String>),
}

impl ColumnSelection {
    pub fn list<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        ColumnSelection::List(columns.into_iter().map(Into::into).collect())
    }

    fn taxonomy_set(&self) -> TaxonomySet {
        match self {
            ColumnSelection::Default => TaxonomySet::Default,
            ColumnSelection::Full | ColumnSelection::List(_) => TaxonomySet::Full,
        }
    }
}

/// The column names `selection` stands for under `schema`.
///
/// Fails with [`Error::MisspelledColumn`] when a listed column is unknown.
pub fn resolve_columns(schema: &Schema, selection: &ColumnSelection) -> Result<Vec<String>> {
    let pk = schema.primary_key();
    match selection {
        ColumnSelection::Default => Ok(schema
            .default_columns()
            .into_iter()
            .map(str::to_string)
            .collect()),
        ColumnSelection::Full => Ok(schema
            .all_columns()
            .into_iter()
            .map(str::to_string)
            .collect()),
        ColumnSelection::List(list) => {
            schema.validate(list)?;
            let mut out: Vec<String> = Vec::with_capacity(list.len() + 1);
            if !list.iter().any(|c| c == pk) {
                out.push(pk.to_string());
            }
            for c in list {
                if !out.contains(c) {
                    out.push(c.clone());
                }
            }
            Ok(out)
        }
    }
}

/// Restricts `table` to the selected columns. The primary key is always kept.
///
/// Default and full selections skip schema columns the table does not carry;
/// an explicit list must be fully present.
pub fn select_columns(
    table: &Table,
    schema: &Schema,
    selection: &ColumnSelection,
) -> Result<Table> {
    table.require_column(schema.primary_key())?;
    let wanted = resolve_columns(schema, selection)?;
    let columns: Vec<String> = match selection {
        ColumnSelection::List(_) => wanted,
        _ => {
            let (present, absent): (Vec<String>, Vec<String>) =
                wanted.into_iter().partition(|c| table.has_column(c));
            if !absent.is_empty() {
                tracing::debug!(?absent, "catalog lacks schema columns");
            }
            present
        }
    };
    table.select(&columns)
}

/// What [`browse`] returns.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseOptions {
    pub criteria: Option<Expr>,
    pub keyword: Option<String>,
    pub columns: ColumnSelection,
    /// Shorten long text cells for display.
    pub trim: bool,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            criteria: None,
            keyword: None,
            columns: ColumnSelection::Default,
            trim: true,
        }
    }
}

impl BrowseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criteria(mut self, expr: Expr) -> Self {
        self.criteria = Some(expr);
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = columns;
        self
    }

    pub fn full(self) -> Self {
        self.columns(ColumnSelection::Full)
    }

    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }
}

/// Filters, selects and nests `metadata` as `options` describe.
///
/// Supplying both a criteria expression and a keyword fails with
/// [`Error::ConflictingFilters`]; a filter matching nothing fails with
/// [`Error::EmptyResult`].
pub fn browse_table(metadata: &Table, schema: &Schema, options: &BrowseOptions) -> Result<Table> {
    let filtered = match (&options.criteria, &options.keyword) {
        (Some(_), Some(_)) => return Err(Error::ConflictingFilters),
        (Some(expr), None) => criteria_filter(metadata, expr)?,
        (None, Some(keyword)) => {
            let found = keyword_filter(metadata, schema, keyword)?;
            if found.is_empty() {
                return Err(Error::EmptyResult);
            }
            found.apply(metadata)?
        }
        (None, None) => metadata.clone(),
    };

    let selected = select_columns(&filtered, schema, &options.columns)?;
    let nested = nest_taxonomy(&selected, schema, options.columns.taxonomy_set())?;

    Ok(if options.trim {
        nested.truncate_text(TRIM_WIDTH)
    } else {
        nested
    })
}

/// [`browse_table`] over the catalog held by `cache`, fetched from `source`
/// on first use.
pub fn browse_with(
    cache: &MetadataCache,
    source: &dyn DataSource,
    options: &BrowseOptions,
) -> anyhow::Result<Table> {
    let metadata = cache.get_or_fetch(source)?;
    Ok(browse_table(&metadata, Schema::popler(), options)?)
}

/// [`browse_table`] over the process-wide catalog cache.
///
/// ```no_run
/// use popler::{BrowseOptions, Client, browse, col};
///
/// let client = Client::from_env()?;
/// let poa = browse(
///     &client,
///     &BrowseOptions::new().criteria(col("genus").eq("Poa").and(col("species").eq("fendleriana"))),
/// )?;
/// println!("{poa}");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn browse(source: &dyn DataSource, options: &BrowseOptions) -> anyhow::Result<Table> {
    browse_with(global_cache(), source, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::PROJECT_KEY;

    fn catalog() -> Table {
        Table::from_rows(
            [PROJECT_KEY, "title", "lterid", "genus", "species"],
            vec![
                vec![1.into(), "Plant cover".into(), "SEV".into(), "Poa".into(), "fendleriana".into()],
                vec![1.into(), "Plant cover".into(), "SEV".into(), "Bouteloua".into(), "eriopoda".into()],
                vec![2.into(), "Kelp forest fish".into(), "SBC".into(), "Sebastes".into(), "mystinus".into()],
                vec![3.into(), "Small mammals".into(), "SEV".into(), "Dipodomys".into(), "merriami".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn criteria_filter_returns_matching_rows() {
        let t = criteria_filter(&catalog(), &col("lterid").eq("SEV")).unwrap();
        assert_eq!(t.n_rows(), 3);
    }

    #[test]
    fn criteria_filter_errors_on_no_match_and_unknown_columns() {
        let err = criteria_filter(&catalog(), &col("lterid").eq("XYZ")).unwrap_err();
        assert!(matches!(err, Error::EmptyResult));

        let err = criteria_filter(&catalog(), &col("lter").eq("SEV")).unwrap_err();
        assert!(err.is_malformed_expression());
    }

    #[test]
    fn keyword_search_is_case_insensitive_and_unions_columns() {
        let found = keyword_filter(&catalog(), Schema::popler(), "SEB").unwrap();
        assert_eq!(found.keys, [Value::Int(2)]);

        // "Poa", "eriopoda" and "Dipodomys"
        let found = keyword_filter(&catalog(), Schema::popler(), "po").unwrap();
        assert_eq!(found.keys, [Value::Int(1), Value::Int(3)]);
        assert_eq!(found.expr, col(PROJECT_KEY).eq(1).or(col(PROJECT_KEY).eq(3)));
    }

    #[test]
    fn keyword_without_match_is_empty_not_an_error() {
        let found = keyword_filter(&catalog(), Schema::popler(), "zzz").unwrap();
        assert!(found.is_empty());
        assert_eq!(found.expr, Expr::Const(false));
    }

    #[test]
    fn explicit_list_gains_the_primary_key() {
        let cols = resolve_columns(Schema::popler(), &ColumnSelection::list(["title", "genus"]))
            .unwrap();
        assert_eq!(cols, [PROJECT_KEY, "title", "genus"]);
    }

    #[test]
    fn misspelled_columns_are_named() {
        let err = resolve_columns(Schema::popler(), &ColumnSelection::list(["titel"])).unwrap_err();
        assert!(matches!(err, Error::MisspelledColumn { columns } if columns == ["titel"]));
    }

    #[test]
    fn default_selection_skips_columns_the_table_lacks() {
        let t = select_columns(&catalog(), Schema::popler(), &ColumnSelection::Default).unwrap();
        assert_eq!(t.columns(), ["title", PROJECT_KEY, "lterid", "genus", "species"]);
    }

    #[test]
    fn conflicting_filters_are_rejected() {
        let opts = BrowseOptions::new()
            .criteria(col("lterid").eq("SEV"))
            .keyword("fish");
        let err = browse_table(&catalog(), Schema::popler(), &opts).unwrap_err();
        assert!(matches!(err, Error::ConflictingFilters));
    }

    #[test]
    fn browse_nests_taxa_per_project() {
        let opts = BrowseOptions::new().criteria(col("lterid").eq("SEV"));
        let t = browse_table(&catalog(), Schema::popler(), &opts).unwrap();
        assert_eq!(t.columns(), ["title", PROJECT_KEY, "lterid", "taxas"]);
        assert_eq!(t.n_rows(), 2);
        let taxa = t.get(0, "taxas").and_then(Value::as_table).unwrap();
        assert_eq!(taxa.n_rows(), 2);
    }

    #[test]
    fn browse_keyword_without_match_is_an_empty_result() {
        let opts = BrowseOptions::new().keyword("zzz");
        let err = browse_table(&catalog(), Schema::popler(), &opts).unwrap_err();
        assert!(matches!(err, Error::EmptyResult));
    }

    #[test]
    fn trim_shortens_long_titles() {
        let long = "x".repeat(80);
        let t = Table::from_rows([PROJECT_KEY, "title"], vec![vec![1.into(), long.into()]]).unwrap();
        let trimmed = browse_table(&t, Schema::popler(), &BrowseOptions::new()).unwrap();
        let title = trimmed.get(0, "title").and_then(Value::as_str).unwrap();
        assert_eq!(title.chars().count(), TRIM_WIDTH + 3);

        let kept = browse_table(&t, Schema::popler(), &BrowseOptions::new().trim(false)).unwrap();
        assert_eq!(kept.get(0, "title").and_then(Value::as_str).unwrap().len(), 80);
    }
}
