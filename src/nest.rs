//! Taxonomic nesting and its inverse.
//!
//! The catalog has one row per (project, taxon). Nesting collapses the
//! taxonomy columns of each project into a single table-valued cell so that
//! every project appears once; unnesting expands such cells back into rows.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::schema::{Schema, TaxonomySet};
use crate::table::{Table, Value};

/// Name of the nested column when several taxonomy columns are nested.
pub const NESTED_TAXA: &str = "taxas";

/// Groups rows by their non-taxonomic columns and nests the taxonomy columns.
///
/// - no taxonomy column present: rows are deduplicated;
/// - one present: it becomes a table-valued column under its own name;
/// - several present: they are nested jointly into [`NESTED_TAXA`].
///
/// The output has one row per distinct combination of non-taxonomic values,
/// in order of first appearance, and each nested cell holds the distinct taxa
/// of that combination.
pub fn nest_taxonomy(table: &Table, schema: &Schema, set: TaxonomySet) -> Result<Table> {
    let (taxa, others): (Vec<&String>, Vec<&String>) = table
        .columns()
        .iter()
        .partition(|c| schema.is_taxonomic(c, set));

    if taxa.is_empty() {
        return Ok(table.distinct());
    }

    let nested_name = match taxa.as_slice() {
        [single] => (*single).clone(),
        _ => NESTED_TAXA.to_string(),
    };

    let out = nest_columns(table, &taxa, &others, &nested_name)?;
    warn_on_duplicate_keys(&out, schema.primary_key());
    Ok(out)
}

fn nest_columns(
    table: &Table,
    nested: &[&String],
    keys: &[&String],
    nested_name: &str,
) -> Result<Table> {
    let nested_idx: Vec<usize> = nested
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<_>>()?;
    let key_idx: Vec<usize> = keys
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<_>>()?;

    struct Group {
        key: Vec<Value>,
        members: Vec<Vec<Value>>,
        seen: HashSet<Vec<Value>>,
    }

    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for row in table.rows() {
        let key: Vec<Value> = key_idx.iter().map(|&i| row[i].clone()).collect();
        let member: Vec<Value> = nested_idx.iter().map(|&i| row[i].clone()).collect();
        let g = match index.get(&key) {
            Some(&g) => g,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    members: Vec::new(),
                    seen: HashSet::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[g];
        if group.seen.insert(member.clone()) {
            group.members.push(member);
        }
    }

    let sub_columns: Vec<String> = nested.iter().map(|c| (*c).clone()).collect();
    let mut columns: Vec<String> = keys.iter().map(|c| (*c).clone()).collect();
    columns.push(nested_name.to_string());

    let rows = groups
        .into_iter()
        .map(|g| {
            let sub = Table::from_rows(sub_columns.clone(), g.members)?;
            let mut row = g.key;
            row.push(Value::Table(sub));
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    Table::from_rows(columns, rows)
}

fn warn_on_duplicate_keys(table: &Table, key: &str) {
    let Ok(values) = table.column(key) else {
        return;
    };
    let mut seen = HashSet::new();
    let dupes = values.filter(|v| !seen.insert(*v)).count();
    if dupes > 0 {
        tracing::warn!(
            key,
            dupes,
            "projects differ in non-taxonomic columns and appear more than once"
        );
    }
}

/// Expands the table-valued `column`: each sub-row becomes one output row,
/// with the sub-table's columns taking the place of `column`. Null cells and
/// empty sub-tables keep their row with null taxa.
pub fn unnest(table: &Table, column: &str) -> Result<Table> {
    let idx = table.require_column(column)?;

    let mut sub_columns: Vec<String> = Vec::new();
    for row in table.rows() {
        if let Value::Table(t) = &row[idx] {
            for c in t.columns() {
                if !sub_columns.contains(c) {
                    sub_columns.push(c.clone());
                }
            }
        }
    }

    let mut columns: Vec<String> = table.columns()[..idx].to_vec();
    columns.extend(sub_columns.iter().cloned());
    columns.extend(table.columns()[idx + 1..].iter().cloned());

    let mut rows = Vec::new();
    for row in table.rows() {
        let before = &row[..idx];
        let after = &row[idx + 1..];
        let expanded: Vec<Vec<Value>> = match &row[idx] {
            Value::Table(t) if !t.is_empty() => t
                .rows()
                .iter()
                .map(|sub| {
                    sub_columns
                        .iter()
                        .map(|c| {
                            t.column_index(c)
                                .map(|i| sub[i].clone())
                                .unwrap_or(Value::Null)
                        })
                        .collect()
                })
                .collect(),
            _ => vec![vec![Value::Null; sub_columns.len()]],
        };
        for mid in expanded {
            let mut out = before.to_vec();
            out.extend(mid);
            out.extend_from_slice(after);
            rows.push(out);
        }
    }

    Table::from_rows(columns, rows)
}

/// Unnests every table-valued column.
pub fn flatten(table: &Table) -> Result<Table> {
    let mut out = table.clone();
    while let Some(column) = out
        .columns()
        .iter()
        .enumerate()
        .find(|(i, _)| out.rows().iter().any(|r| matches!(r[*i], Value::Table(_))))
        .map(|(_, c)| c.clone())
    {
        out = unnest(&out, &column)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::PROJECT_KEY;

    fn catalog() -> Table {
        Table::from_rows(
            [PROJECT_KEY, "title", "genus", "species"],
            vec![
                vec![1.into(), "Grassland".into(), "Poa".into(), "fendleriana".into()],
                vec![1.into(), "Grassland".into(), "Bouteloua".into(), "gracilis".into()],
                vec![2.into(), "Desert".into(), "Larrea".into(), "tridentata".into()],
                vec![1.into(), "Grassland".into(), "Poa".into(), "fendleriana".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn several_taxonomy_columns_nest_jointly() {
        let out = nest_taxonomy(&catalog(), Schema::popler(), TaxonomySet::Default).unwrap();
        assert_eq!(out.columns(), [PROJECT_KEY, "title", NESTED_TAXA]);
        assert_eq!(out.n_rows(), 2);

        let taxa = out.get(0, NESTED_TAXA).and_then(Value::as_table).unwrap();
        assert_eq!(taxa.columns(), ["genus", "species"]);
        assert_eq!(taxa.n_rows(), 2);
        assert_eq!(taxa.get(1, "genus"), Some(&Value::from("Bouteloua")));
    }

    #[test]
    fn single_taxonomy_column_keeps_its_name() {
        let t = catalog().select(&[PROJECT_KEY, "genus"]).unwrap();
        let out = nest_taxonomy(&t, Schema::popler(), TaxonomySet::Default).unwrap();
        assert_eq!(out.columns(), [PROJECT_KEY, "genus"]);
        let genus = out.get(0, "genus").and_then(Value::as_table).unwrap();
        assert_eq!(genus.columns(), ["genus"]);
        assert_eq!(genus.n_rows(), 2);
    }

    #[test]
    fn no_taxonomy_columns_deduplicates() {
        let t = catalog().select(&[PROJECT_KEY, "title"]).unwrap();
        let out = nest_taxonomy(&t, Schema::popler(), TaxonomySet::Default).unwrap();
        assert_eq!(out.columns(), [PROJECT_KEY, "title"]);
        assert_eq!(out.n_rows(), 2);
    }

    #[test]
    fn full_set_nests_columns_the_default_set_ignores() {
        let t = Table::from_rows(
            [PROJECT_KEY, "common_name"],
            vec![
                vec![1.into(), "muttongrass".into()],
                vec![1.into(), "blue grama".into()],
            ],
        )
        .unwrap();
        let default = nest_taxonomy(&t, Schema::popler(), TaxonomySet::Default).unwrap();
        assert_eq!(default.n_rows(), 2);
        let full = nest_taxonomy(&t, Schema::popler(), TaxonomySet::Full).unwrap();
        assert_eq!(full.n_rows(), 1);
    }

    #[test]
    fn unnest_restores_distinct_pairs() {
        let nested = nest_taxonomy(&catalog(), Schema::popler(), TaxonomySet::Default).unwrap();
        let flat = unnest(&nested, NESTED_TAXA).unwrap();
        assert_eq!(flat.columns(), [PROJECT_KEY, "title", "genus", "species"]);
        assert_eq!(flat, catalog().distinct());
    }

    #[test]
    fn unnest_keeps_rows_with_empty_cells() {
        let empty = Table::new(["genus"]).unwrap();
        let t = Table::from_rows(
            ["k", "genus", "x"],
            vec![
                vec![1.into(), Value::Table(empty), "a".into()],
                vec![2.into(), Value::Null, "b".into()],
            ],
        )
        .unwrap();
        let flat = unnest(&t, "genus").unwrap();
        assert_eq!(flat.columns(), ["k", "genus", "x"]);
        assert_eq!(flat.n_rows(), 2);
        assert_eq!(flat.get(1, "genus"), Some(&Value::Null));
    }

    #[test]
    fn flatten_expands_every_nested_column() {
        let nested = nest_taxonomy(&catalog(), Schema::popler(), TaxonomySet::Default).unwrap();
        let flat = flatten(&nested).unwrap();
        assert_eq!(flat.n_rows(), 3);
        assert!(
            flat.rows()
                .iter()
                .flatten()
                .all(|v| !matches!(v, Value::Table(_)))
        );
    }
}
