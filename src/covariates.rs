//! Unpacking of the free-text `covariates` column.
//!
//! Downloaded records keep study-specific fields serialized in one text
//! column, e.g. `{'plot_type': 'control', 'depth': 10}` or
//! `plot_type=control; depth=10`. Unpacking turns every key found in the
//! column into a typed column.

use std::collections::HashMap;

use crate::error::Result;
use crate::table::{Table, Value};
use crate::util::strip_quotes;

const NULL_SPELLINGS: &[&str] = &["", "NA", "NaN", "nan", "None", "null", "NULL"];

/// Splits one covariate cell into `(key, value)` pairs.
///
/// Pairs are separated by `,` or `;` and split on the first `=` or `:`.
/// Separators inside quotes do not count. Pieces without a separator or with
/// an empty key are skipped.
pub fn parse_pairs(text: &str) -> Vec<(String, String)> {
    let body = text.trim();
    let body = body
        .strip_prefix('{')
        .and_then(|b| b.strip_suffix('}'))
        .unwrap_or(body);

    let mut out = Vec::new();
    for piece in split_unquoted(body, |c| c == ',' || c == ';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some(at) = find_unquoted(piece, |c| c == '=' || c == ':') else {
            tracing::debug!(piece, "skipping covariate without a key separator");
            continue;
        };
        let key = strip_quotes(&piece[..at]);
        let value = strip_quotes(&piece[at + 1..]);
        if key.is_empty() {
            tracing::debug!(piece, "skipping covariate with an empty key");
            continue;
        }
        out.push((key.to_string(), value.to_string()));
    }
    out
}

fn find_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if is_sep(c) => return Some(i),
            None => {}
        }
    }
    None
}

fn split_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(at) = find_unquoted(rest, &is_sep) {
        out.push(&rest[..at]);
        rest = &rest[at + 1..];
    }
    out.push(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    Text,
}

fn is_null(raw: &str) -> bool {
    NULL_SPELLINGS.contains(&raw.trim())
}

fn widen(kind: Kind, raw: &str) -> Kind {
    match kind {
        Kind::Int if raw.parse::<i64>().is_ok() => Kind::Int,
        Kind::Int | Kind::Float if raw.parse::<f64>().is_ok() => Kind::Float,
        _ => Kind::Text,
    }
}

fn typed(kind: Kind, raw: &str) -> Value {
    if is_null(raw) {
        return Value::Null;
    }
    match kind {
        Kind::Int => raw.parse().map(Value::Int).unwrap_or(Value::Null),
        Kind::Float => raw.parse().map(Value::Float).unwrap_or(Value::Null),
        Kind::Text => Value::Text(raw.to_string()),
    }
}

/// Parses `column` of `table` into a table with one column per discovered
/// key (in order of first discovery) and one row per record.
///
/// A column is integer if all its non-null values are integers, float if all
/// are numeric, text otherwise. Keys missing from a record are null.
pub fn unpack(table: &Table, column: &str) -> Result<Table> {
    let parsed: Vec<Vec<(String, String)>> = table
        .column(column)?
        .map(|v| match v {
            Value::Null => Vec::new(),
            Value::Text(s) => parse_pairs(s),
            other => parse_pairs(&other.to_string()),
        })
        .collect();

    let mut keys: Vec<String> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut kinds: Vec<Kind> = Vec::new();
    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::with_capacity(parsed.len());

    for pairs in parsed {
        let mut row: Vec<Option<String>> = vec![None; keys.len()];
        for (k, v) in pairs {
            let idx = match position.get(&k) {
                Some(&i) => i,
                None => {
                    let i = keys.len();
                    position.insert(k.clone(), i);
                    keys.push(k);
                    kinds.push(Kind::Int);
                    row.push(None);
                    i
                }
            };
            if !is_null(&v) {
                kinds[idx] = widen(kinds[idx], v.trim());
            }
            // A repeated key within one record keeps its last value.
            row[idx] = Some(v);
        }
        raw_rows.push(row);
    }

    let rows = raw_rows
        .into_iter()
        .map(|mut raw| {
            raw.resize(keys.len(), None);
            raw.iter()
                .zip(&kinds)
                .map(|(cell, &kind)| match cell {
                    Some(s) => typed(kind, s.trim()),
                    None => Value::Null,
                })
                .collect()
        })
        .collect();

    tracing::debug!(column, keys = keys.len(), "unpacked covariates");
    Table::from_rows(keys, rows)
}

/// Replaces `column` with its unpacked covariates, appended on the right.
/// Keys that collide with existing columns get a `_cov` suffix.
pub fn append(table: &Table, column: &str) -> Result<Table> {
    let unpacked = unpack(table, column)?;
    let base = table.drop_column(column)?;

    let mut names: Vec<String> = Vec::with_capacity(unpacked.n_cols());
    for key in unpacked.columns() {
        let mut name = key.clone();
        while base.has_column(&name) || names.contains(&name) {
            name.push_str("_cov");
        }
        names.push(name);
    }
    let renamed = Table::from_rows(names, unpacked.rows().to_vec())?;
    base.append_columns(&renamed)
}
