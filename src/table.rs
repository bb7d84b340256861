//! In-memory tables.
//!
//! The popler catalog and its datasets are small, loosely typed tables, so
//! cells are a dynamically typed [`Value`] and a [`Table`] is a list of column
//! names plus rows. A cell may itself hold a table, which is how taxonomic
//! nesting is represented.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// A single cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Text(String),
    Table(Table),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Converts a JSON value returned by the API. Arrays and objects are kept
    /// as their JSON text.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Table(_) => 5,
        }
    }
}

// All NaNs are one value so that equality, ordering and hashing agree.
fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Table(a), Value::Table(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => {
                let bits = if f.is_nan() {
                    f64::NAN.to_bits()
                } else if *f == 0.0 {
                    0u64
                } else {
                    f.to_bits()
                };
                bits.hash(state)
            }
            Value::Text(s) => s.hash(state),
            Value::Table(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NA"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Table(t) => write!(f, "<table [{} x {}]>", t.n_rows(), t.n_cols()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    // JSON has no spelling for non-finite numbers, so they travel as strings.
    pub(super) fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("NaN")
        } else if *v > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Text(String),
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Num(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float `{other}`"))),
            },
        }
    }
}

/// A rectangular table: named columns and rows of [`Value`]s.
///
/// Every row holds exactly one value per column and column names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates an empty table with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::from_rows(columns, Vec::new())
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let table = Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        };
        table.validate()?;
        Ok(table)
    }

    /// Checks the width and unique-name invariants. Used after deserializing.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.as_str()) {
                return Err(Error::DuplicateColumn { column: c.clone() });
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::RowWidth {
                    row: i,
                    expected: self.columns.len(),
                    found: row.len(),
                });
            }
            for v in row {
                if let Value::Table(t) = v {
                    t.validate()?;
                }
            }
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub(crate) fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| Error::MissingColumn {
            column: name.to_string(),
        })
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Keeps the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<Table> {
        let idx = columns
            .iter()
            .map(|c| self.require_column(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Table::from_rows(columns.iter().map(|c| c.as_ref().to_string()), rows)
    }

    /// Keeps the rows at `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Drops repeated rows, keeping the first occurrence.
    pub fn distinct(&self) -> Table {
        let mut seen = HashSet::new();
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| seen.insert(*r))
                .cloned()
                .collect(),
        }
    }

    /// Distinct values of a column in order of first appearance.
    pub fn unique(&self, column: &str) -> Result<Vec<Value>> {
        let mut seen = HashSet::new();
        Ok(self
            .column(column)?
            .filter(|v| seen.insert(*v))
            .cloned()
            .collect())
    }

    /// Appends the columns of `other` to the right. Both tables must have the
    /// same number of rows.
    pub fn append_columns(&self, other: &Table) -> Result<Table> {
        if other.n_rows() != self.n_rows() {
            return Err(Error::RowWidth {
                row: other.n_rows().min(self.n_rows()),
                expected: self.n_rows(),
                found: other.n_rows(),
            });
        }
        let columns = self.columns.iter().chain(&other.columns).cloned();
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| a.iter().chain(b).cloned().collect())
            .collect();
        Table::from_rows(columns, rows)
    }

    pub fn drop_column(&self, name: &str) -> Result<Table> {
        let idx = self.require_column(name)?;
        let mut out = self.clone();
        out.columns.remove(idx);
        for row in &mut out.rows {
            row.remove(idx);
        }
        Ok(out)
    }

    /// Stacks tables on top of each other over the union of their columns.
    /// Columns keep order of first appearance; missing cells are null.
    pub fn bind_rows<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        let tables: Vec<&Table> = tables.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        for t in &tables {
            for c in &t.columns {
                if !position.contains_key(c) {
                    position.insert(c.clone(), columns.len());
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(tables.iter().map(|t| t.n_rows()).sum());
        for t in &tables {
            let map: Vec<usize> = t.columns.iter().map(|c| position[c]).collect();
            for r in &t.rows {
                let mut row = vec![Value::Null; columns.len()];
                for (v, &dst) in r.iter().zip(&map) {
                    row[dst] = v.clone();
                }
                rows.push(row);
            }
        }
        Table { columns, rows }
    }

    /// Builds a table from JSON objects. Columns are the union of keys in
    /// order of first appearance.
    pub fn from_records(
        records: impl IntoIterator<Item = serde_json::Map<String, serde_json::Value>>,
    ) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut rows: Vec<Vec<Value>> = Vec::new();

        for record in records {
            let mut row = vec![Value::Null; columns.len()];
            for (k, v) in record {
                let idx = match position.get(&k) {
                    Some(&i) => i,
                    None => {
                        let i = columns.len();
                        position.insert(k.clone(), i);
                        columns.push(k);
                        row.push(Value::Null);
                        i
                    }
                };
                row[idx] = Value::from_json(v);
            }
            rows.push(row);
        }

        for row in &mut rows {
            row.resize(columns.len(), Value::Null);
        }
        Table { columns, rows }
    }

    /// Shortens text cells longer than `max_chars`, nested tables included.
    pub fn truncate_text(&self, max_chars: usize) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|r| r.iter().map(|v| truncate_value(v, max_chars)).collect())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }
}

fn truncate_value(v: &Value, max_chars: usize) -> Value {
    match v {
        Value::Text(s) if s.chars().count() > max_chars => {
            let mut out: String = s.chars().take(max_chars).collect();
            out.push_str("...");
            Value::Text(out)
        }
        Value::Table(t) => Value::Table(t.truncate_text(max_chars)),
        other => other.clone(),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        writeln!(f, "# {} x {}", self.n_rows(), self.n_cols())?;
        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect();
        writeln!(f, "{}", header.join("  ").trim_end())?;
        for r in &cells {
            let line: Vec<String> = r
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small() -> Table {
        Table::from_rows(
            ["id", "name"],
            vec![
                vec![1.into(), "a".into()],
                vec![2.into(), "b".into()],
                vec![1.into(), "a".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let err = Table::from_rows(["a", "b"], vec![vec![Value::Null]]).unwrap_err();
        assert!(matches!(
            err,
            Error::RowWidth {
                row: 0,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn from_rows_rejects_duplicate_columns() {
        let err = Table::new(["a", "a"]).unwrap_err();
        assert!(matches!(err, Error::DuplicateColumn { .. }));
    }

    #[test]
    fn select_reorders_and_reports_missing() {
        let t = small();
        let s = t.select(&["name", "id"]).unwrap();
        assert_eq!(s.columns(), ["name", "id"]);
        assert_eq!(s.rows()[1], vec![Value::from("b"), Value::from(2)]);

        let err = t.select(&["nope"]).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column } if column == "nope"));
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let d = small().distinct();
        assert_eq!(d.n_rows(), 2);
        assert_eq!(d.get(0, "id"), Some(&Value::Int(1)));
        assert_eq!(d.get(1, "id"), Some(&Value::Int(2)));
    }

    #[test]
    fn bind_rows_unions_columns() {
        let a = Table::from_rows(["x", "y"], vec![vec![1.into(), 2.into()]]).unwrap();
        let b = Table::from_rows(["y", "z"], vec![vec![3.into(), 4.into()]]).unwrap();
        let c = Table::bind_rows([&a, &b]);
        assert_eq!(c.columns(), ["x", "y", "z"]);
        assert_eq!(c.rows()[0], vec![1.into(), 2.into(), Value::Null]);
        assert_eq!(c.rows()[1], vec![Value::Null, 3.into(), 4.into()]);
    }

    #[test]
    fn from_records_fills_late_columns_with_null() {
        let records = vec![
            json!({"a": 1, "b": "x"}),
            json!({"a": 2.5, "c": null, "d": true}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone());
        let t = Table::from_records(records);
        assert_eq!(t.columns(), ["a", "b", "c", "d"]);
        assert_eq!(t.rows()[0], vec![1.into(), "x".into(), Value::Null, Value::Null]);
        assert_eq!(t.rows()[1], vec![2.5.into(), Value::Null, Value::Null, true.into()]);
    }

    #[test]
    fn nan_values_compare_equal_and_sort_last() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert!(Value::Float(1.0) < Value::Float(f64::NAN));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn truncate_text_reaches_into_nested_tables() {
        let inner = Table::from_rows(["s"], vec![vec!["abcdef".into()]]).unwrap();
        let t = Table::from_rows(["t", "n"], vec![vec!["abcdef".into(), inner.into()]]).unwrap();
        let out = t.truncate_text(3);
        assert_eq!(out.get(0, "t"), Some(&Value::from("abc...")));
        let nested = out.get(0, "n").and_then(Value::as_table).unwrap();
        assert_eq!(nested.get(0, "s"), Some(&Value::from("abc...")));
    }

    #[test]
    fn display_aligns_columns() {
        let text = small().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# 3 x 2");
        assert_eq!(lines[1], "id  name");
        assert_eq!(lines[2], "1   a");
    }
}
