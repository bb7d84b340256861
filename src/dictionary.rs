use std::collections::BTreeSet;

use crate::error::Result;
use crate::nest::flatten;
use crate::schema::Schema;
use crate::table::{Table, Value};

/// Distinct values of one catalog column.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryEntry {
    pub column: String,
    /// Sorted, nulls excluded.
    pub values: Vec<Value>,
}

/// The distinct values each of `columns` takes in `table`.
///
/// Nested taxonomy cells are expanded first, so taxonomy columns can be
/// looked up on browsed tables too. Unknown names fail with
/// [`Error::MisspelledColumn`](crate::Error::MisspelledColumn).
pub fn dictionary<S: AsRef<str>>(
    table: &Table,
    schema: &Schema,
    columns: &[S],
) -> Result<Vec<DictionaryEntry>> {
    schema.validate(columns)?;
    let flat = flatten(table)?;

    columns
        .iter()
        .map(|c| -> Result<DictionaryEntry> {
            let values: BTreeSet<&Value> = flat
                .column(c.as_ref())?
                .filter(|v| !v.is_null())
                .collect();
            Ok(DictionaryEntry {
                column: c.as_ref().to_string(),
                values: values.into_iter().cloned().collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::nest::nest_taxonomy;
    use crate::schema::TaxonomySet;
    use crate::schema::fields::PROJECT_KEY;

    fn catalog() -> Table {
        Table::from_rows(
            [PROJECT_KEY, "lterid", "genus"],
            vec![
                vec![1.into(), "SEV".into(), "Poa".into()],
                vec![2.into(), "SBC".into(), Value::Null],
                vec![3.into(), "SEV".into(), "Larrea".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn sorted_distinct_values_without_nulls() {
        let d = dictionary(&catalog(), Schema::popler(), &["lterid", "genus"]).unwrap();
        assert_eq!(d[0].column, "lterid");
        assert_eq!(d[0].values, [Value::from("SBC"), Value::from("SEV")]);
        assert_eq!(d[1].values, [Value::from("Larrea"), Value::from("Poa")]);
    }

    #[test]
    fn nested_tables_are_looked_through() {
        let nested = nest_taxonomy(&catalog(), Schema::popler(), TaxonomySet::Default).unwrap();
        assert!(nested.get(0, "genus").and_then(Value::as_table).is_some());
        let d = dictionary(&nested, Schema::popler(), &["genus"]).unwrap();
        assert_eq!(d[0].values.len(), 2);
    }

    #[test]
    fn unknown_columns_are_misspelled() {
        let err = dictionary(&catalog(), Schema::popler(), &["lter"]).unwrap_err();
        assert!(matches!(err, Error::MisspelledColumn { .. }));
    }
}
