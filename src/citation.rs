//! Citations and metadata links for catalog projects.

use std::collections::HashSet;

use crate::error::Result;
use crate::schema::Schema;
use crate::schema::fields::{AUTHORS, DOI, DOI_CITATION, LTERID, METALINK, STUDYENDYR, STUDYSTARTYR, TITLE};
use crate::table::{Table, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub key: Value,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub doi: Option<String>,
    /// Ready-to-paste reference text.
    pub text: String,
    /// `@misc` BibTeX entry.
    pub bibtex: String,
}

fn text_of(table: &Table, row: usize, column: &str) -> Option<String> {
    match table.get(row, column)? {
        Value::Null => None,
        Value::Text(s) if s.trim().is_empty() => None,
        v => Some(v.to_string().trim().to_string()),
    }
}

/// First row index of every distinct primary key, in table order.
fn first_rows(table: &Table) -> Result<Vec<usize>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (i, key) in table.column(Schema::popler().primary_key())?.enumerate() {
        if seen.insert(key) {
            out.push(i);
        }
    }
    Ok(out)
}

/// One citation per project of `table`.
///
/// The catalog's own `doi_citation` is used verbatim when present; otherwise
/// the text is assembled from authors, title, years, site and DOI.
pub fn citations(table: &Table) -> Result<Vec<Citation>> {
    let pk = Schema::popler().primary_key();
    first_rows(table)?
        .into_iter()
        .map(|i| {
            let key = table.get(i, pk).cloned().unwrap_or(Value::Null);
            let title = text_of(table, i, TITLE);
            let authors = text_of(table, i, AUTHORS);
            let doi = text_of(table, i, DOI).map(|d| normalize_doi(&d));
            let years = match (text_of(table, i, STUDYSTARTYR), text_of(table, i, STUDYENDYR)) {
                (Some(a), Some(b)) if a != b => Some(format!("{a}-{b}")),
                (Some(a), _) | (None, Some(a)) => Some(a),
                (None, None) => None,
            };
            let site = text_of(table, i, LTERID);

            let text = text_of(table, i, DOI_CITATION).unwrap_or_else(|| {
                let mut parts: Vec<String> = Vec::new();
                parts.push(authors.clone().unwrap_or_else(|| "Unknown authors".into()));
                if let Some(y) = &years {
                    parts.push(format!("({y})"));
                }
                let mut s = parts.join(" ");
                s.push_str(". ");
                s.push_str(title.as_deref().unwrap_or("Untitled dataset"));
                s.push('.');
                if let Some(site) = &site {
                    s.push_str(&format!(" {site} LTER."));
                }
                if let Some(doi) = &doi {
                    s.push_str(&format!(" https://doi.org/{doi}"));
                }
                s
            });

            let bibtex = bibtex_entry(&key, title.as_deref(), authors.as_deref(), years.as_deref(), doi.as_deref());

            Ok(Citation {
                key,
                title,
                authors,
                doi,
                text,
                bibtex,
            })
        })
        .collect()
}

fn normalize_doi(doi: &str) -> String {
    let d = doi.trim();
    for prefix in ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"] {
        if let Some(rest) = d.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    d.to_string()
}

fn bibtex_entry(
    key: &Value,
    title: Option<&str>,
    authors: Option<&str>,
    years: Option<&str>,
    doi: Option<&str>,
) -> String {
    let mut out = format!("@misc{{popler_{key},\n");
    let mut field = |name: &str, value: Option<&str>| {
        if let Some(v) = value {
            out.push_str(&format!("  {name} = {{{}}},\n", v.replace(['{', '}'], "")));
        }
    };
    field("title", title);
    // Catalog authors are `;`-separated; BibTeX wants `and`.
    let authors = authors.map(|a| {
        a.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" and ")
    });
    field("author", authors.as_deref());
    field("year", years.map(|y| y.split('-').next_back().unwrap_or(y)));
    field("doi", doi);
    out.push_str("  note = {Retrieved through the popler database}\n}");
    out
}

/// The `metalink` metadata page of every project of `table`.
pub fn metadata_urls(table: &Table) -> Result<Vec<(Value, Option<String>)>> {
    let pk = Schema::popler().primary_key();
    Ok(first_rows(table)?
        .into_iter()
        .map(|i| {
            (
                table.get(i, pk).cloned().unwrap_or(Value::Null),
                text_of(table, i, METALINK),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::fields::PROJECT_KEY;

    fn catalog() -> Table {
        Table::from_rows(
            [PROJECT_KEY, TITLE, AUTHORS, DOI, DOI_CITATION, LTERID, STUDYSTARTYR, STUDYENDYR, METALINK],
            vec![
                vec![
                    1.into(),
                    "Grassland plant cover".into(),
                    "Collins, S; Koerner, S".into(),
                    "doi:10.6073/pasta/abc".into(),
                    Value::Null,
                    "SEV".into(),
                    1999.into(),
                    2013.into(),
                    "https://portal.edirepository.org/1".into(),
                ],
                vec![
                    1.into(),
                    "Grassland plant cover".into(),
                    "Collins, S; Koerner, S".into(),
                    Value::Null,
                    Value::Null,
                    "SEV".into(),
                    1999.into(),
                    2013.into(),
                    "https://portal.edirepository.org/1".into(),
                ],
                vec![
                    2.into(),
                    "Kelp fish".into(),
                    Value::Null,
                    Value::Null,
                    "Reed, D. (2018). Kelp fish. SBC LTER.".into(),
                    "SBC".into(),
                    2000.into(),
                    2000.into(),
                    Value::Null,
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn one_citation_per_project() {
        let c = citations(&catalog()).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].key, Value::Int(1));
        assert_eq!(c[0].doi.as_deref(), Some("10.6073/pasta/abc"));
        assert_eq!(
            c[0].text,
            "Collins, S; Koerner, S (1999-2013). Grassland plant cover. SEV LTER. https://doi.org/10.6073/pasta/abc"
        );
    }

    #[test]
    fn catalog_citation_text_wins() {
        let c = citations(&catalog()).unwrap();
        assert_eq!(c[1].text, "Reed, D. (2018). Kelp fish. SBC LTER.");
    }

    #[test]
    fn bibtex_entries_split_authors() {
        let c = citations(&catalog()).unwrap();
        let bib = &c[0].bibtex;
        assert!(bib.starts_with("@misc{popler_1,"));
        assert!(bib.contains("author = {Collins, S and Koerner, S},"));
        assert!(bib.contains("title = {Grassland plant cover},"));
        assert!(bib.contains("year = {2013}"));
        assert!(bib.contains("doi = {10.6073/pasta/abc}"));
        assert!(bib.trim_end().ends_with('}'));
    }

    #[test]
    fn metadata_urls_per_project() {
        let urls = metadata_urls(&catalog()).unwrap();
        assert_eq!(
            urls,
            [
                (Value::Int(1), Some("https://portal.edirepository.org/1".to_string())),
                (Value::Int(2), None),
            ]
        );
    }

    #[test]
    fn tables_without_the_key_are_rejected() {
        let t = Table::from_rows([TITLE], vec![vec!["x".into()]]).unwrap();
        assert!(matches!(citations(&t).unwrap_err(), Error::MissingColumn { .. }));
    }
}
