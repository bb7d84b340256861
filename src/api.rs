use serde_json::{Map, Value};

use crate::util::urljoin;

pub(crate) type Record = Map<String, Value>;

/// Record listings come either as a bare array or as a page object with a
/// link to the next page.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum RecordsReply {
    Page {
        #[serde(alias = "data", alias = "records")]
        results: Vec<Record>,
        #[serde(default, alias = "next_page")]
        next: Option<String>,
        #[serde(default)]
        count: Option<u64>,
    },
    Bare(Vec<Record>),
}

impl RecordsReply {
    /// Splits the reply into its records and the absolute URL of the next
    /// page, if any.
    pub(crate) fn into_parts(self, url: &str) -> (Vec<Record>, Option<String>) {
        match self {
            RecordsReply::Bare(records) => (records, None),
            RecordsReply::Page {
                results,
                next,
                count,
            } => {
                if let Some(count) = count {
                    tracing::debug!(url, count, page = results.len(), "received page");
                }
                let next = next
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .map(|n| urljoin(url, &n));
                (results, next)
            }
        }
    }
}
