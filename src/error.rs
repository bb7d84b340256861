use anyhow::anyhow;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the browse, reshape and persistence layers.
///
/// Network and configuration failures are reported through `anyhow` by the
/// client; these variants survive inside such an `anyhow::Error` and can be
/// recovered with `downcast_ref::<popler::Error>()`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "no projects matched the criteria.\n\
         - Check that every column name in the expression is spelled correctly\n\
         - Check that the values you compare against exist in those columns (see `dictionary`)"
    )]
    EmptyResult,

    #[error("misspelled column name(s): {}", .columns.join(", "))]
    MisspelledColumn { columns: Vec<String> },

    #[error("conflicting filters: supply either a criteria expression or a keyword, not both")]
    ConflictingFilters,

    #[error("malformed expression: unknown column(s) {}", .columns.join(", "))]
    UnknownColumns { columns: Vec<String> },

    #[error("malformed expression at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("malformed expression: nested deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("table has no column named `{column}`")]
    MissingColumn { column: String },

    #[error("row {row} has {found} value(s) but the table has {expected} column(s)")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column name `{column}`")]
    DuplicateColumn { column: String },

    #[error("failed to {operation} {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a popler table file: {reason}", .path.display())]
    InvalidFormat { path: PathBuf, reason: String },
}

impl Error {
    /// True for the variants that report a malformed criteria expression.
    pub fn is_malformed_expression(&self) -> bool {
        matches!(
            self,
            Self::UnknownColumns { .. } | Self::Parse { .. } | Self::TooDeep { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<u16>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
    // Some endpoints respond with {"message":...} or {"error":...}
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

pub(crate) fn format_api_error(
    status: StatusCode,
    url: &str,
    e: &ApiErrorResponse,
) -> anyhow::Error {
    let title = e
        .title
        .as_deref()
        .or(e.message.as_deref())
        .or(e.error.as_deref())
        .unwrap_or("");
    let detail = e.detail.as_deref().unwrap_or("");
    let status_in_body = e.status.unwrap_or(status.as_u16());

    if status == StatusCode::NOT_FOUND {
        return anyhow!(
            "popler API endpoint not found (HTTP 404).\n- The API path may have changed, or the configured base URL is incorrect\n- Set POPLER_URL or `url:` in .poplerrc to override it\n\nServer message: {}\n{}\nrequest: {}",
            title,
            detail,
            url
        );
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return anyhow!(
            "popler API rate limit reached (HTTP 429) for url ({}).\n- Wait a moment and retry, or raise `sleep_max` on the client\n\nServer message: {}",
            url,
            title
        );
    }

    anyhow!(
        "API request failed: HTTP {} for url ({})\n{}\n{}",
        status_in_body,
        url,
        title,
        detail
    )
}
