use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use crate::api::RecordsReply;
use crate::config::load_config;
use crate::error::{ApiErrorResponse, format_api_error};
use crate::schema::fields::PROJECT_KEY;
use crate::source::DataSource;
use crate::table::{Table, Value};
use crate::util::{backoff, retriable_status};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base popler API URL, by default [`DEFAULT_URL`](crate::DEFAULT_URL).
    pub url: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

/// Blocking client for the popler API.
#[derive(Debug, Clone)]
pub struct Client {
    url: String,

    timeout: Duration,
    retry_max: usize,
    sleep_max: Duration,

    http: HttpClient,
}

impl Client {
    /// Creates a client using environment variables and/or `.poplerrc`.
    ///
    /// This is equivalent to `Client::new(None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`verify` arguments
    /// - environment variables `POPLER_URL` / `POPLER_VERIFY`
    /// - config file from `POPLER_RC` or `.poplerrc`
    /// - the public endpoint
    pub fn new(url: Option<String>, verify: Option<bool>) -> Result<Self> {
        let cfg = load_config(url, verify)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("popler-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("popler-rs")),
        );
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = HttpClient::builder().default_headers(default_headers);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            url: cfg.url,
            timeout: Duration::from_secs(60),
            retry_max: 5,
            sleep_max: Duration::from_secs(30),
            http,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_sleep_max(mut self, sleep_max: Duration) -> Self {
        self.sleep_max = sleep_max;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn summary_url(&self) -> String {
        format!("{}/summary", self.url.trim_end_matches('/'))
    }

    pub(crate) fn project_url(&self, key: &Value) -> Result<String> {
        let base = format!("{}/data", self.url.trim_end_matches('/'));
        let url = Url::parse_with_params(&base, &[(PROJECT_KEY, key.to_string())])
            .with_context(|| format!("invalid popler API url {}", base))?;
        Ok(url.into())
    }

    /// Downloads every page of a record listing into one table.
    pub fn fetch_records(&self, url: &str) -> Result<Table> {
        let mut records = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.clone()) {
                bail!("pagination loop detected at {}", page_url);
            }
            tracing::debug!(url = %page_url, "GET");
            let reply: RecordsReply = self.api_json(&page_url)?;
            let (page, following) = reply.into_parts(&page_url);
            records.extend(page);
            next = following;
        }

        Ok(Table::from_records(records))
    }

    fn api_json<TResp: DeserializeOwned>(&self, url: &str) -> Result<TResp> {
        let resp = self.robust_request(|| self.http.get(url).timeout(self.timeout).send())?;

        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            // Try to parse API error payloads for actionable messages.
            if let Ok(err_json) = serde_json::from_str::<ApiErrorResponse>(&text) {
                return Err(format_api_error(status, url, &err_json));
            }

            bail!(
                "API request failed: HTTP {} for url ({})\n{}",
                status,
                url,
                text
            );
        }

        serde_json::from_str::<TResp>(&text)
            .with_context(|| format!("failed to parse API JSON (url={}, status={})", url, status))
    }

    fn robust_request<F>(&self, mut f: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let mut tries = 0usize;
        let mut sleep = Duration::from_secs(1);
        loop {
            let result = f();

            match result {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) {
                        tries += 1;
                        if tries >= self.retry_max {
                            return Ok(resp);
                        }
                        tracing::warn!(status = %resp.status(), tries, "retrying request");
                        thread::sleep(sleep);
                        sleep = backoff(sleep, self.sleep_max);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    tries += 1;
                    if tries >= self.retry_max {
                        return Err(err).context("could not connect to the popler API");
                    }
                    // timeouts / transient connection errors
                    tracing::warn!(error = %err, tries, "retrying request");
                    thread::sleep(sleep);
                    sleep = backoff(sleep, self.sleep_max);
                }
            }
        }
    }
}

impl DataSource for Client {
    fn source_id(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }

    fn fetch_metadata(&self) -> Result<Table> {
        self.fetch_records(&self.summary_url())
    }

    fn fetch_project(&self, key: &Value) -> Result<Table> {
        self.fetch_records(&self.project_url(key)?)
            .with_context(|| format!("failed to download project {}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls() {
        let client = Client::new(Some("https://example.org/api/".into()), None).unwrap();
        assert_eq!(client.summary_url(), "https://example.org/api/summary");
        assert_eq!(
            client.project_url(&Value::Int(12)).unwrap(),
            "https://example.org/api/data?proj_metadata_key=12"
        );
    }

    #[test]
    fn project_keys_are_query_encoded() {
        let client = Client::new(Some("https://example.org/api".into()), None).unwrap();
        assert_eq!(
            client.project_url(&Value::from("a b&c")).unwrap(),
            "https://example.org/api/data?proj_metadata_key=a+b%26c"
        );
    }

    #[test]
    fn unparsable_base_url_is_reported() {
        let client = Client::new(Some("not a url".into()), None).unwrap();
        assert!(client.project_url(&Value::Int(1)).is_err());
    }

    #[test]
    fn retry_max_is_at_least_one() {
        let client = Client::new(Some("http://localhost".into()), None)
            .unwrap()
            .with_retry_max(0);
        assert_eq!(client.retry_max, 1);
    }
}
