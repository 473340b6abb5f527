//! OpenAlex API Client
//!
//! Fetches one page of `/works` results at a time, either by cursor or by
//! random seed. Records are returned as raw JSON; flattening happens later.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per-page=200` for maximum results per page
//! - Cursor paging starts at `*` and ends when `next_cursor` is null

use crate::error::{HarvestError, Result};
use crate::query::Query;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// OpenAlex API base URL
pub const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Cursor value that starts a paginated traversal
pub const START_CURSOR: &str = "*";

/// Fallback wait when a 429 carries no usable `Retry-After`
const DEFAULT_RATE_LIMIT_SECS: u64 = 1;

/// How the page is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging<'a> {
    /// Continue a cursor traversal
    Cursor(&'a str),
    /// Server-side random sample of `size` records
    Sample { seed: u32, size: usize },
}

/// One page request against `/works`.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub query: &'a Query,
    pub per_page: usize,
    pub paging: Paging<'a>,
}

/// Response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorksPage {
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub results: Vec<Value>,
}

/// Pagination metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    /// Total matching records according to the API
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Source of work pages. The retriever depends only on this trait.
#[allow(async_fn_in_trait)]
pub trait WorksApi {
    async fn fetch(&self, request: &PageRequest<'_>) -> Result<WorksPage>;
}

/// reqwest-backed OpenAlex client.
pub struct OpenAlexClient {
    client: Client,
    base_url: Url,
    mailto: Option<String>,
}

impl OpenAlexClient {
    /// Create a client against the public API.
    ///
    /// # Arguments
    ///
    /// * `mailto` - Contact email for the polite pool
    pub fn new(mailto: Option<String>) -> Result<Self> {
        Self::with_base_url(OPENALEX_API_BASE, mailto)
    }

    /// Create a client against a custom base URL (mirrors, test servers).
    ///
    /// A base with a path prefix (`http://host/api`) keeps it: requests go to
    /// `http://host/api/works`.
    pub fn with_base_url(base_url: &str, mailto: Option<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| HarvestError::Config(format!("Invalid base URL {:?}: {}", base_url, e)))?;
        // `Url::join` replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let user_agent = match &mailto {
            Some(email) => format!("oaharvest/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("oaharvest/{}", env!("CARGO_PKG_VERSION")),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            mailto,
        })
    }

    /// Build the `/works` URL for a page request.
    pub fn build_url(&self, request: &PageRequest<'_>) -> Result<Url> {
        let mut url = self
            .base_url
            .join("works")
            .map_err(|e| HarvestError::Config(format!("Invalid works URL: {}", e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("filter", &request.query.filter_expression());
            pairs.append_pair("per-page", &request.per_page.to_string());
            match &request.paging {
                Paging::Cursor(cursor) => {
                    pairs.append_pair("cursor", cursor);
                }
                Paging::Sample { seed, size } => {
                    pairs.append_pair("sample", &size.to_string());
                    pairs.append_pair("seed", &seed.to_string());
                }
            }
            if let Some(email) = &self.mailto {
                pairs.append_pair("mailto", email);
            }
        }

        Ok(url)
    }
}

impl WorksApi for OpenAlexClient {
    async fn fetch(&self, request: &PageRequest<'_>) -> Result<WorksPage> {
        let url = self.build_url(request)?;
        debug!(url = %url, "Fetching OpenAlex page");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_SECS);
            return Err(HarvestError::RateLimited(retry_after));
        }

        if !status.is_success() {
            return Err(HarvestError::Api {
                code: status.as_u16(),
                message: format!("OpenAlex API error: {}", status),
            });
        }

        let body = response.text().await?;
        parse_page(&body)
    }
}

/// Parse a `/works` response body.
pub fn parse_page(body: &str) -> Result<WorksPage> {
    serde_json::from_str(body)
        .map_err(|e| HarvestError::Parse(format!("Failed to parse OpenAlex response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_build_cursor_url() -> Result<()> {
        let client = OpenAlexClient::new(Some("me@example.com".to_string()))?;
        let query = Query::new("machine learning", Some(2020), Some(2021));
        let request = PageRequest {
            query: &query,
            per_page: 200,
            paging: Paging::Cursor(START_CURSOR),
        };

        let url = client.build_url(&request)?;
        assert_eq!(url.path(), "/works");
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&(
            "filter".into(),
            "title_and_abstract.search:machine learning,publication_year:2020-2021".into()
        )));
        assert!(pairs.contains(&("per-page".into(), "200".into())));
        assert!(pairs.contains(&("cursor".into(), "*".into())));
        assert!(pairs.contains(&("mailto".into(), "me@example.com".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "seed"));
        Ok(())
    }

    #[test]
    fn test_build_sample_url() -> Result<()> {
        let client = OpenAlexClient::with_base_url("http://localhost:8080/", None)?;
        let query = Query::new("x", None, None);
        let request = PageRequest {
            query: &query,
            per_page: 200,
            paging: Paging::Sample { seed: 42, size: 50 },
        };

        let url = client.build_url(&request)?;
        assert!(url.as_str().starts_with("http://localhost:8080/works?"));
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&("seed".into(), "42".into())));
        assert!(pairs.contains(&("sample".into(), "50".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "cursor" || k == "mailto"));
        Ok(())
    }

    #[test]
    fn test_base_url_path_prefix_is_kept() -> Result<()> {
        let query = Query::new("x", None, None);
        let request = PageRequest {
            query: &query,
            per_page: 25,
            paging: Paging::Cursor(START_CURSOR),
        };

        for base in ["http://localhost:8080/api", "http://localhost:8080/api/"] {
            let url = OpenAlexClient::with_base_url(base, None)?.build_url(&request)?;
            assert_eq!(url.path(), "/api/works", "base {}", base);
        }
        let client = OpenAlexClient::with_base_url("http://localhost:8080", None)?;
        assert_eq!(client.build_url(&request)?.path(), "/works");
        Ok(())
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            OpenAlexClient::with_base_url("not a url", None),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_parse_page() -> Result<()> {
        let body = r#"{
            "meta": {"count": 450, "next_cursor": "abc"},
            "results": [{"id": "W1"}, {"id": "W2"}]
        }"#;
        let page = parse_page(body)?;
        assert_eq!(page.meta.count, Some(450));
        assert_eq!(page.meta.next_cursor.as_deref(), Some("abc"));
        assert_eq!(page.results.len(), 2);

        let last = parse_page(r#"{"meta": {"count": 450, "next_cursor": null}, "results": []}"#)?;
        assert!(last.meta.next_cursor.is_none());
        assert!(last.results.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_page_malformed_is_retryable() {
        let err = parse_page("<html>busy</html>").err();
        assert!(err.is_some_and(|e| e.is_retryable()));
    }
}
