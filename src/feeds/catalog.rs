use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::feeds::gql::preview;
use crate::normalize::fields::{extract_records, first_string};
use crate::normalize::{kalshi::KALSHI, polymarket::POLYMARKET};

/// Mandatory market catalog. Returns every fetched record as one JSON array.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Value>;
}

/// Polymarket Gamma `/markets`, offset-paged.
pub struct GammaCatalog {
    http: reqwest::Client,
    url: String,
    page_size: usize,
    max_pages: usize,
}

impl GammaCatalog {
    pub fn new(http: reqwest::Client, url: String, page_size: usize, max_pages: usize) -> Self {
        Self { http, url, page_size: page_size.max(1), max_pages: max_pages.max(1) }
    }
}

#[async_trait]
impl CatalogSource for GammaCatalog {
    async fn fetch_catalog(&self) -> Result<Value> {
        let mut records = Vec::new();

        for page_idx in 0..self.max_pages {
            let offset = page_idx * self.page_size;
            let req = self
                .http
                .get(&self.url)
                .query(&[("limit", self.page_size), ("offset", offset)]);
            let page = get_json(req).await?;

            if !page.is_array() && !has_wrapper(&page, POLYMARKET.wrappers) {
                return Err(AppError::Upstream(format!(
                    "Polymarket catalog page {page_idx} has no recognizable market list"
                )));
            }
            let items = extract_records(&page, POLYMARKET.wrappers);
            debug!(page = page_idx, offset, rows = items.len(), "Polymarket catalog page");
            let short = items.len() < self.page_size;
            records.extend_from_slice(items);
            if short {
                break;
            }
        }

        info!(markets = records.len(), "Polymarket catalog fetched");
        Ok(Value::Array(records))
    }
}

/// Kalshi `/markets`, cursor-paged up to `max_pages`.
pub struct KalshiCatalog {
    http: reqwest::Client,
    url: String,
    max_pages: usize,
}

impl KalshiCatalog {
    pub fn new(http: reqwest::Client, url: String, max_pages: usize) -> Self {
        Self { http, url, max_pages: max_pages.max(1) }
    }
}

#[async_trait]
impl CatalogSource for KalshiCatalog {
    async fn fetch_catalog(&self) -> Result<Value> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for page_idx in 0..self.max_pages {
            let mut req = self.http.get(&self.url);
            if let Some(c) = &cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }
            let page = get_json(req).await?;
            if !page.is_array() && !has_wrapper(&page, KALSHI.wrappers) {
                return Err(AppError::Upstream(format!(
                    "Kalshi catalog page {page_idx} has no recognizable market list"
                )));
            }
            records.extend_from_slice(extract_records(&page, KALSHI.wrappers));

            cursor = next_cursor(&page);
            if cursor.is_none() {
                break;
            }
        }

        info!(markets = records.len(), "Kalshi catalog fetched");
        Ok(Value::Array(records))
    }
}

/// Next-page cursor under any of the spellings Kalshi has used. Empty means done.
pub fn next_cursor(page: &Value) -> Option<String> {
    first_string(page, &["cursor", "next", "next_cursor"])
}

/// True when one of the wrapper paths leads to an array, even an empty one.
fn has_wrapper(page: &Value, wrappers: &[&str]) -> bool {
    wrappers.iter().any(|w| {
        let mut cur = page;
        for seg in w.split('.') {
            match cur.get(seg) {
                Some(next) => cur = next,
                None => return false,
            }
        }
        cur.is_array()
    })
}

async fn get_json(req: reqwest::RequestBuilder) -> Result<Value> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AppError::Upstream(format!("HTTP {status} :: {}", preview(&body))));
    }
    let text = resp.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::Upstream(format!("unparseable catalog body ({e}): {}", preview(&text))))
}
