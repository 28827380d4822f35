use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{PageLimits, FIXED_POINT_SCALE};
use crate::error::{AppError, Result};
use crate::feeds::gql::GqlClient;
use crate::feeds::Pager;
use crate::util::{coerce_number, condition_id_in};

const OPEN_INTEREST_QUERY: &str = "query OpenInterest($first: Int!, $skip: Int!) { \
     marketOpenInterests(first: $first, skip: $skip, orderBy: id) { id amount } }";

#[async_trait]
pub trait OpenInterestFeed: Send + Sync {
    /// One page of `{id, amount}` records.
    async fn fetch_page(&self, first: usize, skip: usize) -> Result<Vec<Value>>;
}

pub struct GraphQlOpenInterestFeed {
    gql: GqlClient,
}

impl GraphQlOpenInterestFeed {
    pub fn new(gql: GqlClient) -> Self {
        Self { gql }
    }
}

#[async_trait]
impl OpenInterestFeed for GraphQlOpenInterestFeed {
    async fn fetch_page(&self, first: usize, skip: usize) -> Result<Vec<Value>> {
        let mut data = self
            .gql
            .query(OPEN_INTEREST_QUERY, json!({ "first": first, "skip": skip }))
            .await?;
        match data.get_mut("marketOpenInterests").map(Value::take) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(AppError::GraphQl("no `marketOpenInterests` array in response".into())),
        }
    }
}

/// `(condition id, USD amount)` for one record, or None when it is malformed.
pub fn parse_record(row: &Value) -> Option<(String, f64)> {
    let cid = row.get("id").and_then(Value::as_str).and_then(condition_id_in)?;
    let amount = row.get("amount").and_then(coerce_number)?;
    Some((cid, amount / FIXED_POINT_SCALE))
}

/// Condition id → USD open interest. Never fails: an unconfigured feed or a failing
/// first page yields an empty map, which callers report as zero open interest.
pub async fn collect_open_interest(
    feed: Option<&dyn OpenInterestFeed>,
    limits: PageLimits,
) -> HashMap<String, f64> {
    let mut by_market = HashMap::new();
    let Some(feed) = feed else {
        warn!("Open-interest feed not configured, reporting OI as 0");
        return by_market;
    };

    let mut pager = Pager::new(limits);
    let mut skipped = 0usize;
    while let Some((first, skip)) = pager.next_request() {
        match feed.fetch_page(first, skip).await {
            Ok(rows) => {
                for row in &rows {
                    match parse_record(row) {
                        // An id can repeat across outcome positions; sum them.
                        Some((cid, usd)) => *by_market.entry(cid).or_insert(0.0) += usd,
                        None => {
                            skipped += 1;
                            debug!(record = %row, "Skipping malformed open-interest record");
                        }
                    }
                }
                pager.record_page(first, rows.len());
            }
            Err(e) => {
                warn!(skip, "Open-interest page failed, keeping {} rows scanned so far: {e}", pager.scanned());
                pager.stop();
            }
        }
    }
    if pager.hit_cap() {
        warn!(max_rows = limits.max_rows, "Open-interest pagination stopped at row cap");
    }

    let total: f64 = by_market.values().sum();
    info!(
        rows = pager.scanned(),
        skipped,
        markets = by_market.len(),
        oi_usd = total,
        "Open interest collected: {} markets, ${:.0}",
        by_market.len(),
        total,
    );
    by_market
}
