//! Trade-activity aggregation: per-condition-id 24h USD volume, trade count and
//! last trade time, from a paginated GraphQL trade feed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{PageLimits, ACTIVITY_WINDOW_SECS, FIXED_POINT_SCALE};
use crate::error::{AppError, Result};
use crate::feeds::gql::GqlClient;
use crate::feeds::Pager;
use crate::util::{coerce_number, condition_id_from_asset_id, parse_timestamp};

/// One known shape of the trade feed: root field plus column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySchema {
    pub name: &'static str,
    pub root: &'static str,
    pub asset_field: &'static str,
    pub price_field: &'static str,
    pub size_field: &'static str,
    pub timestamp_field: &'static str,
}

/// Probed in order; the first one returning rows is used for the whole run.
pub const ACTIVITY_SCHEMAS: &[ActivitySchema] = &[
    ActivitySchema {
        name: "trades",
        root: "trades",
        asset_field: "makerAssetId",
        price_field: "price",
        size_field: "size",
        timestamp_field: "timestamp",
    },
    ActivitySchema {
        name: "fills",
        root: "fills",
        asset_field: "makerAssetId",
        price_field: "price",
        size_field: "amount",
        timestamp_field: "timestamp",
    },
    ActivitySchema {
        name: "order_filled_events",
        root: "orderFilledEvents",
        asset_field: "makerAssetId",
        price_field: "price",
        size_field: "makerAmountFilled",
        timestamp_field: "timestamp",
    },
];

impl ActivitySchema {
    /// Server-side `timestamp >= since` filter with a stable descending sort.
    pub fn query(&self) -> String {
        format!(
            "query Trades($since: BigInt!, $first: Int!, $skip: Int!) {{ \
             {root}(first: $first, skip: $skip, orderBy: {ts}, orderDirection: desc, \
             where: {{ {ts}_gte: $since }}) {{ {asset} {price} {size} {ts} }} }}",
            root = self.root,
            ts = self.timestamp_field,
            asset = self.asset_field,
            price = self.price_field,
            size = self.size_field,
        )
    }
}

#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// One page of trade rows with `timestamp >= since` (epoch seconds).
    async fn fetch_trades(
        &self,
        schema: &ActivitySchema,
        since: i64,
        first: usize,
        skip: usize,
    ) -> Result<Vec<Value>>;
}

pub struct GraphQlActivityFeed {
    gql: GqlClient,
}

impl GraphQlActivityFeed {
    pub fn new(gql: GqlClient) -> Self {
        Self { gql }
    }
}

#[async_trait]
impl ActivityFeed for GraphQlActivityFeed {
    async fn fetch_trades(
        &self,
        schema: &ActivitySchema,
        since: i64,
        first: usize,
        skip: usize,
    ) -> Result<Vec<Value>> {
        let mut data = self
            .gql
            .query(
                &schema.query(),
                json!({ "since": since.to_string(), "first": first, "skip": skip }),
            )
            .await?;
        match data.get_mut(schema.root).map(Value::take) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(AppError::GraphQl(format!("no `{}` array in response", schema.root))),
        }
    }
}

// ---------------------------------------------------------------------------
// ActivityWindow
// ---------------------------------------------------------------------------

/// Trailing-24h aggregation keyed by condition id.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    pub since: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub by_market_usd: HashMap<String, f64>,
    pub by_market_count: HashMap<String, u64>,
    pub by_last_trade_ts: HashMap<String, DateTime<Utc>>,
    pub schema: Option<&'static str>,
    pub rows_scanned: usize,
    pub rows_skipped: usize,
}

impl ActivityWindow {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            since: now - Duration::seconds(ACTIVITY_WINDOW_SECS),
            now,
            by_market_usd: HashMap::new(),
            by_market_count: HashMap::new(),
            by_last_trade_ts: HashMap::new(),
            schema: None,
            rows_scanned: 0,
            rows_skipped: 0,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.since && ts <= self.now
    }

    /// Fold one trade row in. Returns false when the row was skipped.
    pub fn record(&mut self, schema: &ActivitySchema, row: &Value) -> bool {
        self.rows_scanned += 1;
        let accepted = self.accumulate(schema, row);
        if !accepted {
            self.rows_skipped += 1;
        }
        accepted
    }

    fn accumulate(&mut self, schema: &ActivitySchema, row: &Value) -> bool {
        let Some(cid) = row
            .get(schema.asset_field)
            .and_then(Value::as_str)
            .and_then(condition_id_from_asset_id)
        else {
            return false;
        };
        let (Some(price), Some(size)) = (
            row.get(schema.price_field).and_then(coerce_number),
            row.get(schema.size_field).and_then(coerce_number),
        ) else {
            return false;
        };
        // The upstream filter is not trusted to be exact.
        let Some(ts) = row.get(schema.timestamp_field).and_then(parse_timestamp) else {
            return false;
        };
        if !self.contains(ts) {
            return false;
        }

        let usd = (price / FIXED_POINT_SCALE) * (size / FIXED_POINT_SCALE);
        if usd <= 0.0 {
            return false;
        }

        *self.by_market_usd.entry(cid.clone()).or_insert(0.0) += usd;
        *self.by_market_count.entry(cid.clone()).or_insert(0) += 1;
        self.by_last_trade_ts
            .entry(cid)
            .and_modify(|last| *last = (*last).max(ts))
            .or_insert(ts);
        true
    }

    /// Authoritative platform volume: the sum over every condition id seen.
    pub fn total_usd(&self) -> f64 {
        self.by_market_usd.values().sum()
    }

    /// Condition ids in a stable order, for deterministic downstream output.
    pub fn condition_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_market_usd.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// Schema discovery + pagination
// ---------------------------------------------------------------------------

/// First schema candidate whose probe returns rows.
///
/// `Ok(None)`: every probe failed at the transport level, the feed is unavailable.
/// `Err(ActivitySchemaMismatch)`: the server answered but no candidate produced rows.
pub async fn probe_schema(
    feed: &dyn ActivityFeed,
    since: i64,
    probe_size: usize,
) -> Result<Option<&'static ActivitySchema>> {
    let mut answered = false;
    let mut tried = Vec::with_capacity(ACTIVITY_SCHEMAS.len());

    for schema in ACTIVITY_SCHEMAS {
        match feed.fetch_trades(schema, since, probe_size.max(1), 0).await {
            Ok(rows) if !rows.is_empty() => {
                info!(schema = schema.name, "Activity feed schema selected");
                return Ok(Some(schema));
            }
            Ok(_) => {
                answered = true;
                debug!(schema = schema.name, "Activity probe returned no rows");
                tried.push(format!("{}: empty", schema.name));
            }
            Err(e) => {
                answered |= !e.is_transport();
                debug!(schema = schema.name, "Activity probe failed: {e}");
                tried.push(format!("{}: {e}", schema.name));
            }
        }
    }

    if answered {
        Err(AppError::ActivitySchemaMismatch(tried.join("; ")))
    } else {
        warn!("Activity feed unreachable for every schema candidate: {}", tried.join("; "));
        Ok(None)
    }
}

/// Probe, then page through the trailing 24h window.
/// `Ok(None)` means the feed is unavailable and callers fall back to catalog volume.
pub async fn collect_activity(
    feed: &dyn ActivityFeed,
    limits: PageLimits,
    probe_size: usize,
    now: DateTime<Utc>,
) -> Result<Option<ActivityWindow>> {
    let mut window = ActivityWindow::new(now);
    let since = window.since.timestamp();

    let Some(schema) = probe_schema(feed, since, probe_size).await? else {
        return Ok(None);
    };
    window.schema = Some(schema.name);

    let mut pager = Pager::new(limits);
    while let Some((first, skip)) = pager.next_request() {
        match feed.fetch_trades(schema, since, first, skip).await {
            Ok(rows) => {
                for row in &rows {
                    window.record(schema, row);
                }
                pager.record_page(first, rows.len());
            }
            Err(e) => {
                warn!(skip, "Activity page failed, keeping {} rows scanned so far: {e}", pager.scanned());
                pager.stop();
            }
        }
    }
    if pager.hit_cap() {
        warn!(max_rows = limits.max_rows, "Activity pagination stopped at row cap");
    }

    info!(
        schema = schema.name,
        rows = window.rows_scanned,
        skipped = window.rows_skipped,
        markets = window.by_market_usd.len(),
        volume_usd = window.total_usd(),
        "Activity window aggregated: {} markets, ${:.0} over 24h",
        window.by_market_usd.len(),
        window.total_usd(),
    );
    Ok(Some(window))
}
