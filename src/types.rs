use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Polymarket,
    Kalshi,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Polymarket, Platform::Kalshi];

    /// Short prefix used both in snapshot ids (`poly_...`) and cache keys (`hot:poly:...`).
    pub fn prefix(self) -> &'static str {
        match self {
            Platform::Polymarket => "poly",
            Platform::Kalshi => "kalshi",
        }
    }

    pub fn markets_key(self) -> String {
        format!("hot:{}:markets", self.prefix())
    }

    pub fn summary_key(self) -> String {
        format!("hot:{}:summary", self.prefix())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Polymarket => "polymarket",
            Platform::Kalshi => "kalshi",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Platform {
    type Err = String;

    /// Accepts both the full name and the short prefix.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polymarket" | "poly" => Ok(Platform::Polymarket),
            "kalshi" => Ok(Platform::Kalshi),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

pub const COMBINED_MARKETS_KEY: &str = "hot:combined:markets";
pub const COMBINED_SUMMARY_KEY: &str = "hot:combined:summary";

pub const UNCATEGORIZED: &str = "uncategorized";

// ---------------------------------------------------------------------------
// MarketSnapshot
// ---------------------------------------------------------------------------

/// Canonical per-market record. `id` is platform-namespaced and is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub id: String,
    pub platform: Platform,
    pub question: String,
    pub category: String,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub open_interest: Option<f64>,
    pub last_trade_ts: Option<DateTime<Utc>>,
    /// Upstream payload and derived join keys. Never serialized to the cache.
    #[serde(skip)]
    pub raw: RawPayload,
}

impl MarketSnapshot {
    pub fn condition_id(&self) -> Option<&str> {
        self.raw.condition_id.as_deref()
    }
}

/// Original upstream record plus the identifiers derived from it during normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub payload: serde_json::Value,
    pub condition_id: Option<String>,
    pub source_market_id: Option<u64>,
    pub event_id: Option<String>,
}

// ---------------------------------------------------------------------------
// SummaryStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformTotals {
    pub active: usize,
    pub vol_24h: f64,
    pub oi: f64,
}

impl PlatformTotals {
    pub fn is_zero(&self) -> bool {
        self.active == 0 && self.vol_24h == 0.0 && self.oi == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub vol_24h: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub active_markets: usize,
    pub total_volume_24h: f64,
    pub total_open_interest: f64,
    pub by_platform: BTreeMap<Platform, PlatformTotals>,
    /// Sorted by `vol24h` descending; ties keep first-seen order.
    pub by_category: Vec<CategoryStats>,
}

impl SummaryStats {
    pub fn platform(&self, platform: Platform) -> PlatformTotals {
        self.by_platform.get(&platform).copied().unwrap_or_default()
    }

    /// Replace one platform's entry and re-derive the totals from `by_platform`,
    /// so totals and per-platform entries cannot drift apart.
    pub fn override_platform(&mut self, platform: Platform, totals: PlatformTotals) {
        self.by_platform.insert(platform, totals);
        self.total_volume_24h = self.by_platform.values().map(|t| t.vol_24h).sum();
        self.total_open_interest = self.by_platform.values().map(|t| t.oi).sum();
    }
}

/// `hot:combined:summary` payload: the union's `SummaryStats` plus dashboard extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSummary {
    #[serde(flatten)]
    pub stats: SummaryStats,
    pub top_markets: Vec<MarketSnapshot>,
    pub hottest_market: Option<MarketSnapshot>,
    pub generated_at: DateTime<Utc>,
}
