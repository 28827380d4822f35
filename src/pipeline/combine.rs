use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::TOP_MARKETS;
use crate::pipeline::summary::summarize;
use crate::types::{CombinedSummary, MarketSnapshot, Platform, SummaryStats};

/// One platform's last published result, as read back from the cache.
#[derive(Debug, Clone)]
pub struct PlatformView {
    pub platform: Platform,
    pub markets: Vec<MarketSnapshot>,
    pub summary: Option<SummaryStats>,
}

#[derive(Debug, Clone)]
pub struct Combined {
    pub markets: Vec<MarketSnapshot>,
    pub summary: CombinedSummary,
}

/// Union of the platform sets with per-platform totals taken from each platform's
/// own summary. The recomputation over the union only fills in for a platform
/// whose summary is missing or all zero. Categories always come from the union.
pub fn combine(views: Vec<PlatformView>, now: DateTime<Utc>) -> Combined {
    let authoritative: Vec<(Platform, Option<SummaryStats>)> =
        views.iter().map(|v| (v.platform, v.summary.clone())).collect();
    let markets: Vec<MarketSnapshot> = views.into_iter().flat_map(|v| v.markets).collect();

    let mut stats = summarize(&markets);
    for platform in Platform::ALL {
        let own = authoritative
            .iter()
            .find(|(p, _)| *p == platform)
            .and_then(|(_, s)| s.as_ref())
            .map(|s| s.platform(platform))
            .filter(|t| !t.is_zero());
        match own {
            Some(totals) => stats.override_platform(platform, totals),
            None => debug!(platform = %platform, "No authoritative summary, using recomputed totals"),
        }
    }
    stats.active_markets = stats.by_platform.values().map(|t| t.active).sum();

    let mut top_markets = markets.clone();
    top_markets.sort_by(|a, b| {
        b.volume_24h.unwrap_or(0.0).total_cmp(&a.volume_24h.unwrap_or(0.0))
    });
    top_markets.truncate(TOP_MARKETS);
    let hottest_market = top_markets.first().cloned();

    info!(
        markets = markets.len(),
        active = stats.active_markets,
        vol_24h = stats.total_volume_24h,
        oi = stats.total_open_interest,
        "Combined view: {} markets, vol24h=${:.0}, OI=${:.0}",
        stats.active_markets,
        stats.total_volume_24h,
        stats.total_open_interest,
    );

    Combined {
        markets,
        summary: CombinedSummary { stats, top_markets, hottest_market, generated_at: now },
    }
}
