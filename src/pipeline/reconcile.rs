//! Merges catalog snapshots with the activity and open-interest feeds into one
//! platform snapshot set plus its authoritative summary.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::feeds::activity::ActivityWindow;
use crate::pipeline::summary::summarize;
use crate::types::{MarketSnapshot, Platform, PlatformTotals, RawPayload, SummaryStats, UNCATEGORIZED};

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub platform: Platform,
    pub snapshots: Vec<MarketSnapshot>,
    pub summary: SummaryStats,
    pub catalog_size: usize,
    pub duplicates_dropped: usize,
    pub stubs_created: usize,
    pub stale_dropped: usize,
}

/// `activity == None` means the activity feed is absent: catalog volume is kept and
/// no active-window filter is applied. `open_interest == None` means the platform has
/// no OI feed at all; `Some(empty)` means the feed was expected but yielded nothing,
/// which reports OI as zero.
pub fn reconcile(
    platform: Platform,
    catalog: Vec<MarketSnapshot>,
    activity: Option<&ActivityWindow>,
    open_interest: Option<&HashMap<String, f64>>,
) -> Reconciled {
    let catalog_size = catalog.len();
    let mut snapshots = dedupe_by_id(catalog);
    let duplicates_dropped = catalog_size - snapshots.len();
    if duplicates_dropped > 0 {
        debug!(platform = %platform, duplicates_dropped, "Dropped repeated catalog ids");
    }

    let catalog_cids: HashSet<String> = snapshots
        .iter()
        .filter_map(|s| s.condition_id().map(str::to_string))
        .collect();

    let mut stubs_created = 0;
    if let Some(window) = activity {
        for cid in window.condition_ids() {
            if !catalog_cids.contains(cid) {
                snapshots.push(stub(platform, cid));
                stubs_created += 1;
            }
        }
        apply_activity(&mut snapshots, window);
    }

    let oi_total = open_interest.map(|oi| apply_open_interest(&mut snapshots, oi));

    let before_filter = snapshots.len();
    if let Some(window) = activity {
        snapshots.retain(|s| s.last_trade_ts.is_some_and(|ts| window.contains(ts)));
    }
    let stale_dropped = before_filter - snapshots.len();

    let mut summary = summarize(&snapshots);
    let naive = summary.platform(platform);
    let authoritative = PlatformTotals {
        active: snapshots.len(),
        vol_24h: activity.map_or(naive.vol_24h, ActivityWindow::total_usd),
        oi: oi_total.unwrap_or(naive.oi),
    };
    summary.override_platform(platform, authoritative);

    info!(
        platform = %platform,
        catalog = catalog_size,
        stubs = stubs_created,
        stale_dropped,
        active = authoritative.active,
        vol_24h = authoritative.vol_24h,
        oi = authoritative.oi,
        "Reconciled {} markets: {} active, vol24h=${:.0}, OI=${:.0}",
        platform,
        authoritative.active,
        authoritative.vol_24h,
        authoritative.oi,
    );

    Reconciled {
        platform,
        snapshots,
        summary,
        catalog_size,
        duplicates_dropped,
        stubs_created,
        stale_dropped,
    }
}

/// Ids must be unique within a platform set; offset paging can repeat a record.
fn dedupe_by_id(catalog: Vec<MarketSnapshot>) -> Vec<MarketSnapshot> {
    let mut seen = HashSet::with_capacity(catalog.len());
    catalog.into_iter().filter(|s| seen.insert(s.id.clone())).collect()
}

/// Market seen only in the activity feed.
fn stub(platform: Platform, cid: &str) -> MarketSnapshot {
    MarketSnapshot {
        id: format!("{}_cid_{cid}", platform.prefix()),
        platform,
        question: cid.to_string(),
        category: UNCATEGORIZED.to_string(),
        yes_price: None,
        no_price: None,
        volume_24h: None,
        open_interest: None,
        last_trade_ts: None,
        raw: RawPayload {
            condition_id: Some(cid.to_string()),
            ..Default::default()
        },
    }
}

/// Activity is authoritative for volume and for the last trade time: snapshots
/// without a match get zero volume and no recent trade.
fn apply_activity(snapshots: &mut [MarketSnapshot], window: &ActivityWindow) {
    for snap in snapshots.iter_mut() {
        let cid = snap.raw.condition_id.as_deref();
        snap.volume_24h = Some(cid.and_then(|c| window.by_market_usd.get(c)).copied().unwrap_or(0.0));
        snap.last_trade_ts = cid.and_then(|c| window.by_last_trade_ts.get(c)).copied();
    }
}

/// Overwrites OI where the feed has the condition id and returns the platform
/// total over every condition id present in the set.
fn apply_open_interest(snapshots: &mut [MarketSnapshot], oi: &HashMap<String, f64>) -> f64 {
    let mut matched: HashSet<&str> = HashSet::new();
    for snap in snapshots.iter_mut() {
        let Some((cid, amount)) = snap.raw.condition_id.as_deref().and_then(|c| oi.get_key_value(c))
        else {
            continue;
        };
        snap.open_interest = Some(*amount);
        matched.insert(cid.as_str());
    }
    matched.iter().filter_map(|cid| oi.get(*cid)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::activity::tests::{now, trade, CID_A, CID_B};
    use crate::feeds::activity::ACTIVITY_SCHEMAS;
    use crate::normalize::normalize_polymarket;
    use chrono::Duration;
    use serde_json::json;

    fn window(rows: &[serde_json::Value]) -> ActivityWindow {
        let mut w = ActivityWindow::new(now());
        for row in rows {
            w.record(&ACTIVITY_SCHEMAS[0], row);
        }
        w
    }

    fn catalog() -> Vec<MarketSnapshot> {
        normalize_polymarket(&json!([
            {"id": "1", "question": "A?", "conditionId": CID_A, "volume24hr": 999, "openInterest": 5,
             "updatedAt": "2025-03-01T11:00:00Z", "category": "Crypto"},
            {"id": "2", "question": "No cid?", "volume24hr": 7}
        ]))
    }

    #[test]
    fn quiet_catalog_market_is_filtered_out() {
        let w = window(&[]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&HashMap::new()));
        assert!(out.snapshots.is_empty());
        assert_eq!(out.stale_dropped, 2);
        assert_eq!(out.summary.active_markets, 0);
        assert_eq!(out.summary.platform(Platform::Polymarket).active, 0);
    }

    #[test]
    fn unmatched_activity_creates_stub() {
        let w = window(&[trade(CID_B, 500_000, 2_000_000, 60)]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&HashMap::new()));
        assert_eq!(out.stubs_created, 1);
        assert_eq!(out.snapshots.len(), 1);
        let stub = &out.snapshots[0];
        assert_eq!(stub.id, format!("poly_cid_{CID_B}"));
        assert_eq!(stub.question, CID_B);
        assert_eq!(stub.category, UNCATEGORIZED);
        assert_eq!(stub.volume_24h, Some(1.0));
        assert_eq!(stub.yes_price, None);
        assert_eq!(out.summary.total_volume_24h, 1.0);
    }

    #[test]
    fn matched_activity_overrides_catalog_volume() {
        let w = window(&[
            trade(CID_A, 500_000, 4_000_000, 120),
            trade(CID_A, 500_000, 2_000_000, 30),
        ]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&HashMap::new()));
        assert_eq!(out.stubs_created, 0);
        assert_eq!(out.snapshots.len(), 1);
        let m = &out.snapshots[0];
        assert_eq!(m.id, "poly_1");
        assert_eq!(m.volume_24h, Some(3.0));
        assert_eq!(m.last_trade_ts, Some(now() - Duration::seconds(30)));
        assert_eq!(out.summary.by_category[0].category, "Crypto");
    }

    #[test]
    fn open_interest_is_authoritative_when_present() {
        let w = window(&[trade(CID_A, 1_000_000, 1_000_000, 10)]);
        let oi = HashMap::from([(CID_A.to_string(), 42.0), (CID_B.to_string(), 1000.0)]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&oi));
        assert_eq!(out.snapshots[0].open_interest, Some(42.0));
        // CID_B is in neither the catalog nor the activity feed
        assert_eq!(out.summary.platform(Platform::Polymarket).oi, 42.0);
        assert_eq!(out.summary.total_open_interest, 42.0);
    }

    #[test]
    fn empty_open_interest_reports_zero() {
        let w = window(&[trade(CID_A, 1_000_000, 1_000_000, 10)]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&HashMap::new()));
        assert_eq!(out.summary.platform(Platform::Polymarket).oi, 0.0);
        assert_eq!(out.summary.total_open_interest, 0.0);
    }

    #[test]
    fn absent_activity_keeps_catalog_volume_and_skips_filter() {
        let out = reconcile(Platform::Polymarket, catalog(), None, Some(&HashMap::new()));
        assert_eq!(out.snapshots.len(), 2);
        assert_eq!(out.stale_dropped, 0);
        assert_eq!(out.summary.total_volume_24h, 1006.0);
        assert_eq!(out.summary.total_open_interest, 0.0);
    }

    #[test]
    fn kalshi_without_feeds_uses_naive_sums() {
        let catalog = crate::normalize::normalize_kalshi(&json!({"markets": [
            {"ticker": "A", "volume_24h": 10, "open_interest": 3},
            {"ticker": "B", "volume_24h": 5, "open_interest": 1},
            {"ticker": "A", "volume_24h": 10, "open_interest": 3}
        ]}));
        let out = reconcile(Platform::Kalshi, catalog, None, None);
        assert_eq!((out.catalog_size, out.duplicates_dropped), (3, 1));
        assert_eq!(out.summary.platform(Platform::Kalshi), PlatformTotals { active: 2, vol_24h: 15.0, oi: 4.0 });
        assert_eq!(out.summary.total_volume_24h, 15.0);
    }

    #[test]
    fn totals_match_platform_entries() {
        let w = window(&[trade(CID_A, 1_000_000, 3_000_000, 10), trade(CID_B, 1_000_000, 1_000_000, 10)]);
        let out = reconcile(Platform::Polymarket, catalog(), Some(&w), Some(&HashMap::new()));
        let s = &out.summary;
        let by_platform_vol: f64 = s.by_platform.values().map(|t| t.vol_24h).sum();
        assert_eq!(s.total_volume_24h, by_platform_vol);
        assert_eq!(s.total_volume_24h, 4.0);
        assert_eq!(s.active_markets, 2);
    }
}
