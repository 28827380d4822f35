use std::collections::{BTreeMap, HashMap};

use crate::types::{CategoryStats, MarketSnapshot, Platform, PlatformTotals, SummaryStats};

/// Pure reduction over a snapshot set. Absent volume/OI count as 0.
///
/// Every platform gets a `byPlatform` entry, zeroed when it has no snapshots.
/// `byCategory` is sorted by volume descending; the sort is stable so ties keep
/// the order in which categories were first seen.
pub fn summarize(snapshots: &[MarketSnapshot]) -> SummaryStats {
    let mut by_platform: BTreeMap<Platform, PlatformTotals> =
        Platform::ALL.iter().map(|p| (*p, PlatformTotals::default())).collect();
    let mut by_category: Vec<CategoryStats> = Vec::new();
    let mut category_index: HashMap<&str, usize> = HashMap::new();
    let mut total_volume_24h = 0.0;
    let mut total_open_interest = 0.0;

    for snap in snapshots {
        let vol = snap.volume_24h.unwrap_or(0.0);
        let oi = snap.open_interest.unwrap_or(0.0);
        total_volume_24h += vol;
        total_open_interest += oi;

        let entry = by_platform.entry(snap.platform).or_default();
        entry.active += 1;
        entry.vol_24h += vol;
        entry.oi += oi;

        let idx = *category_index.entry(snap.category.as_str()).or_insert_with(|| {
            by_category.push(CategoryStats { category: snap.category.clone(), vol_24h: 0.0, count: 0 });
            by_category.len() - 1
        });
        by_category[idx].vol_24h += vol;
        by_category[idx].count += 1;
    }

    by_category.sort_by(|a, b| b.vol_24h.total_cmp(&a.vol_24h));

    SummaryStats {
        active_markets: snapshots.len(),
        total_volume_24h,
        total_open_interest,
        by_platform,
        by_category,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::RawPayload;

    pub fn snap(id: &str, platform: Platform, category: &str, vol: Option<f64>, oi: Option<f64>) -> MarketSnapshot {
        MarketSnapshot {
            id: id.to_string(),
            platform,
            question: id.to_string(),
            category: category.to_string(),
            yes_price: None,
            no_price: None,
            volume_24h: vol,
            open_interest: oi,
            last_trade_ts: None,
            raw: RawPayload::default(),
        }
    }

    #[test]
    fn totals_equal_naive_sums() {
        let set = vec![
            snap("poly_1", Platform::Polymarket, "Politics", Some(10.0), Some(2.0)),
            snap("poly_2", Platform::Polymarket, "Sports", None, Some(1.0)),
            snap("kalshi_1", Platform::Kalshi, "Politics", Some(5.5), None),
        ];
        let stats = summarize(&set);
        assert_eq!(stats.active_markets, 3);
        assert_eq!(stats.total_volume_24h, 15.5);
        assert_eq!(stats.total_open_interest, 3.0);
        assert_eq!(stats.platform(Platform::Polymarket), PlatformTotals { active: 2, vol_24h: 10.0, oi: 3.0 });
        assert_eq!(stats.platform(Platform::Kalshi), PlatformTotals { active: 1, vol_24h: 5.5, oi: 0.0 });
    }

    #[test]
    fn categories_partition_the_set() {
        let set: Vec<_> = (0..7)
            .map(|i| snap(&format!("poly_{i}"), Platform::Polymarket, ["a", "b", "c"][i % 3], Some(i as f64), None))
            .collect();
        let stats = summarize(&set);
        let counted: usize = stats.by_category.iter().map(|c| c.count).sum();
        assert_eq!(counted, set.len());
    }

    #[test]
    fn categories_sorted_desc_with_stable_ties() {
        let set = vec![
            snap("poly_1", Platform::Polymarket, "crypto", Some(5.0), None),
            snap("poly_2", Platform::Polymarket, "sports", Some(9.0), None),
            snap("poly_3", Platform::Polymarket, "politics", Some(5.0), None),
            snap("poly_4", Platform::Polymarket, "weather", Some(5.0), None),
        ];
        let names: Vec<_> = summarize(&set).by_category.into_iter().map(|c| c.category).collect();
        assert_eq!(names, vec!["sports", "crypto", "politics", "weather"]);
    }

    #[test]
    fn empty_set_has_zeroed_platform_entries() {
        let stats = summarize(&[]);
        assert_eq!(stats.active_markets, 0);
        assert!(stats.by_category.is_empty());
        assert!(Platform::ALL.iter().all(|p| stats.platform(*p).is_zero()));
        assert_eq!(stats.by_platform.len(), 2);
    }
}
