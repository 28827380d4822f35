//! Run-level orchestration. The only place that decides between degraded and
//! fatal outcomes; nothing is published unless the whole run succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{Config, PageLimits};
use crate::error::Result;
use crate::feeds::activity::{collect_activity, ActivityFeed, GraphQlActivityFeed};
use crate::feeds::catalog::{CatalogSource, GammaCatalog, KalshiCatalog};
use crate::feeds::gql::GqlClient;
use crate::feeds::open_interest::{collect_open_interest, GraphQlOpenInterestFeed, OpenInterestFeed};
use crate::normalize::{normalize_kalshi, normalize_polymarket};
use crate::pipeline::combine::{combine, Combined};
use crate::pipeline::reconcile::{reconcile, Reconciled};
use crate::publish::Publisher;
use crate::types::{MarketSnapshot, Platform};

/// Upstream feeds for one platform.
#[derive(Clone)]
pub struct FeedSet {
    pub platform: Platform,
    pub catalog: Arc<dyn CatalogSource>,
    pub activity: Option<Arc<dyn ActivityFeed>>,
    pub open_interest: Option<Arc<dyn OpenInterestFeed>>,
    /// Whether platform OI comes from the OI feed (reported as 0 when the feed is
    /// missing) rather than from catalog estimates.
    pub authoritative_oi: bool,
}

impl FeedSet {
    pub fn polymarket(cfg: &Config, http: &reqwest::Client) -> Self {
        let catalog = GammaCatalog::new(
            http.clone(),
            cfg.poly_url.clone(),
            cfg.poly_catalog_page_size,
            cfg.poly_catalog_max_pages,
        );
        let activity = cfg.poly_activity_url.as_ref().map(|url| {
            Arc::new(GraphQlActivityFeed::new(GqlClient::new(http.clone(), url.clone())))
                as Arc<dyn ActivityFeed>
        });
        let open_interest = cfg.poly_oi_url.as_ref().map(|url| {
            Arc::new(GraphQlOpenInterestFeed::new(GqlClient::new(http.clone(), url.clone())))
                as Arc<dyn OpenInterestFeed>
        });
        Self {
            platform: Platform::Polymarket,
            catalog: Arc::new(catalog),
            activity,
            open_interest,
            authoritative_oi: true,
        }
    }

    pub fn kalshi(cfg: &Config, http: &reqwest::Client) -> Self {
        Self {
            platform: Platform::Kalshi,
            catalog: Arc::new(KalshiCatalog::new(http.clone(), cfg.kalshi_url.clone(), cfg.kalshi_max_pages)),
            activity: None,
            open_interest: None,
            authoritative_oi: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub activity_limits: PageLimits,
    pub activity_probe_size: usize,
    pub oi_limits: PageLimits,
}

impl RunSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            activity_limits: cfg.activity_limits,
            activity_probe_size: cfg.activity_probe_size,
            oi_limits: cfg.oi_limits,
        }
    }
}

/// Result of `cycle`: platforms whose run aborted, plus the combined view.
#[derive(Debug)]
pub struct CycleOutcome {
    pub failed: Vec<Platform>,
    pub combined: Combined,
}

pub struct Pipeline {
    publisher: Publisher,
    settings: RunSettings,
}

impl Pipeline {
    pub fn new(publisher: Publisher, settings: RunSettings) -> Self {
        Self { publisher, settings }
    }

    /// One ingestion run for one platform. Fetches run concurrently; reconciliation
    /// waits for all of them. Any error returned here means nothing was published.
    pub async fn ingest(&self, feeds: &FeedSet, now: DateTime<Utc>) -> Result<Reconciled> {
        let platform = feeds.platform;
        info!(platform = %platform, "Ingestion run starting");

        let activity = async {
            match &feeds.activity {
                Some(feed) => {
                    collect_activity(
                        feed.as_ref(),
                        self.settings.activity_limits,
                        self.settings.activity_probe_size,
                        now,
                    )
                    .await
                }
                None => Ok(None),
            }
        };
        let open_interest = async {
            if feeds.authoritative_oi {
                Some(collect_open_interest(feeds.open_interest.as_deref(), self.settings.oi_limits).await)
            } else {
                None
            }
        };
        let (catalog, activity, open_interest) =
            tokio::join!(feeds.catalog.fetch_catalog(), activity, open_interest);

        let catalog = catalog?;
        let activity = activity?;
        if activity.is_none() && feeds.authoritative_oi {
            warn!(platform = %platform, "Activity feed unavailable, using catalog volume and no active-window filter");
        }

        let snapshots = normalize_for(platform, &catalog);
        info!(platform = %platform, markets = snapshots.len(), "Catalog normalized");

        let run = reconcile(platform, snapshots, activity.as_ref(), open_interest.as_ref());
        self.publisher.publish_platform(&run, now).await?;
        Ok(run)
    }

    /// Rebuild the combined view from whatever each platform last published.
    pub async fn combine(&self, now: DateTime<Utc>) -> Result<Combined> {
        let (poly, kalshi) = tokio::join!(
            self.publisher.read_platform(Platform::Polymarket),
            self.publisher.read_platform(Platform::Kalshi),
        );
        let combined = combine(vec![poly?, kalshi?], now);
        self.publisher.publish_combined(&combined).await?;
        Ok(combined)
    }

    /// Ingest every platform concurrently, then combine. A platform that aborts
    /// keeps its last published values and does not block the others.
    pub async fn cycle(&self, feeds: &[FeedSet], now: DateTime<Utc>) -> Result<CycleOutcome> {
        let runs = feeds.iter().map(|f| async move { (f.platform, self.ingest(f, now).await) });
        let mut failed = Vec::new();
        for (platform, outcome) in join_all(runs).await {
            if let Err(e) = outcome {
                error!(platform = %platform, "Ingestion run aborted, nothing published: {e}");
                failed.push(platform);
            }
        }
        let combined = self.combine(now).await?;
        Ok(CycleOutcome { failed, combined })
    }
}

fn normalize_for(platform: Platform, payload: &Value) -> Vec<MarketSnapshot> {
    match platform {
        Platform::Polymarket => normalize_polymarket(payload),
        Platform::Kalshi => normalize_kalshi(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::feeds::activity::tests::{now, trade, FakeActivityFeed, CID_A, CID_B};
    use crate::feeds::open_interest::tests::FakeOpenInterestFeed;
    use crate::publish::{HotCache, MemoryCache, SnapshotStore};
    use crate::types::{SummaryStats, COMBINED_SUMMARY_KEY};
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticCatalog(Option<Value>);

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        async fn fetch_catalog(&self) -> Result<Value> {
            self.0.clone().ok_or_else(|| AppError::Upstream("HTTP 503 Service Unavailable".into()))
        }
    }

    fn limits() -> PageLimits {
        PageLimits { page_size: 100, max_rows: 1000 }
    }

    async fn pipeline() -> (Pipeline, Arc<MemoryCache>, SnapshotStore) {
        let cache = Arc::new(MemoryCache::new());
        let store = SnapshotStore::in_memory().await.unwrap();
        let publisher = Publisher::new(cache.clone(), store.clone(), 3600);
        let settings = RunSettings { activity_limits: limits(), activity_probe_size: 5, oi_limits: limits() };
        (Pipeline::new(publisher, settings), cache, store)
    }

    fn poly_catalog() -> Value {
        json!({"markets": [
            {"id": "101", "question": "Rate cut in March?", "conditionId": CID_A,
             "outcomePrices": "[\"0.3\", \"0.7\"]", "volume24hr": 5000, "category": "Economy"},
            {"id": "102", "question": "Quiet market", "volume24hr": 80}
        ]})
    }

    fn poly_feeds(activity: Option<FakeActivityFeed>, oi: Option<FakeOpenInterestFeed>) -> FeedSet {
        FeedSet {
            platform: Platform::Polymarket,
            catalog: Arc::new(StaticCatalog(Some(poly_catalog()))),
            activity: activity.map(|a| Arc::new(a) as Arc<dyn ActivityFeed>),
            open_interest: oi.map(|o| Arc::new(o) as Arc<dyn OpenInterestFeed>),
            authoritative_oi: true,
        }
    }

    fn kalshi_feeds() -> FeedSet {
        FeedSet {
            platform: Platform::Kalshi,
            catalog: Arc::new(StaticCatalog(Some(json!({"markets": [
                {"ticker": "KX-1", "title": "Snow in NYC?", "last_price": 20, "volume_24h": 50, "open_interest": 9}
            ], "cursor": ""})))),
            activity: None,
            open_interest: None,
            authoritative_oi: false,
        }
    }

    async fn cached_summary(cache: &MemoryCache, key: &str) -> Option<SummaryStats> {
        let raw = cache.get(key).await.unwrap()?;
        Some(serde_json::from_str(&raw).unwrap())
    }

    #[tokio::test]
    async fn polymarket_run_reconciles_and_publishes() {
        let (pipeline, cache, store) = pipeline().await;
        let activity = FakeActivityFeed::with_rows(vec![
            trade(CID_A, 500_000, 4_000_000, 60),
            trade(CID_B, 500_000, 2_000_000, 120),
        ]);
        let oi = FakeOpenInterestFeed::with_rows(vec![json!({"id": CID_A, "amount": "25000000"})]);

        let run = pipeline.ingest(&poly_feeds(Some(activity), Some(oi)), now()).await.unwrap();
        assert_eq!(run.stubs_created, 1);
        assert_eq!(run.stale_dropped, 1);
        assert_eq!(run.snapshots.len(), 2);

        let summary = cached_summary(&cache, "hot:poly:summary").await.unwrap();
        assert_eq!(summary.active_markets, 2);
        assert_eq!(summary.total_volume_24h, 3.0);
        assert_eq!(summary.total_open_interest, 25.0);

        assert_eq!(store.market_totals("poly_101").await.unwrap(), Some((Some(2.0), Some(25.0))));
        assert_eq!(store.rollups(Platform::Polymarket).await.unwrap()[0].vol_24h, 3.0);
        assert!(cache.get("hot:poly:markets").await.unwrap().unwrap().contains("poly_cid_"));
    }

    #[tokio::test]
    async fn catalog_failure_publishes_nothing() {
        let (pipeline, cache, store) = pipeline().await;
        let mut feeds = poly_feeds(None, None);
        feeds.catalog = Arc::new(StaticCatalog(None));

        assert!(pipeline.ingest(&feeds, now()).await.is_err());
        assert_eq!(cache.get("hot:poly:summary").await.unwrap(), None);
        assert!(store.rollups(Platform::Polymarket).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_mismatch_is_fatal() {
        let (pipeline, cache, _store) = pipeline().await;
        let activity = FakeActivityFeed::with_rows(Vec::new());

        let err = pipeline.ingest(&poly_feeds(Some(activity), None), now()).await.unwrap_err();
        assert!(matches!(err, AppError::ActivitySchemaMismatch(_)));
        assert_eq!(cache.get("hot:poly:markets").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_activity_falls_back_to_catalog_volume() {
        let (pipeline, _cache, _store) = pipeline().await;
        let mut activity = FakeActivityFeed::with_rows(Vec::new());
        activity.unreachable = true;

        let run = pipeline.ingest(&poly_feeds(Some(activity), None), now()).await.unwrap();
        assert_eq!(run.snapshots.len(), 2);
        assert_eq!(run.summary.total_volume_24h, 5080.0);
    }

    #[tokio::test]
    async fn unconfigured_open_interest_reports_zero() {
        let (pipeline, cache, _store) = pipeline().await;
        let activity = FakeActivityFeed::with_rows(vec![trade(CID_A, 1_000_000, 1_000_000, 60)]);

        pipeline.ingest(&poly_feeds(Some(activity), None), now()).await.unwrap();
        let combined = pipeline.combine(now()).await.unwrap();

        let poly = cached_summary(&cache, "hot:poly:summary").await.unwrap();
        assert_eq!(poly.total_open_interest, 0.0);
        assert_eq!(poly.platform(Platform::Polymarket).oi, 0.0);
        assert_eq!(combined.summary.stats.platform(Platform::Polymarket).oi, 0.0);
    }

    #[tokio::test]
    async fn cycle_combines_both_platforms() {
        let (pipeline, cache, _store) = pipeline().await;
        let activity = FakeActivityFeed::with_rows(vec![trade(CID_A, 1_000_000, 100_000_000, 60)]);
        let feeds = vec![poly_feeds(Some(activity), None), kalshi_feeds()];

        let outcome = pipeline.cycle(&feeds, now()).await.unwrap();
        assert!(outcome.failed.is_empty());
        let stats = &outcome.combined.summary.stats;
        assert_eq!(stats.platform(Platform::Polymarket).vol_24h, 100.0);
        assert_eq!(stats.platform(Platform::Kalshi).vol_24h, 50.0);
        assert_eq!(stats.total_volume_24h, 150.0);
        assert_eq!(stats.active_markets, 2);
        assert_eq!(outcome.combined.summary.hottest_market.as_ref().map(|m| m.id.as_str()), Some("poly_101"));
        assert!(cache.get(COMBINED_SUMMARY_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_platform_does_not_block_the_other() {
        let (pipeline, cache, _store) = pipeline().await;
        let mut poly = poly_feeds(None, None);
        poly.catalog = Arc::new(StaticCatalog(None));

        let outcome = pipeline.cycle(&[poly, kalshi_feeds()], now()).await.unwrap();
        assert_eq!(outcome.failed, vec![Platform::Polymarket]);
        assert!(cache.get("hot:kalshi:summary").await.unwrap().is_some());
        assert_eq!(outcome.combined.summary.stats.total_volume_24h, 50.0);
    }
}
