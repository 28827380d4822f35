use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::combine::{Combined, PlatformView};
use crate::pipeline::reconcile::Reconciled;
use crate::publish::cache::HotCache;
use crate::publish::store::SnapshotStore;
use crate::types::{MarketSnapshot, Platform, SummaryStats, COMBINED_MARKETS_KEY, COMBINED_SUMMARY_KEY};

/// Hands a finished run to the durable store and the hot cache.
#[derive(Clone)]
pub struct Publisher {
    cache: Arc<dyn HotCache>,
    store: SnapshotStore,
    ttl_secs: u64,
}

impl Publisher {
    pub fn new(cache: Arc<dyn HotCache>, store: SnapshotStore, ttl_secs: u64) -> Self {
        Self { cache, store, ttl_secs }
    }

    /// The store transaction is staged, the cache keys for the platform are
    /// replaced together, and only then is the store committed. A store or cache
    /// failure leaves both sinks on the previous run.
    pub async fn publish_platform(&self, run: &Reconciled, now: DateTime<Utc>) -> Result<()> {
        let platform = run.platform;
        // Serialize before touching either sink so a bad value cannot half-publish.
        let entries = vec![
            (platform.markets_key(), serde_json::to_string(&run.snapshots)?),
            (platform.summary_key(), serde_json::to_string(&run.summary)?),
        ];

        let staged = self
            .store
            .write_run(platform, &run.snapshots, run.summary.platform(platform), now)
            .await?;
        self.cache.set_many(&entries, self.ttl_secs).await?;
        staged.commit().await?;

        info!(
            platform = %platform,
            markets = run.snapshots.len(),
            ttl_secs = self.ttl_secs,
            "Published {} snapshot: {} markets",
            platform,
            run.snapshots.len(),
        );
        Ok(())
    }

    pub async fn publish_combined(&self, combined: &Combined) -> Result<()> {
        let entries = vec![
            (COMBINED_MARKETS_KEY.to_string(), serde_json::to_string(&combined.markets)?),
            (COMBINED_SUMMARY_KEY.to_string(), serde_json::to_string(&combined.summary)?),
        ];
        self.cache.set_many(&entries, self.ttl_secs).await?;
        info!(markets = combined.markets.len(), "Published combined view");
        Ok(())
    }

    /// The platform's last published markets and summary. A missing or unreadable
    /// key is reported as empty rather than failing the combine.
    pub async fn read_platform(&self, platform: Platform) -> Result<PlatformView> {
        let markets: Vec<MarketSnapshot> = self
            .read_json(&platform.markets_key())
            .await?
            .unwrap_or_default();
        let summary: Option<SummaryStats> = self.read_json(&platform.summary_key()).await?;
        Ok(PlatformView { platform, markets, summary })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.cache.get(key).await? else {
            warn!(key, "Cache key missing");
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(key, "Ignoring unreadable cache value: {e}");
                Ok(None)
            }
        }
    }
}
