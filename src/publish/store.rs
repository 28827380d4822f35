use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::Result;
use crate::types::{MarketSnapshot, Platform, PlatformTotals};

/// Row counts from one platform write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreWrite {
    pub upserted: usize,
    pub zeroed: u64,
}

/// A run written inside an open transaction. Dropping it rolls the run back.
pub struct StagedWrite {
    tx: Transaction<'static, Sqlite>,
    platform: Platform,
    write: StoreWrite,
}

impl StagedWrite {
    pub async fn commit(self) -> Result<StoreWrite> {
        self.tx.commit().await?;
        info!(
            platform = %self.platform,
            upserted = self.write.upserted,
            zeroed = self.write.zeroed,
            "Durable store updated: {} markets upserted, {} stale rows zeroed",
            self.write.upserted,
            self.write.zeroed,
        );
        Ok(self.write)
    }
}

/// SQLite durable store: current `markets`, append-only `market_snapshots`
/// history and per-run `platform_rollups`.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(4).connect(database_url).await?;
        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database; every connection would otherwise
    /// get its own empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// One transaction per run: upsert current rows, append history and the
    /// rollup, then zero `volume_24h` on this platform's rows the run did not touch.
    /// Prices and open interest on those rows keep their last known values.
    /// Nothing is visible until the returned write is committed.
    pub async fn write_run(
        &self,
        platform: Platform,
        snapshots: &[MarketSnapshot],
        totals: PlatformTotals,
        now: DateTime<Utc>,
    ) -> Result<StagedWrite> {
        let run_at = now.timestamp_millis();
        let platform_name = platform.to_string();
        let mut tx = self.pool.begin().await?;

        for s in snapshots {
            let raw = serde_json::to_string(&s.raw)?;
            let last_trade_ts = s.last_trade_ts.map(|t| t.to_rfc3339());

            sqlx::query(
                r#"
                INSERT INTO markets (
                    id, platform, question, category, yes_price, no_price,
                    volume_24h, open_interest, last_trade_ts, raw, run_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    question = excluded.question,
                    category = excluded.category,
                    yes_price = excluded.yes_price,
                    no_price = excluded.no_price,
                    volume_24h = excluded.volume_24h,
                    open_interest = excluded.open_interest,
                    last_trade_ts = excluded.last_trade_ts,
                    raw = excluded.raw,
                    run_at = excluded.run_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&s.id)
            .bind(&platform_name)
            .bind(&s.question)
            .bind(&s.category)
            .bind(s.yes_price)
            .bind(s.no_price)
            .bind(s.volume_24h)
            .bind(s.open_interest)
            .bind(last_trade_ts)
            .bind(raw)
            .bind(run_at)
            .bind(run_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO market_snapshots (
                    market_id, platform, captured_at, yes_price, no_price, volume_24h, open_interest
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.id)
            .bind(&platform_name)
            .bind(run_at)
            .bind(s.yes_price)
            .bind(s.no_price)
            .bind(s.volume_24h)
            .bind(s.open_interest)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO platform_rollups (platform, captured_at, active_markets, volume_24h, open_interest)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&platform_name)
        .bind(run_at)
        .bind(totals.active as i64)
        .bind(totals.vol_24h)
        .bind(totals.oi)
        .execute(&mut *tx)
        .await?;

        let zeroed = sqlx::query(
            "UPDATE markets SET volume_24h = 0, updated_at = ? WHERE platform = ? AND run_at <> ?",
        )
        .bind(run_at)
        .bind(&platform_name)
        .bind(run_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        Ok(StagedWrite {
            tx,
            platform,
            write: StoreWrite { upserted: snapshots.len(), zeroed },
        })
    }

    /// `(volume_24h, open_interest)` of one current row.
    #[cfg(test)]
    pub async fn market_totals(&self, id: &str) -> Result<Option<(Option<f64>, Option<f64>)>> {
        let row = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
            "SELECT volume_24h, open_interest FROM markets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Rollup history for one platform, oldest first.
    #[cfg(test)]
    pub async fn rollups(&self, platform: Platform) -> Result<Vec<PlatformTotals>> {
        let rows = sqlx::query_as::<_, (i64, f64, f64)>(
            "SELECT active_markets, volume_24h, open_interest FROM platform_rollups \
             WHERE platform = ? ORDER BY captured_at, id",
        )
        .bind(platform.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(active, vol_24h, oi)| PlatformTotals { active: active.max(0) as usize, vol_24h, oi })
            .collect())
    }

    #[cfg(test)]
    pub async fn history_len(&self, market_id: &str) -> Result<i64> {
        let (n,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM market_snapshots WHERE market_id = ?")
            .bind(market_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::summary::tests::snap;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn upserts_and_appends_history() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let totals = PlatformTotals { active: 1, vol_24h: 10.0, oi: 2.0 };
        let set = vec![snap("poly_1", Platform::Polymarket, "a", Some(10.0), Some(2.0))];

        store.write_run(Platform::Polymarket, &set, totals, t0()).await.unwrap().commit().await.unwrap();
        let updated = vec![snap("poly_1", Platform::Polymarket, "a", Some(12.0), Some(3.0))];
        store
            .write_run(Platform::Polymarket, &updated, totals, t0() + Duration::hours(1))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();

        assert_eq!(store.market_totals("poly_1").await.unwrap(), Some((Some(12.0), Some(3.0))));
        assert_eq!(store.history_len("poly_1").await.unwrap(), 2);
        assert_eq!(store.rollups(Platform::Polymarket).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn untouched_rows_keep_oi_but_lose_volume() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let totals = PlatformTotals::default();
        let first = vec![
            snap("poly_1", Platform::Polymarket, "a", Some(10.0), Some(2.0)),
            snap("poly_2", Platform::Polymarket, "a", Some(5.0), Some(1.0)),
        ];
        store.write_run(Platform::Polymarket, &first, totals, t0()).await.unwrap().commit().await.unwrap();

        let second = vec![snap("poly_1", Platform::Polymarket, "a", Some(11.0), Some(2.0))];
        let write = store
            .write_run(Platform::Polymarket, &second, totals, t0() + Duration::hours(1))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();

        assert_eq!(write, StoreWrite { upserted: 1, zeroed: 1 });
        assert_eq!(store.market_totals("poly_2").await.unwrap(), Some((Some(0.0), Some(1.0))));
        assert_eq!(store.market_totals("poly_1").await.unwrap(), Some((Some(11.0), Some(2.0))));
    }

    #[tokio::test]
    async fn other_platform_rows_are_left_alone() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let totals = PlatformTotals::default();
        let kalshi = vec![snap("kalshi_1", Platform::Kalshi, "a", Some(7.0), None)];
        store.write_run(Platform::Kalshi, &kalshi, totals, t0()).await.unwrap().commit().await.unwrap();
        store
            .write_run(Platform::Polymarket, &[], totals, t0() + Duration::hours(1))
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
        assert_eq!(store.market_totals("kalshi_1").await.unwrap(), Some((Some(7.0), None)));
    }

    #[tokio::test]
    async fn dropped_write_is_rolled_back() {
        let store = SnapshotStore::in_memory().await.unwrap();
        let set = vec![snap("poly_1", Platform::Polymarket, "a", Some(10.0), Some(2.0))];
        let staged = store
            .write_run(Platform::Polymarket, &set, PlatformTotals::default(), t0())
            .await
            .unwrap();
        drop(staged);
        assert_eq!(store.market_totals("poly_1").await.unwrap(), None);
        assert!(store.rollups(Platform::Polymarket).await.unwrap().is_empty());
    }
}
