use crate::error::{AppError, Result};

pub const GAMMA_MARKETS_URL: &str = "https://gamma-api.polymarket.com/markets?active=true&closed=false";
pub const KALSHI_MARKETS_URL: &str =
    "https://api.elections.kalshi.com/trade-api/v2/markets?status=open&limit=1000";
pub const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Trailing window used for 24h volume and the active-market filter.
pub const ACTIVITY_WINDOW_SECS: i64 = 24 * 3600;

/// Both the activity price and size arrive as 6-decimal fixed point integers,
/// and so does the open-interest amount.
pub const FIXED_POINT_SCALE: f64 = 1_000_000.0;

/// Number of markets embedded in the combined summary's `topMarkets`.
pub const TOP_MARKETS: usize = 10;

/// Characters of an upstream error body kept in error messages.
pub const ERROR_BODY_PREVIEW: usize = 300;

/// Bounds for one paginated feed: rows per request and total rows scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub page_size: usize,
    pub max_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub redis_url: String,
    pub db_path: String,
    pub api_port: u16,
    /// Expiry applied to every `hot:*` cache key (INGEST_TTL_SECONDS)
    pub cache_ttl_secs: u64,
    /// Per-request timeout for every upstream call (HTTP_TIMEOUT_SECS)
    pub http_timeout_secs: u64,
    /// Mandatory Polymarket catalog endpoint (POLY_URL)
    pub poly_url: String,
    pub poly_catalog_page_size: usize,
    pub poly_catalog_max_pages: usize,
    /// GraphQL trade-activity feed; None means the feed is absent (POLY_ACTIVITY_URL)
    pub poly_activity_url: Option<String>,
    /// GraphQL open-interest feed; None means OI is reported as 0 (POLY_OI_URL)
    pub poly_oi_url: Option<String>,
    pub activity_limits: PageLimits,
    /// Rows requested when probing each activity schema candidate (ACTIVITY_PROBE_SIZE)
    pub activity_probe_size: usize,
    pub oi_limits: PageLimits,
    pub kalshi_url: String,
    pub kalshi_max_pages: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL.to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "market_pulse.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "4001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            cache_ttl_secs: std::env::var("INGEST_TTL_SECONDS")
                .unwrap_or_else(|_| "7200".to_string())
                .parse::<u64>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| {
                    AppError::Config("INGEST_TTL_SECONDS must be a positive integer".to_string())
                })?,
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 30),
            poly_url: std::env::var("POLY_URL").unwrap_or_else(|_| GAMMA_MARKETS_URL.to_string()),
            poly_catalog_page_size: env_or("POLY_CATALOG_PAGE_SIZE", 500),
            poly_catalog_max_pages: env_or("POLY_CATALOG_MAX_PAGES", 20),
            poly_activity_url: optional_url("POLY_ACTIVITY_URL"),
            poly_oi_url: optional_url("POLY_OI_URL"),
            activity_limits: PageLimits {
                page_size: env_or("ACTIVITY_PAGE_SIZE", 1000),
                max_rows: env_or("ACTIVITY_MAX_ROWS", 250_000),
            },
            activity_probe_size: env_or("ACTIVITY_PROBE_SIZE", 5),
            oi_limits: PageLimits {
                page_size: env_or("OI_PAGE_SIZE", 1000),
                max_rows: env_or("OI_MAX_ROWS", 200_000),
            },
            kalshi_url: std::env::var("KALSHI_URL").unwrap_or_else(|_| KALSHI_MARKETS_URL.to_string()),
            kalshi_max_pages: env_or("KALSHI_MAX_PAGES", 3),
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path)
    }
}

/// Tuning knobs fall back to their default when unset or unparseable.
fn env_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn optional_url(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
