use serde_json::Value;

use super::{normalize_payload, ProviderProfile};
use crate::types::{MarketSnapshot, Platform};

/// Kalshi trade API v2. Prices are quoted in cents.
pub static KALSHI: ProviderProfile = ProviderProfile {
    platform: Platform::Kalshi,
    wrappers: &["markets", "data"],
    id: &["ticker", "id", "event_ticker"],
    question: &["title", "subtitle", "question"],
    yes_price: &["last_price", "yes_bid", "yes_ask"],
    no_price: &["no_bid", "no_ask"],
    price_scale: 0.01,
    volume_24h: &["volume_24h", "volume24h"],
    open_interest: &["open_interest", "openInterest"],
    last_trade_ts: &["last_trade_time", "last_trade_ts"],
    condition_id: &[],
    source_market_id: &[],
    slug: &[],
    event_id: &["event_ticker"],
};

pub fn normalize_kalshi(payload: &Value) -> Vec<MarketSnapshot> {
    normalize_payload(&KALSHI, payload)
}
