use serde_json::Value;

use super::{normalize_payload, ProviderProfile};
use crate::types::{MarketSnapshot, Platform};

/// Gamma REST and GraphQL catalog shapes, old and new field spellings.
pub static POLYMARKET: ProviderProfile = ProviderProfile {
    platform: Platform::Polymarket,
    wrappers: &["markets.nodes", "markets", "data"],
    id: &["id", "slug", "ticker", "question", "conditionId"],
    question: &["question", "title"],
    yes_price: &["yes_price", "probability", "outcomePrices.0"],
    no_price: &["no_price", "outcomePrices.1"],
    price_scale: 1.0,
    volume_24h: &["volume24hr", "volume_24h", "volume24h", "day_volume", "dayVolume"],
    open_interest: &["open_interest", "openInterest", "oi"],
    last_trade_ts: &["last_trade_time", "lastTradeAt", "updatedAt"],
    condition_id: &["conditionId", "condition_id"],
    source_market_id: &["id", "marketId"],
    slug: &["slug"],
    event_id: &["eventId", "event.id", "events.0.id"],
};

pub fn normalize_polymarket(payload: &Value) -> Vec<MarketSnapshot> {
    normalize_payload(&POLYMARKET, payload)
}
