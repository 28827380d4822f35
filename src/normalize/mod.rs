//! Provider normalizers: arbitrary upstream catalog payloads → canonical `MarketSnapshot`s.
//!
//! Each provider is described by a `ProviderProfile`: an ordered list of candidate
//! field paths per logical attribute. Resolution is "first present wins". The
//! normalizers are pure and idempotent.

pub mod fields;
pub mod kalshi;
pub mod polymarket;

use serde_json::Value;

use crate::types::{MarketSnapshot, Platform, RawPayload};
use crate::util::{coerce_number, normalize_condition_id, numeric_id_from_slug, parse_timestamp};
use fields::{
    as_probability, clean_category, complete_pair, extract_records, first_number, first_present,
    first_string,
};

pub use kalshi::normalize_kalshi;
pub use polymarket::normalize_polymarket;

pub const UNKNOWN_QUESTION: &str = "unknown";

type Candidates = &'static [&'static str];

/// Field-name candidates for one upstream platform.
#[derive(Debug)]
pub struct ProviderProfile {
    pub platform: Platform,
    /// Where the record array may be nested when the payload is not an array itself.
    pub wrappers: Candidates,
    pub id: Candidates,
    pub question: Candidates,
    pub yes_price: Candidates,
    pub no_price: Candidates,
    /// Multiplier turning upstream prices into probabilities (Kalshi quotes cents).
    pub price_scale: f64,
    pub volume_24h: Candidates,
    pub open_interest: Candidates,
    pub last_trade_ts: Candidates,
    pub condition_id: Candidates,
    pub source_market_id: Candidates,
    pub slug: Candidates,
    pub event_id: Candidates,
}

pub fn normalize_payload(profile: &ProviderProfile, payload: &Value) -> Vec<MarketSnapshot> {
    extract_records(payload, profile.wrappers)
        .iter()
        .filter(|rec| rec.is_object())
        .map(|rec| normalize_record(profile, rec))
        .collect()
}

fn normalize_record(profile: &ProviderProfile, rec: &Value) -> MarketSnapshot {
    let upstream_id = first_string(rec, profile.id).unwrap_or_else(|| "unknown".to_string());
    let scale = |p: f64| p * profile.price_scale;
    let yes = as_probability(first_number(rec, profile.yes_price).map(scale));
    let no = as_probability(first_number(rec, profile.no_price).map(scale));
    let (yes_price, no_price) = complete_pair(yes, no);

    MarketSnapshot {
        id: format!("{}_{}", profile.platform.prefix(), upstream_id),
        platform: profile.platform,
        question: first_string(rec, profile.question).unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
        category: clean_category(rec),
        yes_price,
        no_price,
        volume_24h: first_number(rec, profile.volume_24h).filter(|v| *v >= 0.0),
        open_interest: first_number(rec, profile.open_interest).filter(|v| *v >= 0.0),
        last_trade_ts: profile
            .last_trade_ts
            .iter()
            .find_map(|path| fields::lookup(rec, path).and_then(|v| parse_timestamp(&v))),
        raw: RawPayload {
            payload: rec.clone(),
            condition_id: first_string(rec, profile.condition_id)
                .and_then(|c| normalize_condition_id(&c)),
            source_market_id: source_market_id(profile, rec),
            event_id: first_string(rec, profile.event_id),
        },
    }
}

/// Explicit numeric id field, else the numeric suffix of the slug.
fn source_market_id(profile: &ProviderProfile, rec: &Value) -> Option<u64> {
    let explicit = first_present(rec, profile.source_market_id)
        .and_then(|v| coerce_number(&v))
        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64)
        .map(|n| n as u64);
    explicit.or_else(|| first_string(rec, profile.slug).and_then(|s| numeric_id_from_slug(&s)))
}
