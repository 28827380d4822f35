use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

/// `0x` + 64 hex characters.
pub const CONDITION_ID_LEN: usize = 66;

// Compiled once; the open-interest feed embeds condition ids anywhere inside its ids.
static RE_EMBEDDED_CONDITION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:0[xX])?([0-9a-fA-F]{64})").unwrap());
static RE_TRAILING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\D*$").unwrap());

/// Finite number from a JSON number or numeric string. Never yields NaN or infinity.
pub fn coerce_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Condition id from an ERC-1155 asset id: the leading `0x` + 64 hex characters.
/// The whole input must be hex and long enough; the result is lowercased.
pub fn condition_id_from_asset_id(asset_id: &str) -> Option<String> {
    let asset_id = asset_id.trim();
    let hex = asset_id
        .strip_prefix("0x")
        .or_else(|| asset_id.strip_prefix("0X"))?;
    if hex.len() < CONDITION_ID_LEN - 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex[..CONDITION_ID_LEN - 2].to_ascii_lowercase()))
}

/// Condition id found anywhere inside `s` (pattern search, not positional slicing).
pub fn condition_id_in(s: &str) -> Option<String> {
    RE_EMBEDDED_CONDITION_ID
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| format!("0x{}", m.as_str().to_ascii_lowercase()))
}

/// A catalog-provided condition id, accepted only when it is exactly `0x` + 64 hex.
pub fn normalize_condition_id(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() != CONDITION_ID_LEN {
        return None;
    }
    condition_id_from_asset_id(s)
}

/// Rightmost run of digits in a slug: `will-btc-hit-100k-516710` → 516710.
pub fn numeric_id_from_slug(slug: &str) -> Option<u64> {
    RE_TRAILING_DIGITS
        .captures(slug)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Epoch seconds, or milliseconds when the magnitude says so.
pub fn timestamp_from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n <= 0.0 {
        return None;
    }
    let millis = if n >= 1e12 { n } else { n * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Timestamp from an epoch number, numeric string, RFC 3339, or naive ISO string (UTC).
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    if let Some(n) = coerce_number(v) {
        return timestamp_from_epoch(n);
    }
    let s = v.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
