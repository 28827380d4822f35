use std::borrow::Cow;

use serde_json::Value;

use crate::types::UNCATEGORIZED;
use crate::util::coerce_number;

/// Resolve a dotted path (`events.0.category`). Numeric segments index arrays;
/// a string holding a JSON array (Gamma's `outcomePrices`) is decoded on the way.
/// `null` counts as absent.
pub fn lookup<'a>(v: &'a Value, path: &str) -> Option<Cow<'a, Value>> {
    let mut cur: Cow<'a, Value> = Cow::Borrowed(v);
    for seg in path.split('.') {
        cur = match cur {
            Cow::Borrowed(b) => step(b, seg)?,
            Cow::Owned(o) => Cow::Owned(step(&o, seg)?.into_owned()),
        };
    }
    (!cur.is_null()).then_some(cur)
}

fn step<'a>(v: &'a Value, seg: &str) -> Option<Cow<'a, Value>> {
    match v {
        Value::Object(map) => map.get(seg).map(Cow::Borrowed),
        Value::Array(items) => items.get(seg.parse::<usize>().ok()?).map(Cow::Borrowed),
        Value::String(s) if s.trim_start().starts_with('[') => {
            let idx = seg.parse::<usize>().ok()?;
            let decoded: Vec<Value> = serde_json::from_str(s).ok()?;
            decoded.into_iter().nth(idx).map(Cow::Owned)
        }
        _ => None,
    }
}

/// First candidate path that is present wins.
pub fn first_present<'a>(v: &'a Value, candidates: &[&str]) -> Option<Cow<'a, Value>> {
    candidates.iter().find_map(|path| lookup(v, path))
}

/// First candidate that coerces to a finite number. A present-but-garbage value
/// does not shadow a later usable one.
pub fn first_number(v: &Value, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|path| lookup(v, path).and_then(|x| coerce_number(&x)))
}

/// First candidate rendered as a non-empty trimmed string (numbers are stringified).
pub fn first_string(v: &Value, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|path| {
        let found = lookup(v, path)?;
        let s = match found.as_ref() {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!s.is_empty()).then_some(s)
    })
}

/// Record list from a payload that is either an array or wrapped under a known key.
pub fn extract_records<'a>(payload: &'a Value, wrappers: &[&str]) -> &'a [Value] {
    if let Value::Array(items) = payload {
        return items;
    }
    wrappers
        .iter()
        .find_map(|path| {
            let mut cur = payload;
            for seg in path.split('.') {
                cur = cur.get(seg)?;
            }
            cur.as_array().map(Vec::as_slice)
        })
        .unwrap_or(&[])
}

/// explicit category → first tag → first linked event's category → `uncategorized`.
pub fn clean_category(v: &Value) -> String {
    if let Some(Value::String(c)) = v.get("category") {
        let c = c.trim();
        if !c.is_empty() {
            return c.to_string();
        }
    }
    let tag = v
        .get("tags")
        .and_then(Value::as_array)
        .and_then(|tags| tags.first())
        .and_then(|tag| match tag {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(_) => first_string(tag, &["label", "name", "slug"]),
            _ => None,
        })
        .filter(|s| !s.is_empty());
    if let Some(tag) = tag {
        return tag;
    }
    first_string(v, &["events.0.category"]).unwrap_or_else(|| UNCATEGORIZED.to_string())
}

/// A probability in [0, 1]; anything outside the range is treated as unknown.
pub fn as_probability(p: Option<f64>) -> Option<f64> {
    p.filter(|p| (0.0..=1.0).contains(p))
}

/// Fill in the missing side of a yes/no pair as the complement.
pub fn complete_pair(yes: Option<f64>, no: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (yes, no) {
        (Some(y), None) => (Some(y), Some(1.0 - y)),
        (None, Some(n)) => (Some(1.0 - n), Some(n)),
        pair => pair,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_walks_objects_arrays_and_encoded_arrays() {
        let v = json!({
            "events": [{"category": "Politics", "id": 7}],
            "outcomePrices": "[\"0.61\", \"0.39\"]",
            "nothing": null
        });
        assert_eq!(lookup(&v, "events.0.category").unwrap().as_str(), Some("Politics"));
        assert_eq!(lookup(&v, "outcomePrices.1").unwrap().as_str(), Some("0.39"));
        assert!(lookup(&v, "nothing").is_none());
        assert!(lookup(&v, "events.3.category").is_none());
    }

    #[test]
    fn first_present_respects_candidate_order() {
        let v = json!({"volume_24h": 5, "volume24hr": 9});
        let got = first_present(&v, &["volume24hr", "volume_24h"]).unwrap();
        assert_eq!(got.as_f64(), Some(9.0));
    }

    #[test]
    fn first_number_skips_unparseable_candidates() {
        let v = json!({"a": "n/a", "b": "4.5"});
        assert_eq!(first_number(&v, &["a", "b"]), Some(4.5));
        assert_eq!(first_number(&v, &["c"]), None);
    }

    #[test]
    fn extract_records_handles_wrappers() {
        let wrappers = ["markets.nodes", "markets", "data"];
        let nodes = json!({"markets": {"nodes": [{"id": 1}]}});
        let plain = json!({"markets": [{"id": 1}, {"id": 2}]});
        let bare = json!([{"id": 1}]);
        let unknown = json!({"rows": [{"id": 1}]});
        assert_eq!(extract_records(&nodes, &wrappers).len(), 1);
        assert_eq!(extract_records(&plain, &wrappers).len(), 2);
        assert_eq!(extract_records(&bare, &wrappers).len(), 1);
        assert!(extract_records(&unknown, &wrappers).is_empty());
    }

    #[test]
    fn category_fallback_chain() {
        assert_eq!(clean_category(&json!({"category": "  Sports "})), "Sports");
        assert_eq!(clean_category(&json!({"category": " ", "tags": ["Crypto"]})), "Crypto");
        assert_eq!(clean_category(&json!({"tags": [{"label": "Economy"}]})), "Economy");
        assert_eq!(clean_category(&json!({"events": [{"category": "Pop Culture"}]})), "Pop Culture");
        assert_eq!(clean_category(&json!({"tags": []})), UNCATEGORIZED);
    }

    #[test]
    fn pair_completion_uses_complement() {
        assert_eq!(complete_pair(Some(0.25), None), (Some(0.25), Some(0.75)));
        assert_eq!(complete_pair(None, Some(0.75)), (Some(0.25), Some(0.75)));
        assert_eq!(complete_pair(None, None), (None, None));
        assert_eq!(as_probability(Some(1.5)), None);
    }
}
