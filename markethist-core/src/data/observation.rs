//! Price-history payload decoding and per-sample normalization.

use super::timestamp::parse_history_timestamp;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// One sample exactly as the marketplace sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub timestamp_raw: String,
    pub price: Value,
    pub volume: Value,
}

/// A validated sample: finite, non-negative price and volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedObservation {
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub volume: f64,
}

/// `{"success": bool, "prices": [[ts, price, volume], ...]}`
///
/// Both fields are optional: the marketplace answers unknown items with a bare
/// `{"success": false}` or an empty array.
#[derive(Debug, Deserialize)]
pub struct PriceHistoryResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub prices: Option<Vec<Vec<Value>>>,
}

impl PriceHistoryResponse {
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// Rows with at least three cells; the timestamp cell must be a string.
    pub fn raw_observations(&self) -> Vec<RawObservation> {
        let Some(rows) = &self.prices else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| match row.as_slice() {
                [Value::String(ts), price, volume, ..] => Some(RawObservation {
                    timestamp_raw: ts.clone(),
                    price: price.clone(),
                    volume: volume.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Normalize every row of the payload.
    ///
    /// Rows too short to hold a sample, or without a string timestamp, count
    /// as dropped alongside samples that fail normalization.
    pub fn normalize(&self) -> Normalized {
        let total = self.prices.as_ref().map_or(0, Vec::len);
        let raw = self.raw_observations();
        let malformed = total - raw.len();
        if malformed > 0 {
            debug!(malformed, "skipping malformed price rows");
        }
        let mut normalized = normalize_all(&raw);
        normalized.dropped += malformed;
        normalized
    }
}

/// `1,234` or `12,345,678`: digits grouped in threes by commas.
fn is_thousands_grouped(s: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{1,3}(,\d{3})+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

fn finite_non_negative(v: f64) -> Option<f64> {
    (v.is_finite() && v >= 0.0).then_some(v)
}

/// Price as a JSON number or plain numeric string.
///
/// A comma is never a separator here: `"2,50"` is ambiguous and rejected.
fn parse_price(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    finite_non_negative(v)
}

/// Volume as a JSON number or numeric string, allowing thousands grouping.
fn parse_volume(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if is_thousands_grouped(s) {
                s.replace(',', "").parse::<f64>().ok()?
            } else {
                s.parse::<f64>().ok()?
            }
        }
        _ => return None,
    };
    finite_non_negative(v)
}

/// Normalize a single sample, or `None` if any field is unusable.
pub fn normalize(raw: &RawObservation) -> Option<NormalizedObservation> {
    let timestamp = match parse_history_timestamp(&raw.timestamp_raw) {
        Ok(ts) => ts,
        Err(e) => {
            debug!(error = %e, "dropping observation");
            return None;
        }
    };
    let price = parse_price(&raw.price)?;
    let volume = parse_volume(&raw.volume)?;
    Some(NormalizedObservation {
        timestamp,
        price,
        volume,
    })
}

/// Result of normalizing a batch of samples.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub observations: Vec<NormalizedObservation>,
    pub dropped: usize,
}

pub fn normalize_all(raw: &[RawObservation]) -> Normalized {
    let observations: Vec<NormalizedObservation> = raw.iter().filter_map(normalize).collect();
    let dropped = raw.len() - observations.len();
    if dropped > 0 {
        debug!(dropped, kept = observations.len(), "observations dropped during normalization");
    }
    Normalized {
        observations,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(ts: &str, price: Value, volume: Value) -> RawObservation {
        RawObservation {
            timestamp_raw: ts.into(),
            price,
            volume,
        }
    }

    #[test]
    fn decodes_marketplace_payload() {
        let body = r#"{"success":true,"price_prefix":"","price_suffix":"€","prices":[["Jul 02 2014 01: +0",417.451,"1"],["Jul 03 2014 01: +0","12.5","3"]]}"#;
        let resp = PriceHistoryResponse::from_body(body).unwrap();
        assert!(resp.is_success());

        let rows = resp.raw_observations();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_raw, "Jul 02 2014 01: +0");
        assert_eq!(rows[0].price, json!(417.451));
        assert_eq!(rows[1].volume, json!("3"));
    }

    #[test]
    fn missing_fields_are_not_success() {
        let resp = PriceHistoryResponse::from_body(r#"{"success":false}"#).unwrap();
        assert!(!resp.is_success());
        assert!(resp.raw_observations().is_empty());

        let resp = PriceHistoryResponse::from_body("{}").unwrap();
        assert!(!resp.is_success());

        let resp = PriceHistoryResponse::from_body(r#"{"success":true,"prices":false}"#);
        assert!(resp.is_err());
    }

    #[test]
    fn short_or_malformed_rows_are_skipped() {
        let body = r#"{"success":true,"prices":[["Jul 02 2014 01: +0",1.0],[5,1.0,"1"],["Jul 02 2014 01: +0",1.0,"1"]]}"#;
        let resp = PriceHistoryResponse::from_body(body).unwrap();
        assert_eq!(resp.raw_observations().len(), 1);
    }

    #[test]
    fn malformed_rows_count_as_dropped() {
        let body = r#"{"success":true,"prices":[["Jul 02 2014 01: +0",1.0],[5,1.0,"1"],[],["bad date",1.0,"1"],["Jul 02 2014 01: +0",1.0,"1"]]}"#;
        let n = PriceHistoryResponse::from_body(body).unwrap().normalize();
        assert_eq!(n.observations.len(), 1);
        assert_eq!(n.dropped, 4);

        let n = PriceHistoryResponse::from_body(r#"{"success":true}"#)
            .unwrap()
            .normalize();
        assert!(n.observations.is_empty());
        assert_eq!(n.dropped, 0);
    }

    #[test]
    fn comma_in_price_is_rejected() {
        assert!(normalize(&raw("Jan 05 2021 03: +0", json!("2,50"), json!("1"))).is_none());
        assert!(normalize(&raw("Jan 05 2021 03: +0", json!("1,234.50"), json!("1"))).is_none());
    }

    #[test]
    fn volume_accepts_only_thousands_grouping() {
        let ts = "Jan 05 2021 03: +0";
        let volume = |v: Value| normalize(&raw(ts, json!(1.0), v)).map(|o| o.volume);
        assert_eq!(volume(json!("1,234")), Some(1234.0));
        assert_eq!(volume(json!("12,345,678")), Some(12_345_678.0));
        assert_eq!(volume(json!(" 987 ")), Some(987.0));
        assert_eq!(volume(json!("2,50")), None);
        assert_eq!(volume(json!("1,23,456")), None);
        assert_eq!(volume(json!(",123")), None);
    }

    #[test]
    fn normalizes_numbers_and_strings() {
        let obs = normalize(&raw("Jan 05 2021 03: +0", json!(" 2.50"), json!("1,204"))).unwrap();
        assert_eq!(obs.price, 2.5);
        assert_eq!(obs.volume, 1204.0);
    }

    #[test]
    fn drops_invalid_samples() {
        let samples = vec![
            raw("not-a-date", json!(1.0), json!("1")),
            raw("Jan 05 2021 03: +0", json!(-1.0), json!("1")),
            raw("Jan 05 2021 03: +0", json!("abc"), json!("1")),
            raw("Jan 05 2021 03: +0", json!(1.0), json!(null)),
            raw("Jan 05 2021 03: +0", json!(1.0), json!("-4")),
            raw("Jan 05 2021 03: +0", json!(1.0), json!("2")),
        ];
        let n = normalize_all(&samples);
        assert_eq!(n.observations.len(), 1);
        assert_eq!(n.dropped, 5);
        assert_eq!(n.observations[0].volume, 2.0);
    }
}
