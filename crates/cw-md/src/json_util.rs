//! Shared JSON parsing helpers used by the exchange decoders.
//!
//! Exchanges encode numbers inconsistently: Binance sends prices as JSON
//! strings (`"0.0652"`), Bittrex sends decimal strings inside a compressed
//! payload, and invocation ids arrive as either strings or numbers.

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_str_u64(v: Option<&serde_json::Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Parse a named field on a JSON object as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strings_and_numbers_both_parse() {
        let v = json!({ "a": "0.0652", "b": 12.5, "c": "x" });
        assert_eq!(parse_f64_field(&v, "a"), Some(0.0652));
        assert_eq!(parse_f64_field(&v, "b"), Some(12.5));
        assert_eq!(parse_f64_field(&v, "c"), None);
        assert_eq!(parse_f64_field(&v, "missing"), None);
        assert_eq!(parse_str_u64(Some(&json!("17"))), Some(17));
        assert_eq!(parse_str_u64(Some(&json!(17))), Some(17));
    }
}
