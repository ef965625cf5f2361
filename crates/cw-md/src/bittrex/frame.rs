//! Bittrex hub frame decoder.
//!
//! Hub frames are JSON envelopes of the classic SignalR protocol:
//!
//! - `{"R": ..., "I": "n"}` / `{"E": "...", "I": "n"}` — invocation result / error
//! - `{"C": "...", "M": [{"H": "c3", "M": "<method>", "A": [...]}]}` — server pushes
//! - `{}` — keep-alive
//!
//! Candle pushes carry a single argument: base64 of a raw-deflate stream (some
//! servers send a zlib-wrapped stream instead) holding the JSON delta.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use cw_core::RawCandle;
use flate2::read::{DeflateDecoder, ZlibDecoder};

use crate::decoder::{DecodeError, WireDecoder, WireEvent};
use crate::json_util::{parse_f64_field, parse_str_u64};

#[derive(Debug, Clone, Copy, Default)]
pub struct BittrexDecoder;

impl WireDecoder for BittrexDecoder {
    fn decode(&self, frame: &str) -> Result<Vec<WireEvent>, DecodeError> {
        let v: serde_json::Value = serde_json::from_str(frame)?;

        if let Some(id) = v.get("I") {
            let id = parse_str_u64(Some(id)).ok_or(DecodeError::Field("I"))?;
            let result = match v.get("E") {
                Some(err) => Err(err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string())),
                None => Ok(v.get("R").cloned().unwrap_or(serde_json::Value::Null)),
            };
            return Ok(vec![WireEvent::InvocationResult { id, result }]);
        }

        let Some(pushes) = v.get("M").and_then(|m| m.as_array()) else {
            return Ok(vec![WireEvent::Ignored]);
        };

        pushes.iter().map(decode_push).collect()
    }
}

fn decode_push(push: &serde_json::Value) -> Result<WireEvent, DecodeError> {
    let method = push.get("M").and_then(|m| m.as_str()).unwrap_or_default();
    if method.eq_ignore_ascii_case("heartbeat") {
        Ok(WireEvent::Heartbeat)
    } else if method.eq_ignore_ascii_case("authenticationExpiring") {
        Ok(WireEvent::AuthExpiring)
    } else if method.eq_ignore_ascii_case("candle") {
        let payload = push
            .get("A")
            .and_then(|a| a.get(0))
            .and_then(|p| p.as_str())
            .ok_or(DecodeError::Field("A[0]"))?;
        let json = decompress_payload(payload)?;
        Ok(WireEvent::Candle(parse_candle_delta(&serde_json::from_slice(&json)?)?))
    } else {
        Ok(WireEvent::Ignored)
    }
}

/// Base64-decode then inflate, trying raw deflate first and zlib second.
pub fn decompress_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let compressed = STANDARD.decode(payload)?;

    let mut out = Vec::new();
    if DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }
    out.clear();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut out)
        .map_err(DecodeError::Decompress)?;
    Ok(out)
}

fn parse_candle_delta(v: &serde_json::Value) -> Result<RawCandle, DecodeError> {
    let symbol = v
        .get("marketSymbol")
        .and_then(|s| s.as_str())
        .ok_or(DecodeError::Field("marketSymbol"))?;
    let delta = v.get("delta").ok_or(DecodeError::Field("delta"))?;

    let starts_at = delta
        .get("startsAt")
        .and_then(|s| s.as_str())
        .ok_or(DecodeError::Field("delta.startsAt"))?;
    let timestamp_ms = DateTime::parse_from_rfc3339(starts_at)
        .ok()
        .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
        .ok_or(DecodeError::Field("delta.startsAt"))?;

    Ok(RawCandle {
        raw_symbol: symbol.to_string(),
        timestamp_ms,
        open: parse_f64_field(delta, "open").ok_or(DecodeError::Field("delta.open"))?,
        high: parse_f64_field(delta, "high").ok_or(DecodeError::Field("delta.high"))?,
        low: parse_f64_field(delta, "low").ok_or(DecodeError::Field("delta.low"))?,
        close: parse_f64_field(delta, "close").ok_or(DecodeError::Field("delta.close"))?,
        volume: parse_f64_field(delta, "volume").ok_or(DecodeError::Field("delta.volume"))?,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::{DeflateEncoder, ZlibEncoder};

    use super::*;

    const DELTA: &str = r#"{"sequence":12,"marketSymbol":"ETH-BTC","interval":"MINUTE_1",
        "delta":{"startsAt":"2020-09-24T12:01:00Z","open":"0.0331","high":"0.0333",
        "low":"0.0330","close":"0.0332","volume":"41.7","quoteVolume":"1.38"}}"#;

    fn raw_deflate_b64(json: &str) -> String {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json.as_bytes()).unwrap();
        STANDARD.encode(enc.finish().unwrap())
    }

    fn zlib_b64(json: &str) -> String {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json.as_bytes()).unwrap();
        STANDARD.encode(enc.finish().unwrap())
    }

    fn candle_push(payload: &str) -> String {
        serde_json::json!({ "C": "d-1", "M": [{ "H": "C3", "M": "candle", "A": [payload] }] }).to_string()
    }

    fn expect_candle(events: Vec<WireEvent>) -> RawCandle {
        match events.as_slice() {
            [WireEvent::Candle(c)] => c.clone(),
            other => panic!("expected one candle, got {other:?}"),
        }
    }

    #[test]
    fn raw_deflate_candle() {
        let c = expect_candle(BittrexDecoder.decode(&candle_push(&raw_deflate_b64(DELTA))).unwrap());
        assert_eq!(c.raw_symbol, "ETH-BTC");
        assert_eq!(c.timestamp_ms, 1_600_948_860_000);
        assert_eq!(c.open, 0.0331);
        assert_eq!(c.close, 0.0332);
        assert_eq!(c.volume, 41.7);
    }

    #[test]
    fn zlib_wrapped_candle_falls_back() {
        let c = expect_candle(BittrexDecoder.decode(&candle_push(&zlib_b64(DELTA))).unwrap());
        assert_eq!(c.raw_symbol, "ETH-BTC");
    }

    #[test]
    fn control_pushes() {
        let frame = r#"{"C":"d-2","M":[{"H":"C3","M":"heartbeat","A":[]},{"H":"C3","M":"authenticationExpiring","A":[]}]}"#;
        assert_eq!(BittrexDecoder.decode(frame).unwrap(), vec![WireEvent::Heartbeat, WireEvent::AuthExpiring]);
        assert_eq!(BittrexDecoder.decode("{}").unwrap(), vec![WireEvent::Ignored]);
        assert_eq!(BittrexDecoder.decode(r#"{"C":"s-0","S":1,"M":[]}"#).unwrap(), Vec::<WireEvent>::new());
    }

    #[test]
    fn invocation_results() {
        let ok = BittrexDecoder.decode(r#"{"R":{"Success":true,"ErrorCode":null},"I":"4"}"#).unwrap();
        assert_eq!(
            ok,
            vec![WireEvent::InvocationResult {
                id: 4,
                result: Ok(serde_json::json!({"Success": true, "ErrorCode": null}))
            }]
        );
        let err = BittrexDecoder.decode(r#"{"I":"5","E":"There was an error invoking Hub method"}"#).unwrap();
        assert!(matches!(&err[0], WireEvent::InvocationResult { id: 5, result: Err(_) }));
    }

    #[test]
    fn corrupt_payloads_are_errors() {
        assert!(matches!(BittrexDecoder.decode(&candle_push("%%%")), Err(DecodeError::Base64(_))));
        let not_deflate = STANDARD.encode(b"\xff\xfe\xfd definitely not deflate");
        assert!(BittrexDecoder.decode(&candle_push(&not_deflate)).is_err());
        let bad_time = DELTA.replace("2020-09-24T12:01:00Z", "yesterday");
        assert!(matches!(
            BittrexDecoder.decode(&candle_push(&raw_deflate_b64(&bad_time))),
            Err(DecodeError::Field("delta.startsAt"))
        ));
    }
}
