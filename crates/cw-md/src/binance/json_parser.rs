//! Binance JSON message parser.
//!
//! Parses WebSocket JSON messages from the Binance Spot stream into
//! [`WireEvent`]s. Numeric fields arrive as strings and are converted with
//! `fast-float2` through [`crate::json_util`].

use cw_core::RawCandle;

use crate::decoder::{DecodeError, WireDecoder, WireEvent};
use crate::json_util::{parse_f64_field, parse_str_u64};

/// Build the subscribe request for one connection's batch.
pub fn build_kline_subscribe(symbols: &[String], id: u64) -> String {
    let params: Vec<String> = symbols.iter().map(|s| format!("{}@kline_1m", s.to_lowercase())).collect();
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": id
    })
    .to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceDecoder;

impl WireDecoder for BinanceDecoder {
    fn decode(&self, frame: &str) -> Result<Vec<WireEvent>, DecodeError> {
        let v: serde_json::Value = serde_json::from_str(frame)?;
        // Combined streams wrap the payload as {"stream": ..., "data": {...}}.
        let v = v.get("data").unwrap_or(&v);

        if let Some(result) = v.get("result") {
            return if result.is_null() {
                Ok(vec![WireEvent::SubscribeAck { id: parse_str_u64(v.get("id")) }])
            } else {
                Err(DecodeError::Protocol(format!("unexpected subscribe result: {result}")))
            };
        }
        if let Some(err) = v.get("error") {
            return Err(DecodeError::Protocol(format!("request rejected: {err}")));
        }

        match v.get("e").and_then(|e| e.as_str()) {
            Some("kline") => Ok(vec![WireEvent::Candle(parse_kline(v)?)]),
            _ => Ok(vec![WireEvent::Ignored]),
        }
    }
}

// ---------------------------------------------------------------------------
// Individual parsers
// ---------------------------------------------------------------------------

fn parse_kline(v: &serde_json::Value) -> Result<RawCandle, DecodeError> {
    let symbol = v.get("s").and_then(|s| s.as_str()).ok_or(DecodeError::Field("s"))?;
    let k = v.get("k").ok_or(DecodeError::Field("k"))?;

    Ok(RawCandle {
        raw_symbol: symbol.to_string(),
        timestamp_ms: parse_str_u64(k.get("t")).ok_or(DecodeError::Field("k.t"))?,
        open: parse_f64_field(k, "o").ok_or(DecodeError::Field("k.o"))?,
        high: parse_f64_field(k, "h").ok_or(DecodeError::Field("k.h"))?,
        low: parse_f64_field(k, "l").ok_or(DecodeError::Field("k.l"))?,
        close: parse_f64_field(k, "c").ok_or(DecodeError::Field("k.c"))?,
        volume: parse_f64_field(k, "v").ok_or(DecodeError::Field("k.v"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KLINE: &str = r#"{"e":"kline","E":1672515782136,"s":"ETHBTC","k":{
        "t":1672515780000,"T":1672515839999,"s":"ETHBTC","i":"1m",
        "o":"0.0652","c":"0.0655","h":"0.0660","l":"0.0650","v":"12.5","x":false}}"#;

    #[test]
    fn subscribe_lowercases_symbols() {
        let msg = build_kline_subscribe(&["ETHBTC".into(), "BNBBTC".into()], 3);
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["method"], "SUBSCRIBE");
        assert_eq!(v["params"][0], "ethbtc@kline_1m");
        assert_eq!(v["params"][1], "bnbbtc@kline_1m");
        assert_eq!(v["id"], 3);
    }

    #[test]
    fn kline_decodes_to_candle() {
        let events = BinanceDecoder.decode(KLINE).unwrap();
        let WireEvent::Candle(c) = &events[0] else { panic!("expected candle, got {events:?}") };
        assert_eq!(c.raw_symbol, "ETHBTC");
        assert_eq!(c.timestamp_ms, 1672515780000);
        assert_eq!(c.open, 0.0652);
        assert_eq!(c.high, 0.0660);
        assert_eq!(c.low, 0.0650);
        assert_eq!(c.close, 0.0655);
        assert_eq!(c.volume, 12.5);
    }

    #[test]
    fn combined_stream_envelope_is_unwrapped() {
        let frame = format!(r#"{{"stream":"ethbtc@kline_1m","data":{KLINE}}}"#);
        let events = BinanceDecoder.decode(&frame).unwrap();
        assert!(matches!(events[0], WireEvent::Candle(_)));
    }

    #[test]
    fn acknowledgements() {
        let ack = BinanceDecoder.decode(r#"{"result":null,"id":1}"#).unwrap();
        assert_eq!(ack, vec![WireEvent::SubscribeAck { id: Some(1) }]);

        let nack = BinanceDecoder.decode(r#"{"result":["x"],"id":1}"#);
        assert!(matches!(nack, Err(DecodeError::Protocol(_))));

        let err = BinanceDecoder.decode(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#);
        assert!(matches!(err, Err(DecodeError::Protocol(_))));
    }

    #[test]
    fn malformed_frames_are_errors_not_panics() {
        assert!(matches!(BinanceDecoder.decode("not json"), Err(DecodeError::Json(_))));
        let missing = BinanceDecoder.decode(r#"{"e":"kline","s":"ETHBTC","k":{"t":1}}"#);
        assert!(matches!(missing, Err(DecodeError::Field("k.o"))));
        assert_eq!(BinanceDecoder.decode(r#"{"e":"trade"}"#).unwrap(), vec![WireEvent::Ignored]);
    }
}
