//! Configuration parsing for candlewick.
//!
//! The whole process reads its settings from a single JSON config file. The
//! top-level structure contains service metadata, the shared-store connection,
//! and an `exchanges` array where each entry describes one streaming session.
//!
//! # Example config
//!
//! ```json
//! {
//!   "service": { "module_name": "candlewick", "log_path": "/tmp/log", "log_format": "json" },
//!   "store": { "url": "redis://127.0.0.1:6379/0" },
//!   "exchanges": [
//!     { "exchange": "binance", "max_sub_per_conn": 200,
//!       "rate_limit": { "algorithm": "gcra", "rate_limit": 5, "period_ms": 1000 } },
//!     { "exchange": "bittrex", "api_key": "...", "api_secret": "..." }
//!   ]
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::CwError;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service metadata (name, log path).
    pub service: Option<ServiceMeta>,

    /// Shared key-value store connection.
    pub store: StoreConfig,

    /// One entry per exchange session run by this process.
    pub exchanges: Vec<ExchangeConfig>,
}

impl AppConfig {
    /// Returns the module name used as the log file prefix.
    pub fn module_name(&self) -> String {
        self.service
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "candlewick".to_string())
    }

    /// Returns the log directory, if file logging is configured.
    pub fn log_path(&self) -> Option<String> {
        self.service.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Format of the log files (default: text).
    pub fn log_format(&self) -> LogFormat {
        self.service.as_ref().and_then(|m| m.log_format).unwrap_or_default()
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), CwError> {
        if self.exchanges.is_empty() {
            return Err(CwError::Config("no exchanges configured".into()));
        }
        for ex in &self.exchanges {
            if let Some(rl) = &ex.rate_limit {
                if rl.rate_limit == 0 || rl.period_ms == 0 {
                    return Err(CwError::Config(format!(
                        "{}: rate_limit and period_ms must be positive",
                        ex.exchange
                    )));
                }
                if rl.period_ms.saturating_mul(1_000) / u64::from(rl.rate_limit) == 0 {
                    return Err(CwError::Config(format!(
                        "{}: {} requests per {} ms is below microsecond spacing",
                        ex.exchange, rl.rate_limit, rl.period_ms
                    )));
                }
            }
            if let Some([lo, hi]) = ex.jitter_ms {
                if lo > hi {
                    return Err(CwError::Config(format!("{}: jitter_ms must be [min, max]", ex.exchange)));
                }
            }
        }
        Ok(())
    }
}

/// Service metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Encoding of file log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Shared-store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Redis URL, e.g. `redis://:password@host:6379/0`.
    pub url: String,

    /// Hard lease of the rate-limiter lock (default: 5000 ms).
    pub lock_lease_ms: Option<u64>,

    /// Bounded wait when acquiring the rate-limiter lock (default: 10 ms).
    pub lock_wait_ms: Option<u64>,
}

impl StoreConfig {
    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms.unwrap_or(5_000))
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms.unwrap_or(10))
    }
}

/// Rate-limiting algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    Gcra,
    LeakyBucket,
    SlidingWindow,
}

impl RateLimitAlgorithm {
    /// Suffix used in the rate-limit state key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcra => "gcra",
            Self::LeakyBucket => "leaky_bucket",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

/// Per-exchange request budget shared by every process of the fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub algorithm: RateLimitAlgorithm,
    /// Requests allowed per `period_ms`.
    pub rate_limit: u32,
    pub period_ms: u64,
    /// Retry delay after a denial for leaky bucket / sliding window (default: 10 ms).
    pub retry_interval_ms: Option<u64>,
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.unwrap_or(10))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: RateLimitAlgorithm::Gcra,
            rate_limit: 5,
            period_ms: 1_000,
            retry_interval_ms: None,
        }
    }
}

/// A single exchange session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange identifier: `"binance"` or `"bittrex"`.
    pub exchange: String,

    /// Websocket endpoint override.
    pub ws_url: Option<String>,

    /// REST base URL override (symbol metadata).
    pub rest_url: Option<String>,

    /// Maximum channels per connection (default: 200).
    pub max_sub_per_conn: Option<usize>,

    /// Seconds without inbound activity before a connection is recycled (default: 60).
    pub staleness_sec: Option<u64>,

    /// Supervisory staleness check interval in milliseconds (default: 1000).
    pub check_interval_ms: Option<u64>,

    /// Reconnect jitter range `[min, max]` in milliseconds (default: `[1000, 5000]`).
    pub jitter_ms: Option<[u64; 2]>,

    /// Outbound request budget.
    pub rate_limit: Option<RateLimitConfig>,

    /// Restrict the session to these raw symbols instead of the full listing.
    pub symbols: Option<Vec<String>>,

    /// Optional API key for signed session authentication.
    pub api_key: Option<String>,

    /// Optional API secret, passed opaquely to the signing routine.
    pub api_secret: Option<String>,
}

impl ExchangeConfig {
    pub fn max_sub_per_conn(&self) -> usize {
        self.max_sub_per_conn.unwrap_or(200)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_sec.unwrap_or(60))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.unwrap_or(1_000))
    }

    pub fn jitter(&self) -> (Duration, Duration) {
        let [lo, hi] = self.jitter_ms.unwrap_or([1_000, 5_000]);
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit.clone().unwrap_or_default()
    }

    /// Credentials are only usable when both halves are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_secret.as_deref()) {
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty() => Some((k, s)),
            _ => None,
        }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "store": { "url": "redis://127.0.0.1:6379/0" },
        "exchanges": [
            { "exchange": "binance",
              "rate_limit": { "algorithm": "leaky_bucket", "rate_limit": 10, "period_ms": 1000 } },
            { "exchange": "bittrex", "api_key": "k", "api_secret": "" }
        ]
    }"#;

    #[test]
    fn defaults_apply() {
        let cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.module_name(), "candlewick");
        assert_eq!(cfg.log_format(), LogFormat::Text);
        assert_eq!(cfg.store.lock_lease(), Duration::from_secs(5));
        assert_eq!(cfg.store.lock_wait(), Duration::from_millis(10));

        let binance = &cfg.exchanges[0];
        assert_eq!(binance.max_sub_per_conn(), 200);
        assert_eq!(binance.staleness(), Duration::from_secs(60));
        assert_eq!(binance.rate_limit().algorithm, RateLimitAlgorithm::LeakyBucket);
        assert_eq!(binance.rate_limit().retry_interval(), Duration::from_millis(10));
    }

    #[test]
    fn json_file_logs_are_selectable() {
        let raw = SAMPLE.replacen("{", r#"{ "service": { "log_path": "/tmp/cw", "log_format": "json" },"#, 1);
        let cfg: AppConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(cfg.log_format(), LogFormat::Json);
        assert_eq!(cfg.log_path().as_deref(), Some("/tmp/cw"));
    }

    #[test]
    fn empty_secret_disables_auth() {
        let cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        assert!(cfg.exchanges[1].credentials().is_none());
    }

    #[test]
    fn zero_rate_is_rejected() {
        let raw = SAMPLE.replace("\"rate_limit\": 10", "\"rate_limit\": 0");
        let cfg: AppConfig = serde_json::from_str(&raw).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sub_microsecond_spacing_is_rejected() {
        let raw = SAMPLE.replace("\"rate_limit\": 10, \"period_ms\": 1000", "\"rate_limit\": 2000, \"period_ms\": 1");
        let cfg: AppConfig = serde_json::from_str(&raw).unwrap();
        assert!(cfg.validate().unwrap_err().to_string().contains("microsecond"));

        let raw = SAMPLE.replace("\"rate_limit\": 10, \"period_ms\": 1000", "\"rate_limit\": 1000, \"period_ms\": 1");
        let cfg: AppConfig = serde_json::from_str(&raw).unwrap();
        cfg.validate().unwrap();
    }
}
