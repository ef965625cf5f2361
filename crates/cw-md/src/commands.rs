//! Run-mode command table.
//!
//! A run mode decides which symbols each configured exchange streams:
//!
//! | Name | Symbols |
//! |---|---|
//! | `all` | every listed symbol (optionally narrowed by `symbols` in config) |
//! | `mutual` | only `(base, quote)` pairs listed on every configured exchange |

use anyhow::Result;
use cw_core::Exchange;
use cw_core::config::AppConfig;
use cw_core::error::CwError;
use tracing::info;

use crate::MdModule;
use crate::context::ServiceContext;
use crate::registry;
use crate::symbols::{SymbolLookup, mutual_base_quotes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    All,
    Mutual,
}

pub const RUN_MODES: &[(&str, RunMode)] = &[("all", RunMode::All), ("mutual", RunMode::Mutual)];

impl RunMode {
    pub fn names() -> Vec<&'static str> {
        RUN_MODES.iter().map(|(name, _)| *name).collect()
    }
}

impl std::str::FromStr for RunMode {
    type Err = CwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RUN_MODES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, mode)| *mode)
            .ok_or_else(|| {
                CwError::Config(format!("unknown run mode '{s}' (expected one of: {})", Self::names().join(", ")))
            })
    }
}

/// Narrow each lookup to the symbols `mode` selects.
pub fn apply_run_mode(mode: RunMode, lookups: &mut [SymbolLookup]) {
    if mode == RunMode::Mutual {
        let common = mutual_base_quotes(lookups);
        info!("[commands] {} mutual pairs across {} exchanges", common.len(), lookups.len());
        for lookup in lookups.iter_mut() {
            lookup.retain_base_quotes(&common);
        }
    }
}

/// Build one streaming session per configured exchange.
pub async fn build_sessions(ctx: &ServiceContext, config: &AppConfig, mode: RunMode) -> Result<Vec<Box<dyn MdModule>>> {
    let mut plans = Vec::with_capacity(config.exchanges.len());
    let mut lookups = Vec::with_capacity(config.exchanges.len());

    for cfg in &config.exchanges {
        let exchange: Exchange = cfg.exchange.parse()?;
        let limiter = ctx.rate_limiter(exchange, &cfg.rate_limit());
        let mut lookup = registry::load_symbols(ctx, exchange, cfg, limiter.as_ref()).await?;
        if let Some(symbols) = &cfg.symbols {
            lookup.retain_symbols(symbols);
        }
        plans.push((cfg, limiter));
        lookups.push(lookup);
    }

    apply_run_mode(mode, &mut lookups);

    Ok(plans
        .into_iter()
        .zip(lookups)
        .map(|((cfg, limiter), lookup)| {
            Box::new(registry::create_session(ctx, cfg, limiter, lookup)) as Box<dyn MdModule>
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use cw_core::SymbolPair;

    use super::*;

    #[test]
    fn run_modes_parse_and_reject_unknown() {
        assert_eq!("all".parse::<RunMode>().unwrap(), RunMode::All);
        assert_eq!("Mutual".parse::<RunMode>().unwrap(), RunMode::Mutual);
        let err = "mutual_basequote".parse::<RunMode>().unwrap_err();
        assert!(err.to_string().contains("all, mutual"));
    }

    #[test]
    fn mutual_mode_keeps_shared_pairs_only() {
        let mut lookups = vec![
            SymbolLookup::new(
                Exchange::Binance,
                [
                    SymbolPair::new(Exchange::Binance, "ETHBTC", "ETH", "BTC"),
                    SymbolPair::new(Exchange::Binance, "BNBBTC", "BNB", "BTC"),
                ],
            ),
            SymbolLookup::new(
                Exchange::Bittrex,
                [
                    SymbolPair::new(Exchange::Bittrex, "ETH-BTC", "ETH", "BTC"),
                    SymbolPair::new(Exchange::Bittrex, "XYZ-BTC", "XYZ", "BTC"),
                ],
            ),
        ];

        let mut all = lookups.clone();
        apply_run_mode(RunMode::All, &mut all);
        assert_eq!(all[0].len(), 2);

        apply_run_mode(RunMode::Mutual, &mut lookups);
        assert_eq!(lookups[0].raw_symbols(), vec!["ETHBTC"]);
        assert_eq!(lookups[1].raw_symbols(), vec!["ETH-BTC"]);
    }
}
