use std::env;
use std::str::FromStr;

use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::info;

use crate::domain::models::types::is_valid_price;
use crate::domain::services::market_maker::{MarketMakerConfig, MARKET_MAKER_ACCOUNT};

const APP_ID: &str = "APP_ID";
const MM_ACCOUNT_ID: &str = "MM_ACCOUNT_ID";
const MM_SPREAD: &str = "MM_SPREAD";
const MM_BASE_SIZE: &str = "MM_BASE_SIZE";
const MM_MAX_INVENTORY: &str = "MM_MAX_INVENTORY";
const MM_SKEW_FACTOR: &str = "MM_SKEW_FACTOR";
const MM_DEFAULT_FAIR_PRICE: &str = "MM_DEFAULT_FAIR_PRICE";
const QUOTE_REFRESH_SPREAD: &str = "QUOTE_REFRESH_SPREAD";
const SNAPSHOT_DEPTH: &str = "SNAPSHOT_DEPTH";
const STARTING_BALANCE: &str = "STARTING_BALANCE";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("failed to parse environment variable {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub app_id: String,
    pub market_maker: MarketMakerConfig,
    /// Quotes are refreshed when a book's spread is wider than this or undefined.
    pub quote_refresh_spread: Decimal,
    pub snapshot_depth: usize,
    /// Balance credited to every newly opened account.
    pub starting_balance: Decimal,
}

impl Config {
    pub fn try_from_env() -> Result<Config, ConfigError> {
        // Load .env file
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, falling back to defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let mm = &defaults.market_maker;

        let app_id = lookup(APP_ID).unwrap_or(defaults.app_id.clone());

        let default_fair_price = parse_or(&lookup, MM_DEFAULT_FAIR_PRICE, mm.default_fair_price)?;
        if !is_valid_price(default_fair_price) {
            return Err(ConfigError::Invalid {
                key: MM_DEFAULT_FAIR_PRICE,
                value: default_fair_price.to_string(),
            });
        }

        let market_maker = MarketMakerConfig {
            account_id: parse_or(&lookup, MM_ACCOUNT_ID, mm.account_id)?,
            spread: parse_or(&lookup, MM_SPREAD, mm.spread)?,
            base_size: parse_or(&lookup, MM_BASE_SIZE, mm.base_size)?,
            default_fair_price,
            max_inventory: parse_or(&lookup, MM_MAX_INVENTORY, mm.max_inventory)?,
            inventory_skew_factor: parse_or(&lookup, MM_SKEW_FACTOR, mm.inventory_skew_factor)?,
            ..mm.clone()
        };

        let config = Config {
            app_id,
            market_maker,
            quote_refresh_spread: parse_or(&lookup, QUOTE_REFRESH_SPREAD, defaults.quote_refresh_spread)?,
            snapshot_depth: parse_or(&lookup, SNAPSHOT_DEPTH, defaults.snapshot_depth)?,
            starting_balance: parse_or(&lookup, STARTING_BALANCE, defaults.starting_balance)?,
        };
        info!(app_id = %config.app_id, spread = %config.market_maker.spread, "configuration loaded");
        Ok(config)
    }
}

/// Exchange defaults. The market maker starts from [`MarketMakerConfig::default`] and quotes
/// wider (0.06) with a larger inventory limit (1000) than a standalone market maker.
impl Default for Config {
    fn default() -> Config {
        Config {
            app_id: "outcome-exchange".to_string(),
            market_maker: MarketMakerConfig {
                account_id: MARKET_MAKER_ACCOUNT,
                spread: dec!(0.06),
                max_inventory: 1000,
                ..MarketMakerConfig::default()
            },
            quote_refresh_spread: dec!(0.10),
            snapshot_depth: 10,
            starting_balance: dec!(1000),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw.clone(),
        }),
    }
}
