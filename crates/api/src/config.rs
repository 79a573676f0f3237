//! Application configuration loaded from environment variables.

use std::str::FromStr;

use domain::{FeeSchedule, MarketSettings, Money};
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres connection string; unset means in-memory storage
/// - `JWT_SECRET` — token signing secret (required)
/// - `TOKEN_TTL_SECS` — token lifetime (default: one day)
/// - `DELIVERY_CHARGE` — flat delivery charge in minor units (default: `30000`)
/// - `PLATFORM_FEE_BPS` — platform fee in basis points of the subtotal (default: `200`)
/// - `AGENT_COMMISSION_BPS` — agent commission in basis points (default: `300`)
/// - `MARKET_REGIONS` — comma-separated region names (default: the eight divisions)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub market: MarketSettings,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = MarketSettings::default();

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let fees = FeeSchedule {
            delivery_charge: Money::from_minor(parse_or(
                &var,
                "DELIVERY_CHARGE",
                defaults.fees.delivery_charge.minor(),
            )?),
            platform_fee_bps: parse_or(&var, "PLATFORM_FEE_BPS", defaults.fees.platform_fee_bps)?,
            agent_commission_bps: parse_or(
                &var,
                "AGENT_COMMISSION_BPS",
                defaults.fees.agent_commission_bps,
            )?,
        };
        if fees.delivery_charge.minor() < 0 {
            return Err(ConfigError::Invalid {
                var: "DELIVERY_CHARGE",
                value: fees.delivery_charge.minor().to_string(),
            });
        }

        let regions = match var("MARKET_REGIONS") {
            Some(list) => {
                let regions: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect();
                if regions.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "MARKET_REGIONS",
                        value: list,
                    });
                }
                regions
            }
            None => defaults.regions,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "PORT", 3000)?,
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: var("DATABASE_URL"),
            jwt_secret,
            token_ttl_secs: parse_or(&var, "TOKEN_TTL_SECS", 86_400)?,
            market: MarketSettings { fees, regions },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: key,
            value: raw,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.token_ttl_secs, 86_400);
        assert_eq!(config.market.fees.delivery_charge.minor(), 30_000);
        assert_eq!(config.market.regions.len(), 8);
    }

    #[test]
    fn test_secret_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(
            load(&[("JWT_SECRET", "  ")]),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("JWT_SECRET", "s3cret"),
            ("PORT", "8080"),
            ("PLATFORM_FEE_BPS", "150"),
            ("MARKET_REGIONS", "North, South ,,East"),
        ])
        .unwrap();
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.market.fees.platform_fee_bps, 150);
        assert_eq!(config.market.regions, vec!["North", "South", "East"]);
    }

    #[test]
    fn test_invalid_numbers_are_reported() {
        let err = load(&[("JWT_SECRET", "s3cret"), ("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for PORT: eighty");
        assert!(load(&[("JWT_SECRET", "s3cret"), ("DELIVERY_CHARGE", "-5")]).is_err());
    }
}
