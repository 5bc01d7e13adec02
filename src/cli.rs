//! Command-line interface parsing for pricebadge
//!
//! This module turns clap arguments into a validated `Config` for startup.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::price::coingecko::COINGECKO_SIMPLE_PRICE_URL;
use crate::refresh::RefreshConfig;
use crate::scheduler::{SchedulerConfig, Trigger};

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// A duration flag was zero
    #[error("Invalid duration for --{0}: must be at least 1")]
    InvalidDuration(&'static str),

    /// A duration flag does not fit in a `Duration`
    #[error("Invalid duration for --{0}: value is too large")]
    DurationTooLarge(&'static str),

    /// An asset or fiat code was empty or contained unexpected characters
    #[error("Invalid {kind}: '{value}'. Use lowercase letters, digits and '-'")]
    InvalidIdentifier { kind: &'static str, value: String },
}

/// pricebadge - a periodically refreshed exchange-rate badge
#[derive(Parser, Debug)]
#[command(name = "pricebadge")]
#[command(about = "Fetch, cache and display a crypto exchange rate as a compact badge")]
#[command(version)]
pub struct Cli {
    /// CoinGecko asset id to track
    #[arg(long, default_value = "monero", value_name = "ID")]
    pub asset: String,

    /// Fiat currency the price is quoted in
    #[arg(long, default_value = "usd", value_name = "CODE")]
    pub fiat: String,

    /// Base URL of the simple-price endpoint
    #[arg(long, default_value = COINGECKO_SIMPLE_PRICE_URL, value_name = "URL")]
    pub endpoint: String,

    /// Minutes between scheduled updates
    #[arg(long, default_value_t = 30, value_name = "MINUTES")]
    pub interval_mins: u64,

    /// Minutes after which the cached price is considered stale
    #[arg(long, default_value_t = 30, value_name = "MINUTES")]
    pub stale_mins: u64,

    /// Seconds to wait before retrying a network failure
    #[arg(long, default_value_t = 30, value_name = "SECONDS")]
    pub retry_secs: u64,

    /// Directory for the persistent cache (defaults to the XDG cache dir)
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Run a single update, print the badge and exit
    ///
    /// Exits with status 1 when the badge shows an error.
    #[arg(long)]
    pub once: bool,

    /// With --once, ignore the cache and always fetch
    #[arg(long, requires = "once")]
    pub force: bool,
}

/// Validated configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Config {
    pub asset: String,
    pub fiat: String,
    pub endpoint: String,
    pub refresh: RefreshConfig,
    pub scheduler: SchedulerConfig,
    pub cache_dir: Option<PathBuf>,
    pub once: bool,
    pub force: bool,
}

impl Config {
    /// Creates a Config from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Config)` with durations converted and identifiers normalized
    /// * `Err(CliError)` if a duration is zero or an identifier is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        Ok(Config {
            asset: parse_identifier("asset", &cli.asset)?,
            fiat: parse_identifier("fiat", &cli.fiat)?,
            endpoint: cli.endpoint.clone(),
            refresh: RefreshConfig {
                interval: minutes("interval-mins", cli.interval_mins)?,
                ..RefreshConfig::default()
            },
            scheduler: SchedulerConfig {
                stale_after: minutes("stale-mins", cli.stale_mins)?,
                retry_delay: seconds("retry-secs", cli.retry_secs)?,
            },
            cache_dir: cli.cache_dir.clone(),
            once: cli.once,
            force: cli.force,
        })
    }

    /// Trigger used for the single cycle in `--once` mode
    pub fn once_trigger(&self) -> Trigger {
        if self.force {
            Trigger::ManualRefresh
        } else {
            Trigger::ScheduledTick
        }
    }
}

fn minutes(flag: &'static str, value: u64) -> Result<Duration, CliError> {
    let secs = value
        .checked_mul(60)
        .ok_or(CliError::DurationTooLarge(flag))?;
    seconds(flag, secs)
}

fn seconds(flag: &'static str, value: u64) -> Result<Duration, CliError> {
    if value == 0 {
        return Err(CliError::InvalidDuration(flag));
    }
    Ok(Duration::from_secs(value))
}

/// Lowercases and validates an asset id or fiat code
pub fn parse_identifier(kind: &'static str, value: &str) -> Result<String, CliError> {
    let normalized = value.trim().to_lowercase();
    let valid = !normalized.is_empty()
        && normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(CliError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(normalized)
}
