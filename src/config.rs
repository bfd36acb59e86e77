//! Runtime configuration loaded from environment variables

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;

use crate::indicators::WARMUP_BARS;
use crate::types::{Pair, Timeframe, TimeframeRequest};

/// Cycle cadence: a fixed interval from the previous cycle, or aligned to
/// wall-clock hour boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Interval(Duration),
    HourAligned,
}

impl Cadence {
    /// Delay until the next cycle should start
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Cadence::Interval(d) => *d,
            Cadence::HourAligned => {
                let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
                Duration::from_secs((3600 - into_hour).max(1))
            }
        }
    }
}

/// Naver-style news search credentials (optional capability)
#[derive(Debug, Clone)]
pub struct NaverCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Headless-browser chart capture settings (optional capability)
#[derive(Debug, Clone)]
pub struct ChartSettings {
    pub bin: String,
    /// Chart page URL; `{pair}` is replaced with the market code
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pair: Pair,
    pub cadence: Cadence,
    /// Sleep after a skipped cycle, shorter than the normal cadence
    pub recovery: Duration,
    /// Smallest trade value (quote currency) worth executing
    pub min_notional: Decimal,
    /// Fraction of a buy reserved for fees, e.g. 0.0005
    pub fee_buffer: Decimal,
    pub timeframes: Vec<TimeframeRequest>,
    /// Trailing ledger window fed into the reflection, in days
    pub reflection_days: i64,
    /// How long cached headlines stay fresh
    pub news_refresh: Duration,
    pub db_path: String,
    pub upbit_access_key: String,
    pub upbit_secret_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub naver: Option<NaverCredentials>,
    pub chart: Option<ChartSettings>,
}

impl Config {
    /// Load configuration from the environment, with defaults for every
    /// tunable. Exchange and oracle credentials are required.
    pub fn from_env() -> anyhow::Result<Self> {
        let pair = Pair::parse(&env_or("PAIR", "KRW-BTC"))?;

        let cadence = if matches!(env_or("ALIGN_TO_HOUR", "false").as_str(), "true" | "1") {
            Cadence::HourAligned
        } else {
            let secs: u64 = env_or("CYCLE_INTERVAL_SECS", "600")
                .parse()
                .context("invalid CYCLE_INTERVAL_SECS")?;
            Cadence::Interval(Duration::from_secs(secs))
        };

        let recovery_secs: u64 = env_or("RECOVERY_INTERVAL_SECS", "60")
            .parse()
            .context("invalid RECOVERY_INTERVAL_SECS")?;

        let min_notional = Decimal::from_str(&env_or("MIN_NOTIONAL", "5000"))
            .context("invalid MIN_NOTIONAL")?;
        let fee_buffer =
            Decimal::from_str(&env_or("FEE_BUFFER", "0.0005")).context("invalid FEE_BUFFER")?;

        let timeframes = parse_timeframes(&env_or("TIMEFRAMES", "day:64,hour:48"))?;

        let reflection_days: i64 = env_or("REFLECTION_DAYS", "7")
            .parse()
            .context("invalid REFLECTION_DAYS")?;
        let news_refresh_secs: u64 = env_or("NEWS_REFRESH_SECS", "3600")
            .parse()
            .context("invalid NEWS_REFRESH_SECS")?;

        let naver = match (
            std::env::var("NAVER_CLIENT_ID").ok(),
            std::env::var("NAVER_CLIENT_SECRET").ok(),
        ) {
            (Some(client_id), Some(client_secret)) => Some(NaverCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let chart = match (
            std::env::var("CHART_BIN").ok(),
            std::env::var("CHART_URL").ok(),
        ) {
            (Some(bin), Some(url)) => Some(ChartSettings { bin, url }),
            _ => None,
        };

        Ok(Self {
            pair,
            cadence,
            recovery: Duration::from_secs(recovery_secs),
            min_notional,
            fee_buffer,
            timeframes,
            reflection_days,
            news_refresh: Duration::from_secs(news_refresh_secs),
            db_path: env_or("DATABASE_PATH", "trades.db"),
            upbit_access_key: env_required("UPBIT_ACCESS_KEY")?,
            upbit_secret_key: env_required("UPBIT_SECRET_KEY")?,
            gemini_api_key: env_required("GEMINI_KEY")?,
            gemini_model: env_or("GEMINI_MODEL", "gemini-2.0-flash"),
            naver,
            chart,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{} environment variable required", key))
}

/// Parse a timeframe spec like "day:64,hour:48". Every requested series
/// must be long enough to survive the indicator warm-up.
pub fn parse_timeframes(spec: &str) -> anyhow::Result<Vec<TimeframeRequest>> {
    let mut requests = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tf, count) = part
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid timeframe entry: {}", part))?;
        let timeframe = Timeframe::parse(tf)?;
        let count: u32 = count
            .parse()
            .with_context(|| format!("invalid bar count in: {}", part))?;
        if count as usize <= WARMUP_BARS {
            return Err(anyhow::anyhow!(
                "timeframe {} needs more than {} bars for indicator warm-up, got {}",
                tf,
                WARMUP_BARS,
                count
            ));
        }
        requests.push(TimeframeRequest { timeframe, count });
    }
    if requests.is_empty() {
        return Err(anyhow::anyhow!("at least one timeframe must be requested"));
    }
    Ok(requests)
}
