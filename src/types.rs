//! Core data model for the decision-execution cycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset pair traded by the bot, written quote-first (e.g. "KRW-BTC")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    /// Parse a market code like "KRW-BTC" (quote-base)
    pub fn parse(code: &str) -> anyhow::Result<Self> {
        let (quote, base) = code
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("invalid pair code: {}", code))?;
        if quote.is_empty() || base.is_empty() {
            return Err(anyhow::anyhow!("invalid pair code: {}", code));
        }
        Ok(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    /// Market code in exchange order, e.g. "KRW-BTC"
    pub fn code(&self) -> String {
        format!("{}-{}", self.quote, self.base)
    }
}

/// Candle timeframes the assembler can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Day,
    Hour,
    Minute30,
    Minute10,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Hour => "hour",
            Timeframe::Minute30 => "minute30",
            Timeframe::Minute10 => "minute10",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "day" => Ok(Timeframe::Day),
            "hour" | "minute60" => Ok(Timeframe::Hour),
            "minute30" => Ok(Timeframe::Minute30),
            "minute10" => Ok(Timeframe::Minute10),
            other => Err(anyhow::anyhow!("unknown timeframe: {}", other)),
        }
    }
}

/// One requested OHLCV series: timeframe plus bar count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeRequest {
    pub timeframe: Timeframe,
    pub count: u32,
}

/// Raw OHLCV bar as returned by the exchange, oldest-first in a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Candle enriched with the full indicator set. Only bars past the
/// indicator warm-up ever become annotated; there are no null fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedCandle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub sma_20: f64,
    pub ema_12: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_diff: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
}

/// An annotated series tagged with its timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvSeries {
    pub timeframe: Timeframe,
    pub candles: Vec<AnnotatedCandle>,
}

/// Account balances for the traded pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    /// Base-currency holdings (e.g. BTC)
    pub base: Decimal,
    /// Average buy price of the base holdings, in quote currency
    pub base_avg_buy_price: Decimal,
    /// Quote-currency holdings (e.g. KRW)
    pub quote: Decimal,
}

/// One price level of the orderbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub ask_price: Decimal,
    pub bid_price: Decimal,
    pub ask_size: Decimal,
    pub bid_size: Decimal,
}

/// Current orderbook: best bid/ask plus depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orderbook {
    pub timestamp: DateTime<Utc>,
    pub units: Vec<OrderbookLevel>,
}

impl Orderbook {
    pub fn best_ask(&self) -> Option<Decimal> {
        self.units.first().map(|u| u.ask_price)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.units.first().map(|u| u.bid_price)
    }
}

/// A single news headline with its publication date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub date: String,
}

/// Sentiment signals merged into the snapshot. Both sources are optional
/// and degrade to None/empty when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub fear_greed_index: Option<i32>,
    pub headlines: Vec<Headline>,
}

/// One cycle's fully-assembled, immutable view of market + account state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pair: Pair,
    pub balances: Balances,
    pub orderbook: Orderbook,
    pub current_price: Decimal,
    pub series: Vec<OhlcvSeries>,
    pub sentiment: Sentiment,
}

/// The closed three-state decision type the oracle adapter produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        }
    }
}

impl std::str::FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            "hold" => Ok(TradeAction::Hold),
            other => Err(anyhow::anyhow!("unknown trade action: {}", other)),
        }
    }
}

/// Validated trading decision. Invariants are enforced by the oracle
/// adapter: HOLD implies percentage 0, BUY/SELL imply percentage in 1..=100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: TradeAction,
    pub percentage: u8,
    pub reason: String,
}

impl Decision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Hold,
            percentage: 0,
            reason: reason.into(),
        }
    }
}

/// One persisted ledger row. Append-only; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    /// Percentage actually executed; 0 if no order was placed
    pub percentage: u8,
    pub reason: String,
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub base_avg_buy_price: Decimal,
    /// Base price in quote currency at cycle time
    pub base_price: Decimal,
    /// Reflection critique injected into this cycle's oracle request
    pub reflection: String,
}

impl TradeRecord {
    /// Portfolio value at record time: quote + base x price
    pub fn portfolio_value(&self) -> Decimal {
        self.quote_balance + self.base_balance * self.base_price
    }
}
