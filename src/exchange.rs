//! Exchange capability: narrow interface plus the live Upbit REST client

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::debug;
use uuid::Uuid;

use crate::types::{Balances, Candle, Orderbook, OrderbookLevel, Pair, Timeframe};

/// A market order derived from a validated Decision. Ephemeral: only its
/// outcome is ever persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketOrder {
    /// Spend this many quote-currency units at market
    Buy { spend: Decimal },
    /// Sell this many base-currency units at market
    Sell { volume: Decimal },
}

/// Receipt for a placed order
#[derive(Debug, Clone, Deserialize)]
pub struct OrderReceipt {
    pub uuid: String,
    #[serde(default)]
    pub state: String,
}

/// Narrow exchange interface the rest of the system depends on
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Balances for the traded pair's base and quote currencies
    async fn get_balances(&self, pair: &Pair) -> anyhow::Result<Balances>;

    async fn get_orderbook(&self, pair: &Pair) -> anyhow::Result<Orderbook>;

    /// OHLCV bars, oldest-first
    async fn get_ohlcv(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        count: u32,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn get_current_price(&self, pair: &Pair) -> anyhow::Result<Decimal>;

    async fn place_market_order(
        &self,
        pair: &Pair,
        order: MarketOrder,
    ) -> anyhow::Result<OrderReceipt>;
}

/// Live Upbit spot REST client
pub struct UpbitClient {
    client: Client,
    base_url: String,
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct UpbitClaims<'a> {
    access_key: &'a str,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<&'static str>,
}

impl UpbitClient {
    pub fn new(access_key: &str, secret_key: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: "https://api.upbit.com".to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    /// Override the API endpoint (tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Bearer token for an authenticated call; `query` is the urlencoded
    /// parameter string that must be SHA-512 hashed into the claims.
    fn auth_token(&self, query: Option<&str>) -> anyhow::Result<String> {
        let (query_hash, query_hash_alg) = match query {
            Some(qs) => {
                let mut hasher = Sha512::new();
                hasher.update(qs.as_bytes());
                (Some(hex::encode(hasher.finalize())), Some("SHA512"))
            }
            None => (None, None),
        };

        let claims = UpbitClaims {
            access_key: &self.access_key,
            nonce: Uuid::new_v4().to_string(),
            query_hash,
            query_hash_alg,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )
        .context("failed to sign exchange auth token")
    }

    fn candle_path(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::Day => "v1/candles/days",
            Timeframe::Hour => "v1/candles/minutes/60",
            Timeframe::Minute30 => "v1/candles/minutes/30",
            Timeframe::Minute10 => "v1/candles/minutes/10",
        }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct AccountDto {
    currency: String,
    balance: String,
    #[serde(default)]
    avg_buy_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookDto {
    timestamp: i64,
    orderbook_units: Vec<OrderbookUnitDto>,
}

#[derive(Debug, Deserialize)]
struct OrderbookUnitDto {
    ask_price: Decimal,
    bid_price: Decimal,
    ask_size: Decimal,
    bid_size: Decimal,
}

#[derive(Debug, Deserialize)]
struct CandleDto {
    candle_date_time_utc: String,
    opening_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    trade_price: Decimal,
    candle_acc_trade_volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct TickerDto {
    trade_price: Decimal,
}

fn parse_decimal(field: &str, s: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("invalid {} in exchange payload: {:?}", field, s))
}

fn parse_candle_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .with_context(|| format!("invalid candle timestamp: {}", s))?;
    Ok(Utc.from_utc_datetime(&naive))
}

#[async_trait]
impl Exchange for UpbitClient {
    async fn get_balances(&self, pair: &Pair) -> anyhow::Result<Balances> {
        let url = format!("{}/v1/accounts", self.base_url);
        let token = self.auth_token(None)?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("balance request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("balance fetch failed: {} - {}", status, text));
        }

        let accounts: Vec<AccountDto> = response.json().await.context("invalid balance payload")?;

        let mut balances = Balances {
            base: Decimal::ZERO,
            base_avg_buy_price: Decimal::ZERO,
            quote: Decimal::ZERO,
        };
        for account in accounts {
            if account.currency == pair.base {
                balances.base = parse_decimal("balance", &account.balance)?;
                // avg_buy_price is absent on accounts with no buy history
                if !account.avg_buy_price.is_empty() {
                    balances.base_avg_buy_price =
                        parse_decimal("avg_buy_price", &account.avg_buy_price)?;
                }
            } else if account.currency == pair.quote {
                balances.quote = parse_decimal("balance", &account.balance)?;
            }
        }
        Ok(balances)
    }

    async fn get_orderbook(&self, pair: &Pair) -> anyhow::Result<Orderbook> {
        let url = format!("{}/v1/orderbook?markets={}", self.base_url, pair.code());

        let response = self.client.get(&url).send().await.context("orderbook request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("orderbook fetch failed: {}", response.status()));
        }

        let mut books: Vec<OrderbookDto> = response.json().await.context("invalid orderbook payload")?;
        let book = books
            .pop()
            .ok_or_else(|| anyhow::anyhow!("empty orderbook for {}", pair.code()))?;

        Ok(Orderbook {
            timestamp: Utc
                .timestamp_millis_opt(book.timestamp)
                .single()
                .unwrap_or_else(Utc::now),
            units: book
                .orderbook_units
                .into_iter()
                .map(|u| OrderbookLevel {
                    ask_price: u.ask_price,
                    bid_price: u.bid_price,
                    ask_size: u.ask_size,
                    bid_size: u.bid_size,
                })
                .collect(),
        })
    }

    async fn get_ohlcv(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
        count: u32,
    ) -> anyhow::Result<Vec<Candle>> {
        let url = format!(
            "{}/{}?market={}&count={}",
            self.base_url,
            Self::candle_path(timeframe),
            pair.code(),
            count
        );

        let response = self.client.get(&url).send().await.context("candle request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "candle fetch failed for {}: {}",
                timeframe.as_str(),
                response.status()
            ));
        }

        let dtos: Vec<CandleDto> = response.json().await.context("invalid candle payload")?;

        // Upbit returns newest-first; indicator math wants oldest-first
        let mut candles = Vec::with_capacity(dtos.len());
        for dto in dtos.into_iter().rev() {
            candles.push(Candle {
                timestamp: parse_candle_time(&dto.candle_date_time_utc)?,
                open: dto.opening_price,
                high: dto.high_price,
                low: dto.low_price,
                close: dto.trade_price,
                volume: dto.candle_acc_trade_volume,
            });
        }
        Ok(candles)
    }

    async fn get_current_price(&self, pair: &Pair) -> anyhow::Result<Decimal> {
        let url = format!("{}/v1/ticker?markets={}", self.base_url, pair.code());

        let response = self.client.get(&url).send().await.context("ticker request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("ticker fetch failed: {}", response.status()));
        }

        let mut tickers: Vec<TickerDto> = response.json().await.context("invalid ticker payload")?;
        tickers
            .pop()
            .map(|t| t.trade_price)
            .ok_or_else(|| anyhow::anyhow!("empty ticker for {}", pair.code()))
    }

    async fn place_market_order(
        &self,
        pair: &Pair,
        order: MarketOrder,
    ) -> anyhow::Result<OrderReceipt> {
        // Market buys spend quote currency (ord_type=price); market sells
        // specify base volume (ord_type=market).
        let params: Vec<(&str, String)> = match &order {
            MarketOrder::Buy { spend } => vec![
                ("market", pair.code()),
                ("side", "bid".to_string()),
                ("price", spend.normalize().to_string()),
                ("ord_type", "price".to_string()),
            ],
            MarketOrder::Sell { volume } => vec![
                ("market", pair.code()),
                ("side", "ask".to_string()),
                ("volume", volume.normalize().to_string()),
                ("ord_type", "market".to_string()),
            ],
        };

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let token = self.auth_token(Some(&query))?;

        let body: serde_json::Map<String, serde_json::Value> = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();

        debug!("placing market order: {:?}", order);

        let url = format!("{}/v1/orders", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("order request failed")?;

        if response.status().is_success() {
            let receipt: OrderReceipt = response.json().await.context("invalid order receipt")?;
            Ok(receipt)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("order rejected: {} - {}", status, text))
        }
    }
}
