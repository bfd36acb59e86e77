//! Snapshot assembler: one immutable view of market + account state
//!
//! Required sources (balances, orderbook, price, every requested OHLCV
//! timeframe) fail the snapshot with `DataUnavailable`. Sentiment sources
//! are optional and degrade to None/empty without failing anything.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::error::CycleError;
use crate::exchange::Exchange;
use crate::indicators;
use crate::sentiment::{FearGreedClient, NewsClient, SentimentCache};
use crate::types::{MarketSnapshot, OhlcvSeries, Pair, Sentiment, TimeframeRequest};

const HEADLINE_LIMIT: u32 = 20;

pub struct SnapshotAssembler {
    exchange: Arc<dyn Exchange>,
    fear_greed: Option<FearGreedClient>,
    news: Option<NewsClient>,
    timeframes: Vec<TimeframeRequest>,
}

impl SnapshotAssembler {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        fear_greed: Option<FearGreedClient>,
        news: Option<NewsClient>,
        timeframes: Vec<TimeframeRequest>,
    ) -> Self {
        Self {
            exchange,
            fear_greed,
            news,
            timeframes,
        }
    }

    pub async fn assemble(
        &self,
        pair: &Pair,
        cache: &mut SentimentCache,
    ) -> Result<MarketSnapshot, CycleError> {
        let now = Utc::now();

        let balances = self
            .exchange
            .get_balances(pair)
            .await
            .map_err(CycleError::DataUnavailable)?;
        let orderbook = self
            .exchange
            .get_orderbook(pair)
            .await
            .map_err(CycleError::DataUnavailable)?;
        let current_price = self
            .exchange
            .get_current_price(pair)
            .await
            .map_err(CycleError::DataUnavailable)?;

        let mut series = Vec::with_capacity(self.timeframes.len());
        for request in &self.timeframes {
            let candles = self
                .exchange
                .get_ohlcv(pair, request.timeframe, request.count)
                .await
                .map_err(CycleError::DataUnavailable)?;

            let annotated = indicators::annotate(&candles);
            if annotated.is_empty() {
                return Err(CycleError::DataUnavailable(anyhow::anyhow!(
                    "timeframe {} returned {} bars, none survive indicator warm-up",
                    request.timeframe.as_str(),
                    candles.len()
                )));
            }
            series.push(OhlcvSeries {
                timeframe: request.timeframe,
                candles: annotated,
            });
        }
        if series.is_empty() {
            return Err(CycleError::DataUnavailable(anyhow::anyhow!(
                "no OHLCV timeframes requested"
            )));
        }

        let sentiment = self.gather_sentiment(cache).await;

        Ok(MarketSnapshot {
            timestamp: now,
            pair: pair.clone(),
            balances,
            orderbook,
            current_price,
            series,
            sentiment,
        })
    }

    /// Best-effort sentiment: the index is fetched every cycle, headlines
    /// only when the cache has gone stale.
    async fn gather_sentiment(&self, cache: &mut SentimentCache) -> Sentiment {
        let now = Utc::now();

        let fear_greed_index = match &self.fear_greed {
            Some(client) => match client.get_index().await {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("fear/greed index unavailable: {:#}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(news) = &self.news {
            if cache.is_stale(now) {
                match news.get_headlines(HEADLINE_LIMIT).await {
                    Ok(headlines) => cache.store(now, headlines),
                    Err(e) => warn!("headline refresh failed, keeping cached set: {:#}", e),
                }
            }
        }

        Sentiment {
            fear_greed_index,
            headlines: cache.headlines().to_vec(),
        }
    }
}
