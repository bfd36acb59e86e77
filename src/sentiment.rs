//! Optional sentiment capability: fear/greed index and news headlines
//!
//! Both sources may fail independently without failing the snapshot; the
//! assembler degrades them to None / empty. Headlines change slowly and
//! are cached between cycles; the cache is owned by the cycle controller.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::types::Headline;

/// Fear & greed index client (alternative.me style API)
pub struct FearGreedClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
}

impl FearGreedClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.alternative.me".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn get_index(&self) -> anyhow::Result<i32> {
        let url = format!("{}/fng/?limit=1", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("fear/greed request failed")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("fear/greed fetch failed: {}", response.status()));
        }

        let payload: FearGreedResponse = response.json().await.context("invalid fear/greed payload")?;
        let entry = payload
            .data
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty fear/greed payload"))?;
        entry.value.parse().context("non-numeric fear/greed value")
    }
}

impl Default for FearGreedClient {
    fn default() -> Self {
        Self::new()
    }
}

/// News headline search client (Naver open API)
pub struct NewsClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    query: String,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    items: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    title: String,
    #[serde(rename = "pubDate")]
    pub_date: String,
}

impl NewsClient {
    pub fn new(client_id: &str, client_secret: &str, query: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://openapi.naver.com".to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            query: query.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn get_headlines(&self, limit: u32) -> anyhow::Result<Vec<Headline>> {
        let url = format!("{}/v1/search/news.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", self.query.as_str()),
                ("display", &limit.to_string()),
                ("sort", "date"),
            ])
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("news request failed")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("news fetch failed: {}", response.status()));
        }

        let payload: NewsResponse = response.json().await.context("invalid news payload")?;
        Ok(payload
            .items
            .into_iter()
            .map(|item| Headline {
                title: item.title,
                date: item.pub_date,
            })
            .collect())
    }
}

/// Controller-owned cache of slow-changing headlines. Only the single
/// active cycle ever writes to it.
#[derive(Debug)]
pub struct SentimentCache {
    refresh_after: Duration,
    last_refresh: Option<DateTime<Utc>>,
    headlines: Vec<Headline>,
}

impl SentimentCache {
    pub fn new(refresh_after: Duration) -> Self {
        Self {
            refresh_after,
            last_refresh: None,
            headlines: Vec::new(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => now - at >= chrono::Duration::from_std(self.refresh_after).unwrap_or_default(),
        }
    }

    pub fn store(&mut self, now: DateTime<Utc>, headlines: Vec<Headline>) {
        self.last_refresh = Some(now);
        self.headlines = headlines;
    }

    pub fn headlines(&self) -> &[Headline] {
        &self.headlines
    }
}
