//! oracle-trader entry point
//!
//! Wires the live collaborators together and hands off to the cycle
//! controller:
//! 1. Assembles a market snapshot (balances, orderbook, OHLCV+indicators,
//!    sentiment)
//! 2. Reflects on the trailing trade ledger
//! 3. Asks the generative oracle for a buy/sell/hold decision
//! 4. Executes at most one bounded market order
//! 5. Appends the outcome to the append-only ledger

use std::sync::Arc;

use tracing::info;

use oracle_trader::chart::{ChartSource, HeadlessChart, NoChart};
use oracle_trader::exchange::Exchange;
use oracle_trader::oracle::Oracle;
use oracle_trader::sentiment::{FearGreedClient, NewsClient};
use oracle_trader::{Config, CycleRunner, GeminiClient, SqliteLedger, UpbitClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("starting oracle-trader...");

    let config = Config::from_env()?;
    info!(
        "pair: {}, cadence: {:?}, min notional: {}",
        config.pair.code(),
        config.cadence,
        config.min_notional
    );

    let exchange: Arc<dyn Exchange> = Arc::new(UpbitClient::new(
        &config.upbit_access_key,
        &config.upbit_secret_key,
    )?);

    let oracle: Arc<dyn Oracle> = Arc::new(GeminiClient::new(
        &config.gemini_api_key,
        &config.gemini_model,
    )?);

    let chart: Arc<dyn ChartSource> = match &config.chart {
        Some(settings) => Arc::new(HeadlessChart::new(&settings.bin, &settings.url)),
        None => Arc::new(NoChart),
    };

    let ledger = Arc::new(SqliteLedger::open(&config.db_path).await?);

    let fear_greed = Some(FearGreedClient::new());
    let news = config
        .naver
        .as_ref()
        .map(|n| NewsClient::new(&n.client_id, &n.client_secret, &config.pair.base));

    let runner = CycleRunner::new(&config, exchange, oracle, chart, ledger, fear_greed, news);
    runner.run().await
}
