//! End-to-end cycle tests with mocked collaborators
//!
//! A scripted oracle and an in-process mock exchange drive full cycles
//! against a real SQLite ledger.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;

use oracle_trader::chart::NoChart;
use oracle_trader::config::{parse_timeframes, Cadence, Config};
use oracle_trader::exchange::{Exchange, MarketOrder, OrderReceipt};
use oracle_trader::oracle::{Oracle, OracleRequest};
use oracle_trader::sentiment::{FearGreedClient, NewsClient, SentimentCache};
use oracle_trader::snapshot::SnapshotAssembler;
use oracle_trader::types::{
    Balances, Candle, MarketSnapshot, Orderbook, OrderbookLevel, Pair, Sentiment, Timeframe,
    TradeRecord,
};
use oracle_trader::{
    CycleError, CycleRunner, Decision, ExecutionEngine, Ledger, SqliteLedger, TradeAction,
};

// --- Mock collaborators ---

struct MockExchange {
    balances: Mutex<Balances>,
    price: Decimal,
    fail_market_data: AtomicBool,
    reject_orders: AtomicBool,
    orders: Mutex<Vec<MarketOrder>>,
}

impl MockExchange {
    fn new(quote: Decimal, base: Decimal, price: Decimal) -> Self {
        Self {
            balances: Mutex::new(Balances {
                base,
                base_avg_buy_price: price,
                quote,
            }),
            price,
            fail_market_data: AtomicBool::new(false),
            reject_orders: AtomicBool::new(false),
            orders: Mutex::new(Vec::new()),
        }
    }

    fn placed_orders(&self) -> Vec<MarketOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_balances(&self, _pair: &Pair) -> anyhow::Result<Balances> {
        if self.fail_market_data.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("exchange offline"));
        }
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn get_orderbook(&self, _pair: &Pair) -> anyhow::Result<Orderbook> {
        if self.fail_market_data.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("exchange offline"));
        }
        Ok(Orderbook {
            timestamp: Utc::now(),
            units: vec![OrderbookLevel {
                ask_price: self.price,
                bid_price: self.price - Decimal::ONE,
                ask_size: Decimal::ONE,
                bid_size: Decimal::ONE,
            }],
        })
    }

    async fn get_ohlcv(
        &self,
        _pair: &Pair,
        _timeframe: Timeframe,
        count: u32,
    ) -> anyhow::Result<Vec<Candle>> {
        if self.fail_market_data.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("exchange offline"));
        }
        let start = Utc::now() - ChronoDuration::hours(i64::from(count));
        Ok((0..count)
            .map(|i| {
                let close = self.price + Decimal::from(i);
                Candle {
                    timestamp: start + ChronoDuration::hours(i64::from(i)),
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::from(10),
                }
            })
            .collect())
    }

    async fn get_current_price(&self, _pair: &Pair) -> anyhow::Result<Decimal> {
        if self.fail_market_data.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("exchange offline"));
        }
        Ok(self.price)
    }

    async fn place_market_order(
        &self,
        _pair: &Pair,
        order: MarketOrder,
    ) -> anyhow::Result<OrderReceipt> {
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("insufficient exchange-side liquidity"));
        }
        self.orders.lock().unwrap().push(order);
        Ok(OrderReceipt {
            uuid: "mock-order".to_string(),
            state: "done".to_string(),
        })
    }
}

/// Oracle that answers reflection requests with a canned critique and pops
/// decision replies from a script.
struct ScriptedOracle {
    decisions: Mutex<VecDeque<anyhow::Result<String>>>,
    fail_reflection: AtomicBool,
}

impl ScriptedOracle {
    fn new(replies: Vec<anyhow::Result<String>>) -> Self {
        Self {
            decisions: Mutex::new(replies.into_iter().collect()),
            fail_reflection: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String> {
        if request.instructions.contains("reviewing") {
            if self.fail_reflection.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("critique model unavailable"));
            }
            return Ok("stay patient, stop chasing momentum".to_string());
        }
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"decision":"hold","percentage":0,"reason":"script exhausted"}"#.to_string()))
    }
}

/// Ledger whose appends always fail; reads succeed and see nothing
struct FailingLedger;

#[async_trait]
impl Ledger for FailingLedger {
    async fn append(&self, _record: &TradeRecord) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("disk full"))
    }

    async fn query_window(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TradeRecord>> {
        Ok(Vec::new())
    }
}

// --- Harness helpers ---

fn test_config() -> Config {
    Config {
        pair: Pair::parse("KRW-BTC").unwrap(),
        cadence: Cadence::Interval(Duration::from_secs(600)),
        recovery: Duration::from_secs(1),
        min_notional: Decimal::from(5000),
        fee_buffer: Decimal::from_str("0.0005").unwrap(),
        timeframes: parse_timeframes("day:40").unwrap(),
        reflection_days: 7,
        news_refresh: Duration::from_secs(3600),
        db_path: String::new(),
        upbit_access_key: String::new(),
        upbit_secret_key: String::new(),
        gemini_api_key: String::new(),
        gemini_model: String::new(),
        naver: None,
        chart: None,
    }
}

async fn temp_ledger() -> (tempfile::TempDir, Arc<SqliteLedger>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades.db");
    let ledger = SqliteLedger::open(path.to_str().unwrap()).await.unwrap();
    (dir, Arc::new(ledger))
}

fn runner(
    exchange: Arc<MockExchange>,
    oracle: Arc<ScriptedOracle>,
    ledger: Arc<dyn Ledger>,
) -> CycleRunner {
    CycleRunner::new(
        &test_config(),
        exchange,
        oracle,
        Arc::new(NoChart),
        ledger,
        None,
        None,
    )
}

fn snapshot_for(exchange: &MockExchange, pair: &Pair) -> MarketSnapshot {
    MarketSnapshot {
        timestamp: Utc::now(),
        pair: pair.clone(),
        balances: exchange.balances.lock().unwrap().clone(),
        orderbook: Orderbook {
            timestamp: Utc::now(),
            units: Vec::new(),
        },
        current_price: exchange.price,
        series: Vec::new(),
        sentiment: Sentiment::default(),
    }
}

fn ledger_window() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let now = Utc::now();
    (now - ChronoDuration::days(1), now + ChronoDuration::days(1))
}

// --- Execution engine scenarios ---

#[tokio::test]
async fn buy_spend_applies_fee_buffer() {
    let pair = Pair::parse("KRW-BTC").unwrap();
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let engine = ExecutionEngine::new(
        exchange.clone(),
        Decimal::from(5000),
        Decimal::from_str("0.0005").unwrap(),
    );

    let decision = Decision {
        action: TradeAction::Buy,
        percentage: 50,
        reason: "momentum".to_string(),
    };
    let snapshot = snapshot_for(&exchange, &pair);
    let outcome = engine.execute(&pair, &decision, &snapshot).await.unwrap();

    assert!(outcome.executed);
    assert_eq!(outcome.percentage, 50);
    // 100000 x 0.5 x 0.9995 = 49975
    assert_eq!(
        exchange.placed_orders(),
        vec![MarketOrder::Buy {
            spend: Decimal::from(49_975)
        }]
    );
}

#[tokio::test]
async fn sell_at_exact_minimum_notional_proceeds() {
    let pair = Pair::parse("KRW-BTC").unwrap();
    // 0.001 BTC x 10% = 0.0001; 0.0001 x 50,000,000 = 5000, exactly at the
    // threshold: equal proceeds, only strictly-below skips
    let exchange = Arc::new(MockExchange::new(
        Decimal::ZERO,
        Decimal::from_str("0.001").unwrap(),
        Decimal::from(50_000_000),
    ));
    let engine = ExecutionEngine::new(exchange.clone(), Decimal::from(5000), Decimal::ZERO);

    let decision = Decision {
        action: TradeAction::Sell,
        percentage: 10,
        reason: "weak signal".to_string(),
    };
    let snapshot = snapshot_for(&exchange, &pair);
    let outcome = engine.execute(&pair, &decision, &snapshot).await.unwrap();

    assert!(outcome.executed);
    assert_eq!(
        exchange.placed_orders(),
        vec![MarketOrder::Sell {
            volume: Decimal::from_str("0.0001").unwrap()
        }]
    );
}

#[tokio::test]
async fn sell_below_minimum_notional_is_skipped() {
    let pair = Pair::parse("KRW-BTC").unwrap();
    // 0.0009 BTC x 10% x 50M = 4500 < 5000
    let exchange = Arc::new(MockExchange::new(
        Decimal::ZERO,
        Decimal::from_str("0.0009").unwrap(),
        Decimal::from(50_000_000),
    ));
    let engine = ExecutionEngine::new(exchange.clone(), Decimal::from(5000), Decimal::ZERO);

    let decision = Decision {
        action: TradeAction::Sell,
        percentage: 10,
        reason: "weak signal".to_string(),
    };
    let snapshot = snapshot_for(&exchange, &pair);
    let outcome = engine.execute(&pair, &decision, &snapshot).await.unwrap();

    assert!(!outcome.executed);
    assert_eq!(outcome.percentage, 0);
    assert!(outcome.reason.contains("insufficient funds"));
    assert!(exchange.placed_orders().is_empty());
}

#[tokio::test]
async fn hold_places_no_order() {
    let pair = Pair::parse("KRW-BTC").unwrap();
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ONE,
        Decimal::from(50_000_000),
    ));
    let engine = ExecutionEngine::new(exchange.clone(), Decimal::from(5000), Decimal::ZERO);

    let snapshot = snapshot_for(&exchange, &pair);
    let outcome = engine
        .execute(&pair, &Decision::hold("sideways"), &snapshot)
        .await
        .unwrap();

    assert!(!outcome.executed);
    assert_eq!(outcome.percentage, 0);
    assert!(exchange.placed_orders().is_empty());
}

#[tokio::test]
async fn rejected_order_is_recorded_not_raised() {
    let pair = Pair::parse("KRW-BTC").unwrap();
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    exchange.reject_orders.store(true, Ordering::SeqCst);
    let engine = ExecutionEngine::new(exchange.clone(), Decimal::from(5000), Decimal::ZERO);

    let decision = Decision {
        action: TradeAction::Buy,
        percentage: 50,
        reason: "momentum".to_string(),
    };
    let snapshot = snapshot_for(&exchange, &pair);
    let outcome = engine.execute(&pair, &decision, &snapshot).await.unwrap();

    assert!(!outcome.executed);
    assert_eq!(outcome.percentage, 0);
    assert!(outcome.reason.contains("order rejected"));
}

// --- Full cycle scenarios ---

#[tokio::test]
async fn full_cycle_buy_appends_one_record() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
        r#"{"decision":"buy","percentage":50,"reason":"momentum"}"#.to_string(),
    )]));
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange.clone(), oracle, ledger.clone());
    let record = runner.run_cycle().await.unwrap();

    assert_eq!(record.action, TradeAction::Buy);
    assert_eq!(record.percentage, 50);
    assert_eq!(record.reflection, "stay patient, stop chasing momentum");
    assert_eq!(exchange.placed_orders().len(), 1);

    let (from, to) = ledger_window();
    assert_eq!(ledger.query_window(from, to).await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_oracle_reply_holds_and_still_records() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
        "you should definitely buy, trust me".to_string(),
    )]));
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange.clone(), oracle, ledger.clone());
    let record = runner.run_cycle().await.unwrap();

    assert_eq!(record.action, TradeAction::Hold);
    assert_eq!(record.percentage, 0);
    assert!(exchange.placed_orders().is_empty());

    let (from, to) = ledger_window();
    assert_eq!(ledger.query_window(from, to).await.unwrap().len(), 1);
}

#[tokio::test]
async fn oracle_transport_failure_skips_the_cycle() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Err(anyhow::anyhow!(
        "oracle timed out"
    ))]));
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange, oracle, ledger.clone());
    let err = runner.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Oracle(_)));

    let (from, to) = ledger_window();
    assert!(ledger.query_window(from, to).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_snapshot_appends_nothing_next_cycle_recovers() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
        r#"{"decision":"hold","percentage":0,"reason":"calm"}"#.to_string(),
    )]));
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange.clone(), oracle, ledger.clone());

    exchange.fail_market_data.store(true, Ordering::SeqCst);
    let err = runner.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::DataUnavailable(_)));

    let (from, to) = ledger_window();
    assert!(ledger.query_window(from, to).await.unwrap().is_empty());

    exchange.fail_market_data.store(false, Ordering::SeqCst);
    runner.run_cycle().await.unwrap();
    assert_eq!(ledger.query_window(from, to).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reflection_failure_does_not_block_the_cycle() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
        r#"{"decision":"buy","percentage":50,"reason":"momentum"}"#.to_string(),
    )]));
    oracle.fail_reflection.store(true, Ordering::SeqCst);
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange.clone(), oracle, ledger.clone());
    let record = runner.run_cycle().await.unwrap();

    // Cycle completes with an empty critique and still trades
    assert_eq!(record.reflection, "");
    assert_eq!(record.action, TradeAction::Buy);
    assert_eq!(exchange.placed_orders().len(), 1);

    let (from, to) = ledger_window();
    assert_eq!(ledger.query_window(from, to).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failing_sentiment_sources_degrade_without_failing_the_snapshot() {
    // Unmatched requests get 404 from the mock server, so both sources fail
    let server = wiremock::MockServer::start().await;
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));

    let assembler = SnapshotAssembler::new(
        exchange,
        Some(FearGreedClient::new().with_base_url(&server.uri())),
        Some(NewsClient::new("id", "secret", "BTC").with_base_url(&server.uri())),
        parse_timeframes("day:40").unwrap(),
    );

    let pair = Pair::parse("KRW-BTC").unwrap();
    let mut cache = SentimentCache::new(Duration::from_secs(3600));
    let snapshot = assembler.assemble(&pair, &mut cache).await.unwrap();

    assert_eq!(snapshot.sentiment.fear_greed_index, None);
    assert!(snapshot.sentiment.headlines.is_empty());
}

#[tokio::test]
async fn failed_append_classifies_as_persistence_after_execution() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
        r#"{"decision":"buy","percentage":50,"reason":"momentum"}"#.to_string(),
    )]));

    let mut runner = runner(exchange.clone(), oracle, Arc::new(FailingLedger));
    let err = runner.run_cycle().await.unwrap_err();

    // The order went out before the append failed
    assert!(matches!(err, CycleError::Persistence(_)));
    assert_eq!(exchange.placed_orders().len(), 1);
}

#[tokio::test]
async fn ledger_grows_by_one_record_per_cycle_newest_first() {
    let exchange = Arc::new(MockExchange::new(
        Decimal::from(100_000),
        Decimal::ZERO,
        Decimal::from(50_000_000),
    ));
    let oracle = Arc::new(ScriptedOracle::new(Vec::new())); // always holds
    let (_dir, ledger) = temp_ledger().await;

    let mut runner = runner(exchange, oracle, ledger.clone());
    for _ in 0..3 {
        runner.run_cycle().await.unwrap();
        // Distinct millisecond timestamps per record
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (from, to) = ledger_window();
    let records = ledger.query_window(from, to).await.unwrap();
    assert_eq!(records.len(), 3);
    for pair in records.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
}
