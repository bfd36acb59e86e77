//! Cycle controller: assemble -> reflect -> decide -> execute -> record
//!
//! Single-threaded and single-cycle-at-a-time: the loop sleeps between
//! cycles, so no two cycles ever overlap. A failed cycle is skipped whole
//! (nothing appended) and retried from scratch after a short recovery
//! sleep; the loop itself never terminates on a cycle failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::chart::ChartSource;
use crate::config::{Cadence, Config};
use crate::decision::DecisionOracle;
use crate::error::CycleError;
use crate::exchange::Exchange;
use crate::executor::ExecutionEngine;
use crate::ledger::Ledger;
use crate::oracle::Oracle;
use crate::reflect::ReflectionGenerator;
use crate::sentiment::{FearGreedClient, NewsClient, SentimentCache};
use crate::snapshot::SnapshotAssembler;
use crate::types::{Pair, TradeRecord};

pub struct CycleRunner {
    pair: Pair,
    assembler: SnapshotAssembler,
    reflector: ReflectionGenerator,
    decider: DecisionOracle,
    engine: ExecutionEngine,
    ledger: Arc<dyn Ledger>,
    cadence: Cadence,
    recovery: Duration,
    reflection_window: chrono::Duration,
    sentiment_cache: SentimentCache,
}

impl CycleRunner {
    pub fn new(
        config: &Config,
        exchange: Arc<dyn Exchange>,
        oracle: Arc<dyn Oracle>,
        chart: Arc<dyn ChartSource>,
        ledger: Arc<dyn Ledger>,
        fear_greed: Option<FearGreedClient>,
        news: Option<NewsClient>,
    ) -> Self {
        Self {
            pair: config.pair.clone(),
            assembler: SnapshotAssembler::new(
                exchange.clone(),
                fear_greed,
                news,
                config.timeframes.clone(),
            ),
            reflector: ReflectionGenerator::new(oracle.clone()),
            decider: DecisionOracle::new(oracle, chart),
            engine: ExecutionEngine::new(exchange, config.min_notional, config.fee_buffer),
            ledger,
            cadence: config.cadence,
            recovery: config.recovery,
            reflection_window: chrono::Duration::days(config.reflection_days),
            sentiment_cache: SentimentCache::new(config.news_refresh),
        }
    }

    /// Run the loop forever
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("starting decision-execution loop for {}", self.pair.code());

        loop {
            match self.run_cycle().await {
                Ok(record) => {
                    info!(
                        "cycle complete: {} {}% | executed reason: {}",
                        record.action.as_str(),
                        record.percentage,
                        record.reason
                    );
                    let delay = self.cadence.next_delay(Utc::now());
                    debug!("sleeping {:?} until next cycle", delay);
                    sleep(delay).await;
                }
                Err(CycleError::Persistence(e)) => {
                    // The order may have executed; a gap here poisons the
                    // reflection feedback loop, so shout.
                    error!("LEDGER APPEND FAILED, executed order may be unrecorded: {:#}", e);
                    sleep(self.recovery).await;
                }
                Err(e) => {
                    error!("cycle skipped: {}", e);
                    sleep(self.recovery).await;
                }
            }
        }
    }

    /// One full cycle. Any error leaves the ledger untouched.
    pub async fn run_cycle(&mut self) -> Result<TradeRecord, CycleError> {
        let started = Utc::now();

        let snapshot = self
            .assembler
            .assemble(&self.pair, &mut self.sentiment_cache)
            .await?;

        let window = self
            .ledger
            .query_window(started - self.reflection_window, started)
            .await
            .map_err(CycleError::DataUnavailable)?;

        let reflection = self.reflector.reflect(&window, &snapshot).await;

        let decision = self.decider.decide(&self.pair, &snapshot, &reflection).await?;
        debug!(
            "decision: {} {}% ({})",
            decision.action.as_str(),
            decision.percentage,
            decision.reason
        );

        let outcome = self
            .engine
            .execute(&self.pair, &decision, &snapshot)
            .await
            .map_err(CycleError::DataUnavailable)?;

        let record = TradeRecord {
            timestamp: Utc::now(),
            action: decision.action,
            percentage: outcome.percentage,
            reason: outcome.reason,
            base_balance: outcome.balances.base,
            quote_balance: outcome.balances.quote,
            base_avg_buy_price: outcome.balances.base_avg_buy_price,
            base_price: snapshot.current_price,
            reflection: reflection.critique,
        };

        self.ledger
            .append(&record)
            .await
            .map_err(CycleError::Persistence)?;

        Ok(record)
    }
}
