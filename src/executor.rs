//! Execution engine: one bounded market order per cycle, at most
//!
//! Single-shot: a placement failure is reported, never retried within the
//! cycle. After any order attempt the balances are re-read from the
//! exchange rather than trusted from the order response, since fills may
//! be partial or delayed.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::exchange::{Exchange, MarketOrder};
use crate::types::{Balances, Decision, MarketSnapshot, Pair, TradeAction};

/// Outcome of the execution stage for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub executed: bool,
    /// Percentage actually applied; 0 if no order was placed
    pub percentage: u8,
    /// Decision reason, possibly augmented with the skip/rejection cause
    pub reason: String,
    /// Post-attempt balances (snapshot balances for HOLD)
    pub balances: Balances,
}

pub struct ExecutionEngine {
    exchange: Arc<dyn Exchange>,
    min_notional: Decimal,
    fee_buffer: Decimal,
}

impl ExecutionEngine {
    pub fn new(exchange: Arc<dyn Exchange>, min_notional: Decimal, fee_buffer: Decimal) -> Self {
        Self {
            exchange,
            min_notional,
            fee_buffer,
        }
    }

    pub async fn execute(
        &self,
        pair: &Pair,
        decision: &Decision,
        snapshot: &MarketSnapshot,
    ) -> anyhow::Result<ExecutionOutcome> {
        let pct = Decimal::from(decision.percentage) / Decimal::from(100);

        let order = match decision.action {
            TradeAction::Hold => {
                info!("holding position: {}", decision.reason);
                return Ok(ExecutionOutcome {
                    executed: false,
                    percentage: 0,
                    reason: decision.reason.clone(),
                    balances: snapshot.balances.clone(),
                });
            }
            TradeAction::Buy => {
                let spend = snapshot.balances.quote * pct * (Decimal::ONE - self.fee_buffer);
                // Strictly below the minimum notional skips; equal proceeds
                if spend < self.min_notional {
                    return self
                        .skipped(decision, snapshot, "buy", spend)
                        .await;
                }
                MarketOrder::Buy {
                    spend: spend.round_dp(4),
                }
            }
            TradeAction::Sell => {
                let volume = snapshot.balances.base * pct;
                let notional = volume * snapshot.current_price;
                if notional < self.min_notional {
                    return self
                        .skipped(decision, snapshot, "sell", notional)
                        .await;
                }
                MarketOrder::Sell {
                    volume: volume.round_dp(8),
                }
            }
        };

        let (executed, percentage, reason) = match self.exchange.place_market_order(pair, order).await
        {
            Ok(receipt) => {
                info!(
                    "{} order executed at {}%: {} (uuid {})",
                    decision.action.as_str(),
                    decision.percentage,
                    decision.reason,
                    receipt.uuid
                );
                (true, decision.percentage, decision.reason.clone())
            }
            Err(e) => {
                // Recoverable: record the rejection and finish the cycle
                warn!("order placement failed: {:#}", e);
                (
                    false,
                    0,
                    format!("{} (order rejected: {:#})", decision.reason, e),
                )
            }
        };

        // Without fresh balances the ledger row would be a guess
        let balances = self.exchange.get_balances(pair).await?;
        Ok(ExecutionOutcome {
            executed,
            percentage,
            reason,
            balances,
        })
    }

    /// Below-minimum-notional outcome: expected and recoverable, not an error
    async fn skipped(
        &self,
        decision: &Decision,
        snapshot: &MarketSnapshot,
        side: &str,
        value: Decimal,
    ) -> anyhow::Result<ExecutionOutcome> {
        info!(
            "{} order skipped: value {} below minimum notional {}",
            side, value, self.min_notional
        );
        Ok(ExecutionOutcome {
            executed: false,
            percentage: 0,
            reason: format!("{} (insufficient funds)", decision.reason),
            balances: snapshot.balances.clone(),
        })
    }
}
