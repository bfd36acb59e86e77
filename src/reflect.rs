//! Reflection generator: trailing performance plus an oracle critique
//!
//! A pure read-then-summarize stage. It never writes to the ledger; only
//! the cycle controller does, after execution.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::oracle::{Oracle, OracleRequest};
use crate::types::{MarketSnapshot, TradeRecord};

const CRITIQUE_INSTRUCTIONS: &str = "You are reviewing the recent trading \
record of an automated spot-trading agent. Given its trailing trade ledger, \
the portfolio performance over that window, and the current market state, \
write a short, blunt critique of the recent decisions: what worked, what \
did not, and what the agent should pay attention to next. Respond with \
plain text only.";

/// Output of the reflection stage, injected into the decision request
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    /// Portfolio value change over the window, in percent
    pub performance: f64,
    pub critique: String,
}

/// Percentage change in portfolio value between the oldest and newest
/// record of a newest-first ledger window. Empty or degenerate windows
/// yield 0, never an error.
pub fn performance_pct(window: &[TradeRecord]) -> f64 {
    let (newest, oldest) = match (window.first(), window.last()) {
        (Some(n), Some(o)) => (n, o),
        _ => return 0.0,
    };

    let start = oldest.portfolio_value();
    let end = newest.portfolio_value();
    if start <= Decimal::ZERO {
        return 0.0;
    }

    ((end - start) / start * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0)
}

pub struct ReflectionGenerator {
    oracle: Arc<dyn Oracle>,
    last_performance: f64,
}

impl ReflectionGenerator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            last_performance: 0.0,
        }
    }

    /// Generate the reflection for this cycle. The oracle call is
    /// non-fatal: on failure the critique is empty and performance falls
    /// back to the last successfully reported value.
    pub async fn reflect(
        &mut self,
        window: &[TradeRecord],
        snapshot: &MarketSnapshot,
    ) -> Reflection {
        let performance = performance_pct(window);

        let ledger_digest: Vec<serde_json::Value> = window
            .iter()
            .map(|r| {
                serde_json::json!({
                    "timestamp": r.timestamp,
                    "action": r.action,
                    "percentage": r.percentage,
                    "reason": r.reason,
                    "portfolio_value": r.portfolio_value(),
                })
            })
            .collect();

        let context = serde_json::json!({
            "performance_pct": performance,
            "trades": ledger_digest,
            "current_price": snapshot.current_price,
            "balances": snapshot.balances,
        })
        .to_string();

        let request = OracleRequest {
            instructions: CRITIQUE_INSTRUCTIONS.to_string(),
            context,
            image_png: None,
        };

        match self.oracle.generate(&request).await {
            Ok(text) => {
                self.last_performance = performance;
                Reflection {
                    performance,
                    critique: text.trim().to_string(),
                }
            }
            Err(e) => {
                warn!("reflection oracle call failed, proceeding without critique: {:#}", e);
                Reflection {
                    performance: self.last_performance,
                    critique: String::new(),
                }
            }
        }
    }
}
