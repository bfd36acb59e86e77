//! Decision oracle adapter: build the request, validate the reply
//!
//! The oracle's raw reply is untrusted text. This module converts it into
//! a structurally valid `Decision` through a strict parse-then-validate
//! pipeline; a malformed reply always degrades to HOLD, never to an error.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::chart::ChartSource;
use crate::error::CycleError;
use crate::oracle::{Oracle, OracleRequest};
use crate::reflect::Reflection;
use crate::types::{Decision, MarketSnapshot, Pair, TradeAction};

const INSTRUCTIONS: &str = "You are an expert in cryptocurrency investing. \
Analyze the provided market data, technical indicators, sentiment signals \
and the reflection on your recent performance, then decide whether to buy, \
sell, or hold at this moment and what percentage of the available balance \
to commit. Consider the Bollinger Bands (bb_upper, bb_middle, bb_lower), \
RSI (rsi_14), MACD (macd, macd_signal, macd_diff) and moving averages \
(sma_20, ema_12) in your analysis.\n\n\
Respond with exactly one JSON object and nothing else:\n\
{\"decision\": \"buy\", \"percentage\": 50, \"reason\": \"some technical reason\"}\n\
{\"decision\": \"sell\", \"percentage\": 20, \"reason\": \"some technical reason\"}\n\
{\"decision\": \"hold\", \"percentage\": 0, \"reason\": \"some technical reason\"}";

/// Adapter around the generative oracle. Owns the one oracle call a cycle
/// makes for its decision, plus the optional chart artifact.
pub struct DecisionOracle {
    oracle: Arc<dyn Oracle>,
    chart: Arc<dyn ChartSource>,
}

impl DecisionOracle {
    pub fn new(oracle: Arc<dyn Oracle>, chart: Arc<dyn ChartSource>) -> Self {
        Self { oracle, chart }
    }

    /// Ask the oracle for a decision. A transport failure is fatal to the
    /// cycle; a malformed reply is absorbed into the HOLD fallback.
    pub async fn decide(
        &self,
        pair: &Pair,
        snapshot: &MarketSnapshot,
        reflection: &Reflection,
    ) -> Result<Decision, CycleError> {
        let image_png = self.chart.capture(pair).await;
        if image_png.is_some() {
            debug!("attaching chart artifact to oracle request");
        }

        let context = serde_json::json!({
            "market": snapshot,
            "reflection": {
                "performance_pct": reflection.performance,
                "critique": reflection.critique,
            },
        })
        .to_string();

        let request = OracleRequest {
            instructions: INSTRUCTIONS.to_string(),
            context,
            image_png,
        };

        let raw = self
            .oracle
            .generate(&request)
            .await
            .map_err(CycleError::Oracle)?;

        Ok(parse_decision(&raw))
    }
}

/// Shape the oracle is asked to reply with. Kept permissive on types so
/// the clamping rules below see the values.
#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: String,
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

/// Validate a raw oracle reply into a Decision. Never fails:
/// 1. strip formatting fences, parse as JSON; parse failure => HOLD
/// 2. unknown action => HOLD
/// 3. percentage coerced to an integer and clamped to [0,100]; forced to 0
///    for HOLD; a BUY/SELL at 0 is not actionable and becomes HOLD
pub fn parse_decision(raw: &str) -> Decision {
    let body = strip_fences(raw);

    let parsed: RawDecision = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("oracle reply did not parse as JSON: {}", e);
            return Decision::hold("parse failure");
        }
    };

    let action = match parsed.decision.to_ascii_lowercase().as_str() {
        "buy" => TradeAction::Buy,
        "sell" => TradeAction::Sell,
        "hold" => TradeAction::Hold,
        other => {
            warn!("oracle reply carried unknown action: {:?}", other);
            return Decision::hold("parse failure");
        }
    };

    let reason = parsed.reason.unwrap_or_default();
    let percentage = parsed
        .percentage
        .map(|p| p.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    match action {
        TradeAction::Hold => Decision {
            action: TradeAction::Hold,
            percentage: 0,
            reason,
        },
        _ if percentage == 0 => {
            debug!("zero-conviction {} treated as hold", action.as_str());
            Decision {
                action: TradeAction::Hold,
                percentage: 0,
                reason,
            }
        }
        _ => Decision {
            action,
            percentage,
            reason,
        },
    }
}

/// Strip the markdown code fences oracles like to wrap JSON in
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}
