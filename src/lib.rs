//! oracle-trader
//!
//! Periodic, autonomous decision-execution loop for spot trading a single
//! asset pair: assemble a market snapshot, reflect on the recent ledger,
//! ask a generative oracle for a bounded buy/sell/hold decision, execute
//! it, and record the outcome.

pub mod chart;
pub mod config;
pub mod decision;
pub mod error;
pub mod exchange;
pub mod executor;
pub mod indicators;
pub mod ledger;
pub mod oracle;
pub mod reflect;
pub mod runner;
pub mod sentiment;
pub mod snapshot;
pub mod types;

// Re-export main types for convenience
pub use config::{Cadence, ChartSettings, Config, NaverCredentials};
pub use decision::{parse_decision, DecisionOracle};
pub use error::CycleError;
pub use exchange::{Exchange, MarketOrder, OrderReceipt, UpbitClient};
pub use executor::{ExecutionEngine, ExecutionOutcome};
pub use ledger::{Ledger, SqliteLedger};
pub use oracle::{GeminiClient, Oracle, OracleRequest};
pub use reflect::{performance_pct, Reflection, ReflectionGenerator};
pub use runner::CycleRunner;
pub use snapshot::SnapshotAssembler;
pub use types::{
    Balances, Candle, Decision, MarketSnapshot, Orderbook, Pair, Timeframe, TimeframeRequest,
    TradeAction, TradeRecord,
};
