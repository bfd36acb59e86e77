//! Cycle failure taxonomy
//!
//! Order rejection is deliberately absent: a rejected or skipped order is a
//! normal execution outcome and the cycle still records a ledger row.

use thiserror::Error;

/// Fatal-to-cycle failures. The controller logs these, skips the cycle
/// (nothing is appended to the ledger) and retries after a short recovery
/// sleep.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Required market data could not be fetched
    #[error("market data unavailable: {0:#}")]
    DataUnavailable(anyhow::Error),

    /// The decision oracle transport failed outright (distinct from a
    /// malformed reply, which the adapter absorbs as HOLD)
    #[error("oracle request failed: {0:#}")]
    Oracle(anyhow::Error),

    /// Ledger append did not durably succeed. The order itself may have
    /// executed; this must be logged loudly since silent ledger gaps
    /// corrupt the reflection feedback loop.
    #[error("ledger append failed: {0:#}")]
    Persistence(anyhow::Error),
}
