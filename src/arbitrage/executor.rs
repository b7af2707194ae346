//! Execution seams: the trait each execution backend implements and the
//! optional market-regime collaborator polled by housekeeping.

use crate::arbitrage::opportunity::{Decision, ExecutionResult, MarketRegime, Opportunity};
use crate::error::Result;
use async_trait::async_trait;

/// One execution backend per [`ExecutionPath`](crate::arbitrage::opportunity::ExecutionPath).
///
/// Called with a bounded timeout by the dispatcher. Implementations must
/// tolerate the caller abandoning the future at that deadline: eventual
/// completion has to be discoverable venue-side, though this engine does
/// not reconcile post-timeout completions. Errors are absorbed at the
/// dispatch boundary and converted into failed results.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn execute(
        &self,
        opportunity: &Opportunity,
        decision: &Decision,
    ) -> Result<ExecutionResult>;

    /// Adapter name for logs and metrics.
    fn name(&self) -> &str;
}

/// Optional collaborator that derives fresh [`MarketRegime`] snapshots.
/// Polled by the housekeeping loop; `None` leaves the last pushed regime
/// in place.
#[async_trait]
pub trait RegimeProvider: Send + Sync {
    async fn current_regime(&self) -> Option<MarketRegime>;
}
