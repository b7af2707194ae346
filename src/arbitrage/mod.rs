pub mod executor;
pub mod opportunity;
pub mod orchestrator;
pub mod scorer;

pub use executor::{ExecutionAdapter, RegimeProvider};
pub use opportunity::{
    CostEstimate, Decision, ExecutionPath, ExecutionResult, MarketRegime, Opportunity, RouteKey,
};
pub use orchestrator::{AdmissionRefusal, Orchestrator, OrchestratorStats};
pub use scorer::{BatchEvaluation, CandidateOutcome, RejectionReason, Scorer, ScorerConfig};
