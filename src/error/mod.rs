use thiserror::Error;

/// Engine-wide error type.
///
/// Expected outcomes (scoring rejections, admission refusals) are NOT
/// errors and never appear here; they are plain enum results on their own
/// code paths. `ArbError` covers the things that can genuinely go wrong:
/// bad construction/configuration, adapter failures, timeouts, predictor
/// failures, and queue pressure.
#[derive(Debug, Clone, Error)]
pub enum ArbError {
    /// Configuration errors; fatal at orchestrator start-up.
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// No execution adapter registered for a path the engine may dispatch to.
    #[error("No adapter registered for execution path: {0}")]
    MissingAdapter(String),

    /// Error raised by an execution adapter during dispatch.
    #[error("Execution Error: {0}")]
    ExecutionError(String),

    /// Dispatch exceeded its configured deadline.
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Learned-predictor inference or retraining failure; never propagates
    /// past the predictor boundary.
    #[error("Predictor Error: {0}")]
    PredictorError(String),

    /// Inbound queue is full; the opportunity was dropped.
    #[error("Queue Full: {0}")]
    QueueFull(String),

    /// Metrics/event-log I/O failure.
    #[error("Metrics Error: {0}")]
    MetricsError(String),

    /// Orchestrator is shutting down; no new work accepted.
    #[error("Shutting Down: {0}")]
    ShuttingDown(String),

    /// Unknown/unclassified errors.
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for ArbError {
    fn from(err: serde_json::Error) -> Self {
        ArbError::MetricsError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for ArbError {
    fn from(err: anyhow::Error) -> Self {
        ArbError::Unknown(format!("{:#}", err))
    }
}

impl ArbError {
    /// Whether the failed operation may succeed on a later attempt.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ArbError::ConfigError(_) => false,
            ArbError::MissingAdapter(_) => false,
            ArbError::ExecutionError(_) => true,
            ArbError::TimeoutError(_) => true,
            ArbError::PredictorError(_) => true,
            ArbError::QueueFull(_) => true,
            ArbError::MetricsError(_) => true,
            ArbError::ShuttingDown(_) => false,
            ArbError::Unknown(_) => true,
        }
    }

    /// Coarse classification for metrics and monitoring.
    pub fn categorize(&self) -> ErrorCategory {
        match self {
            ArbError::ConfigError(_) | ArbError::MissingAdapter(_) => ErrorCategory::Configuration,
            ArbError::ExecutionError(_) | ArbError::TimeoutError(_) => ErrorCategory::Trading,
            ArbError::PredictorError(_) => ErrorCategory::Model,
            ArbError::QueueFull(_) | ArbError::MetricsError(_) => ErrorCategory::Infrastructure,
            ArbError::ShuttingDown(_) => ErrorCategory::Lifecycle,
            ArbError::Unknown(_) => ErrorCategory::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    Configuration,
    Trading,
    Model,
    Infrastructure,
    Lifecycle,
    Critical,
}

pub type Result<T> = std::result::Result<T, ArbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        assert!(!ArbError::ConfigError("bad weights".into()).is_recoverable());
        assert!(!ArbError::MissingAdapter("flash_loan".into()).is_recoverable());
    }

    #[test]
    fn dispatch_failures_are_recoverable() {
        assert!(ArbError::ExecutionError("venue rejected".into()).is_recoverable());
        assert!(ArbError::TimeoutError("deadline elapsed".into()).is_recoverable());
    }

    #[test]
    fn categories_line_up() {
        assert_eq!(
            ArbError::PredictorError("retrain failed".into()).categorize(),
            ErrorCategory::Model
        );
        assert_eq!(
            ArbError::QueueFull("512 pending".into()).categorize(),
            ErrorCategory::Infrastructure
        );
    }
}
