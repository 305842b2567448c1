use crate::gateway::Computation;
use serde::Serialize;
use std::time::Duration;

/// Coarse failure class, used by callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The executable could not be started.
    Launch,
    /// Output did not match the computation's decode mode.
    Parse,
    /// The process exited non-zero.
    Remote,
    /// The configured deadline passed before the process exited.
    Timeout,
    /// An identical request was already running.
    InFlight,
}

/// Failure of a single external computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("failed to launch: {0}")]
    Launch(String),
    #[error("could not parse output: {0}")]
    Parse(String),
    #[error("{0}")]
    Remote(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("an identical computation is already running")]
    InFlight,
}

impl ComputationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ComputationError::Launch(_) => FailureKind::Launch,
            ComputationError::Parse(_) => FailureKind::Parse,
            ComputationError::Remote(_) => FailureKind::Remote,
            ComputationError::Timeout(_) => FailureKind::Timeout,
            ComputationError::InFlight => FailureKind::InFlight,
        }
    }

    /// The bare message, without the kind prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            ComputationError::Launch(m)
            | ComputationError::Parse(m)
            | ComputationError::Remote(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Uniform failure shape returned by every gateway operation.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{computation}: {message}")]
pub struct GatewayError {
    pub computation: Computation,
    pub kind: FailureKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(computation: Computation, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            computation,
            kind,
            message: message.into(),
        }
    }

    pub fn from_computation(computation: Computation, err: ComputationError) -> Self {
        Self::new(computation, err.kind(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_kind_prefix() {
        let err = ComputationError::Parse("oops".into());
        assert_eq!(err.to_string(), "could not parse output: oops");
        assert_eq!(err.message(), "oops");
        assert_eq!(err.kind(), FailureKind::Parse);
    }

    #[test]
    fn gateway_error_keeps_kind_and_message() {
        let err = GatewayError::from_computation(
            Computation::CalculateMetrics,
            ComputationError::Remote("malformed CSV".into()),
        );
        assert_eq!(err.kind, FailureKind::Remote);
        assert_eq!(err.to_string(), "calculate-metrics: malformed CSV");
    }

    #[test]
    fn timeout_names_the_deadline() {
        let err = ComputationError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "timed out after 90s");
        assert_eq!(err.message(), "timed out after 90s");
    }
}
