//! Error taxonomy for the decision engine.

use thiserror::Error;
use warden_types::EntityKind;

use crate::condition::UnknownOperator;
use crate::config::ConfigError;
use crate::evaluator::Phase;
use crate::policy::PolicyError;
use crate::store::StoreError;

/// Error type for evaluation.
///
/// `Validation` and `NotFound` describe a malformed request and always reach
/// the caller. `Storage`, `EvaluationTimeout` and `Cancelled` are converted
/// into a deny decision when the engine runs fail-safe.
#[derive(Debug, Error)]
pub enum AbacError {
    /// A required request field is missing or empty.
    #[error("invalid request: {field} {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A subject, resource or action referenced by the request does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityKind, id: String },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A policy condition names an operator the engine does not know.
    #[error(transparent)]
    UnknownOperator(#[from] UnknownOperator),

    /// A policy document is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// The caller's deadline elapsed before a decision was reached.
    #[error("evaluation deadline exceeded during {phase}")]
    EvaluationTimeout { phase: Phase },

    /// The caller cancelled the evaluation before a decision was reached.
    #[error("evaluation cancelled during {phase}")]
    Cancelled { phase: Phase },

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, AbacError>;

impl AbacError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns `true` for failures that fail-safe mode turns into a deny.
    pub fn is_fail_safe_eligible(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::EvaluationTimeout { .. } | Self::Cancelled { .. }
        )
    }

    /// Caller-facing reason used when the failure collapses to a deny.
    ///
    /// Storage details stay in the logs.
    pub(crate) fn fail_safe_reason(&self) -> String {
        match self {
            Self::Storage(_) => "access denied: policy storage unavailable".to_string(),
            other => format!("access denied: {other}"),
        }
    }
}

impl From<StoreError> for AbacError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { entity: kind, id },
            StoreError::Backend(message) => Self::Storage(message),
            StoreError::InvalidPolicy(policy_err) => policy_err.into(),
        }
    }
}

impl From<PolicyError> for AbacError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::UnknownOperator(unknown) => Self::UnknownOperator(unknown),
            other => Self::InvalidPolicy(other.to_string()),
        }
    }
}
