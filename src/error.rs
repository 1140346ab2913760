use super::decision::{Action, DecisionStatus};
use std::fmt;

/// Why an actor was refused. The wire code is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    InactiveActor,
    NoRule,
    BelowMin,
    ExceedsLimit,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InactiveActor => "INACTIVE_ACTOR",
            ReasonCode::NoRule => "NO_RULE",
            ReasonCode::BelowMin => "BELOW_MIN",
            ReasonCode::ExceedsLimit => "EXCEEDS_LIMIT",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("forbidden ({reason}): {message}")]
    Forbidden {
        reason: ReasonCode,
        message: String,
        // set when the denying rule makes escalation mandatory
        escalation_required: bool,
    },
    #[error("cannot {action} a decision in state {state}")]
    StateConflict {
        state: DecisionStatus,
        action: Action,
    },
    #[error("system error: {0}")]
    System(String),
}

impl WorkflowError {
    /// Error class as exposed on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "VALIDATION",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::Forbidden { .. } => "FORBIDDEN",
            WorkflowError::StateConflict { .. } => "STATE_CONFLICT",
            WorkflowError::System(_) => "SYSTEM_ERROR",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn inactive_actor(actor_id: &str) -> Self {
        WorkflowError::Forbidden {
            reason: ReasonCode::InactiveActor,
            message: format!("actor {actor_id} is not active"),
            escalation_required: false,
        }
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            WorkflowError::Forbidden { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<sled::Error> for WorkflowError {
    fn from(value: sled::Error) -> Self {
        WorkflowError::System(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<WorkflowError>> for WorkflowError {
    fn from(value: sled::transaction::TransactionError<WorkflowError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(value: minicbor::decode::Error) -> Self {
        WorkflowError::System(format!("corrupt record: {value}"))
    }
}

impl From<anyhow::Error> for WorkflowError {
    fn from(value: anyhow::Error) -> Self {
        WorkflowError::System(format!("{value:#}"))
    }
}
