//! Decision lifecycle transition table
//!
//! Every legal move is one row of [`TRANSITIONS`]. A pair of (state, action)
//! without a row is a state conflict, checked before anything is written.
use super::decision::Action as A;
use super::decision::DecisionStatus as S;
use super::decision::{Action, DecisionStatus};
use super::error::WorkflowError;

/// Extra check a transition needs beyond the actor being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    ActorActive,
    // the acting body must hold a rule covering the amount
    AuthorityLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub from: DecisionStatus,
    pub to: DecisionStatus,
    pub guard: Guard,
}

const fn row(action: Action, from: DecisionStatus, to: DecisionStatus, guard: Guard) -> Transition {
    Transition {
        action,
        from,
        to,
        guard,
    }
}

pub const TRANSITIONS: &[Transition] = &[
    row(A::Submit, S::Draft, S::PendingApproval, Guard::ActorActive),
    row(A::Approve, S::PendingApproval, S::Approved, Guard::AuthorityLimit),
    row(A::Sanction, S::PendingApproval, S::Sanctioned, Guard::ActorActive),
    row(A::Reject, S::PendingApproval, S::Rejected, Guard::ActorActive),
    row(A::Reject, S::QueryRaised, S::Rejected, Guard::ActorActive),
    row(A::Query, S::PendingApproval, S::QueryRaised, Guard::ActorActive),
    row(A::Respond, S::QueryRaised, S::PendingApproval, Guard::ActorActive),
    row(A::Escalate, S::Draft, S::Escalated, Guard::ActorActive),
    row(A::Escalate, S::PendingApproval, S::Escalated, Guard::ActorActive),
    row(A::Escalate, S::QueryRaised, S::Escalated, Guard::ActorActive),
];

/// Looks up the row for `action` taken from `from`.
pub fn transition(from: DecisionStatus, action: Action) -> Result<&'static Transition, WorkflowError> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.action == action)
        .ok_or(WorkflowError::StateConflict {
            state: from,
            action,
        })
}

/// Actions accepted from `state`, in table order.
pub fn allowed_actions(state: DecisionStatus) -> Vec<Action> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == state)
        .map(|t| t.action)
        .collect()
}
