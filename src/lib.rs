//! Delegation-of-authority decision approval.
//!
//! Decisions move through a fixed lifecycle ([`machine`]); approvals are
//! checked against the acting body's authority band ([`validator`]) and every
//! committed transition is written to an append-only, hash-linked ledger
//! ([`audit`]) in the same sled transaction as the state change.

pub mod amount;
pub mod audit;
pub mod authority;
pub mod config;
pub mod decision;
pub mod directory;
pub mod error;
pub mod machine;
pub mod outcome;
pub mod rulebook;
pub mod service;
pub mod utils;
pub mod validator;

pub use amount::Amount;
pub use audit::{AuditEntry, AuditMetadata, TrailOrder};
pub use authority::{AuthorityBodyType, AuthorityRule, Resolution};
pub use config::EngineConfig;
pub use decision::{Action, Classification, Decision, DecisionDraft, DecisionFilter, DecisionStatus};
pub use directory::{Actor, ActorDirectory, InMemoryDirectory};
pub use error::{ReasonCode, WorkflowError};
pub use service::{DecisionService, DecisionView};
