//! Core decision record, lifecycle vocabulary and draft builder
use super::amount::Amount;
use super::error::WorkflowError;
use super::outcome::Outcome;
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a decision.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum DecisionStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingApproval,
    #[n(2)]
    QueryRaised,
    #[n(3)]
    Approved,
    #[n(4)]
    Sanctioned,
    #[n(5)]
    Rejected,
    #[n(6)]
    Escalated,
}

impl DecisionStatus {
    pub const ALL: [DecisionStatus; 7] = [
        DecisionStatus::Draft,
        DecisionStatus::PendingApproval,
        DecisionStatus::QueryRaised,
        DecisionStatus::Approved,
        DecisionStatus::Sanctioned,
        DecisionStatus::Rejected,
        DecisionStatus::Escalated,
    ];

    /// Approved, sanctioned and rejected decisions are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Approved | DecisionStatus::Sanctioned | DecisionStatus::Rejected
        )
    }

    /// No further actions are accepted. Escalated records are closed but not terminal.
    pub fn is_closed(&self) -> bool {
        self.is_terminal() || *self == DecisionStatus::Escalated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Draft => "DRAFT",
            DecisionStatus::PendingApproval => "PENDING_APPROVAL",
            DecisionStatus::QueryRaised => "QUERY_RAISED",
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Sanctioned => "SANCTIONED",
            DecisionStatus::Rejected => "REJECTED",
            DecisionStatus::Escalated => "ESCALATED",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| WorkflowError::validation(format!("unknown status '{s}'")))
    }
}

/// Actions a caller may request on a decision.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum Action {
    #[n(0)]
    Submit,
    #[n(1)]
    Approve,
    #[n(2)]
    Sanction,
    #[n(3)]
    Reject,
    #[n(4)]
    Escalate,
    #[n(5)]
    Query,
    #[n(6)]
    Respond,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Submit,
        Action::Approve,
        Action::Sanction,
        Action::Reject,
        Action::Escalate,
        Action::Query,
        Action::Respond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Submit => "SUBMIT",
            Action::Approve => "APPROVE",
            Action::Sanction => "SANCTION",
            Action::Reject => "REJECT",
            Action::Escalate => "ESCALATE",
            Action::Query => "QUERY",
            Action::Respond => "RESPOND",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| WorkflowError::validation(format!("unknown action '{s}'")))
    }
}

/// Decision type and functional scope. Rules are keyed by this pair.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Classification {
    #[n(0)]
    pub decision_type_id: String,
    #[n(1)]
    pub functional_scope_id: String,
}

impl Classification {
    pub fn new(decision_type_id: &str, functional_scope_id: &str) -> Self {
        Self {
            decision_type_id: decision_type_id.to_string(),
            functional_scope_id: functional_scope_id.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// chrono's `Utc` has no ordering of its own, so compare the instants
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A proposal moving through the approval lifecycle.
///
/// Only the service mutates a decision, and only through a committed transition.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    #[n(0)]
    pub(crate) id: String,
    #[n(1)]
    pub(crate) initiator_actor_id: String,
    #[n(2)]
    pub(crate) dept_context_id: String,
    #[n(3)]
    pub(crate) region_context_id: String,
    #[n(4)]
    pub(crate) status: DecisionStatus,
    #[n(5)]
    pub(crate) classification: Option<Classification>,
    #[n(6)]
    pub(crate) amount: Amount,
    #[n(7)]
    pub(crate) authority_rule_id: Option<String>, // pinned at creation, never rewritten
    #[n(8)]
    pub(crate) parent_decision_id: Option<String>,
    #[n(9)]
    pub(crate) outcome_data: String, // raw payload, kept for display only
    #[n(10)]
    pub(crate) created_at: TimeStamp<Utc>,
    #[n(11)]
    pub(crate) updated_at: TimeStamp<Utc>,
    #[n(12)]
    pub(crate) trail_len: u64,
    #[n(13)]
    pub(crate) trail_head: Option<String>, // digest of the latest audit entry
}

impl Decision {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn initiator_actor_id(&self) -> &str {
        &self.initiator_actor_id
    }
    pub fn dept_context_id(&self) -> &str {
        &self.dept_context_id
    }
    pub fn region_context_id(&self) -> &str {
        &self.region_context_id
    }
    pub fn status(&self) -> DecisionStatus {
        self.status
    }
    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }
    pub fn amount(&self) -> Amount {
        self.amount
    }
    pub fn authority_rule_id(&self) -> Option<&str> {
        self.authority_rule_id.as_deref()
    }
    pub fn parent_decision_id(&self) -> Option<&str> {
        self.parent_decision_id.as_deref()
    }
    pub fn outcome_data(&self) -> &str {
        &self.outcome_data
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    /// Number of audit entries written for this decision.
    pub fn trail_len(&self) -> u64 {
        self.trail_len
    }
}

/// Checked inputs for a new decision.
#[derive(Debug, Clone)]
pub struct ValidDraft {
    pub initiator_actor_id: String,
    pub outcome: Outcome,
    pub dept_context_id: String,
    pub region_context_id: String,
    pub classification: Option<Classification>,
}

// Used for constructing new decisions
#[derive(Debug, Default, Clone)]
pub struct DecisionDraft {
    initiator_actor_id: Option<String>,
    outcome_payload: Option<serde_json::Value>,
    dept_context_id: Option<String>,
    region_context_id: Option<String>,
    decision_type_id: Option<String>,
    functional_scope_id: Option<String>,
}

impl DecisionDraft {
    /// Construct a new builder object, this becomes the basis for a decision
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_initiator(mut self, actor_id: &str) -> Self {
        self.initiator_actor_id = Some(actor_id.to_string());
        self
    }
    pub fn set_outcome(mut self, payload: serde_json::Value) -> Self {
        self.outcome_payload = Some(payload);
        self
    }
    pub fn set_dept_context(mut self, dept_context_id: &str) -> Self {
        self.dept_context_id = Some(dept_context_id.to_string());
        self
    }
    pub fn set_region_context(mut self, region_context_id: &str) -> Self {
        self.region_context_id = Some(region_context_id.to_string());
        self
    }
    pub fn set_decision_type(mut self, decision_type_id: &str) -> Self {
        self.decision_type_id = Some(decision_type_id.to_string());
        self
    }
    pub fn set_functional_scope(mut self, functional_scope_id: &str) -> Self {
        self.functional_scope_id = Some(functional_scope_id.to_string());
        self
    }

    /// Checks required fields and extracts the typed amount from the outcome payload.
    pub fn validate(&self, amount_field: &str) -> Result<ValidDraft, WorkflowError> {
        let initiator_actor_id = required(&self.initiator_actor_id, "initiator actor id")?;
        let dept_context_id = required(&self.dept_context_id, "dept context id")?;
        let region_context_id = required(&self.region_context_id, "region context id")?;

        let payload = self
            .outcome_payload
            .as_ref()
            .ok_or_else(|| WorkflowError::validation("outcome payload is missing"))?;
        let outcome = Outcome::from_payload(payload, amount_field)?;

        let decision_type = non_empty(&self.decision_type_id);
        let functional_scope = non_empty(&self.functional_scope_id);
        let classification = match (decision_type, functional_scope) {
            (Some(t), Some(s)) => Some(Classification::new(t, s)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(WorkflowError::validation(
                    "decision type given without a functional scope",
                ));
            }
            (None, Some(_)) => {
                return Err(WorkflowError::validation(
                    "functional scope given without a decision type",
                ));
            }
        };

        Ok(ValidDraft {
            initiator_actor_id,
            outcome,
            dept_context_id,
            region_context_id,
            classification,
        })
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(field: &Option<String>, name: &str) -> Result<String, WorkflowError> {
    non_empty(field)
        .map(str::to_string)
        .ok_or_else(|| WorkflowError::validation(format!("{name} is missing")))
}

/// Filter for listing decisions. Unset fields match everything.
#[derive(Debug, Default, Clone)]
pub struct DecisionFilter {
    status: Option<DecisionStatus>,
    initiator_actor_id: Option<String>,
    dept_context_id: Option<String>,
    region_context_id: Option<String>,
    decision_type_id: Option<String>,
    functional_scope_id: Option<String>,
}

impl DecisionFilter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn with_initiator(mut self, actor_id: &str) -> Self {
        self.initiator_actor_id = Some(actor_id.to_string());
        self
    }
    pub fn with_dept_context(mut self, dept_context_id: &str) -> Self {
        self.dept_context_id = Some(dept_context_id.to_string());
        self
    }
    pub fn with_region_context(mut self, region_context_id: &str) -> Self {
        self.region_context_id = Some(region_context_id.to_string());
        self
    }
    pub fn with_decision_type(mut self, decision_type_id: &str) -> Self {
        self.decision_type_id = Some(decision_type_id.to_string());
        self
    }
    pub fn with_functional_scope(mut self, functional_scope_id: &str) -> Self {
        self.functional_scope_id = Some(functional_scope_id.to_string());
        self
    }

    pub fn matches(&self, decision: &Decision) -> bool {
        let class = decision.classification.as_ref();

        self.status.is_none_or(|s| s == decision.status)
            && matches_field(&self.initiator_actor_id, Some(&decision.initiator_actor_id))
            && matches_field(&self.dept_context_id, Some(&decision.dept_context_id))
            && matches_field(&self.region_context_id, Some(&decision.region_context_id))
            && matches_field(&self.decision_type_id, class.map(|c| &c.decision_type_id))
            && matches_field(
                &self.functional_scope_id,
                class.map(|c| &c.functional_scope_id),
            )
    }
}

fn matches_field(wanted: &Option<String>, actual: Option<&String>) -> bool {
    match wanted {
        Some(wanted) => actual == Some(wanted),
        None => true,
    }
}
