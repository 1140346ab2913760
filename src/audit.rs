//! Append-only audit ledger of decision transitions
//!
//! Entries are written by [`AuditRecorder`] inside the same sled transaction as
//! the state change they describe. Each entry links to the sha256 digest of
//! its predecessor so a rewritten trail is detectable.
use super::decision::{Action, Decision, DecisionStatus, TimeStamp};
use super::error::WorkflowError;
use super::utils;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditMetadata {
    #[n(0)]
    pub notes: Option<String>,
    #[n(1)]
    pub evidence_refs: Vec<String>,
}

impl AuditMetadata {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
    pub fn add_evidence(mut self, reference: &str) -> Self {
        self.evidence_refs.push(reference.to_string());
        self
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub decision_id: String,
    #[n(2)]
    pub seq: u64, // position in the decision's trail, from 0
    #[n(3)]
    pub actor_id: String,
    #[n(4)]
    pub action_type: Action,
    #[n(5)]
    pub prev_state: DecisionStatus,
    #[n(6)]
    pub new_state: DecisionStatus,
    #[n(7)]
    pub metadata: AuditMetadata,
    #[n(8)]
    pub timestamp: TimeStamp<Utc>,
    #[n(9)]
    pub prev_hash: Option<String>,
}

impl AuditEntry {
    /// sha256 of the CBOR encoding; the next entry links to this.
    pub fn digest(&self) -> anyhow::Result<String> {
        Ok(utils::digest_cbor(self)?.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrailOrder {
    Ascending,
    #[default]
    Descending,
}

fn trail_prefix(decision_id: &str) -> Vec<u8> {
    let mut key = decision_id.as_bytes().to_vec();
    key.push(0);
    key
}

pub(crate) fn trail_key(decision_id: &str, seq: u64) -> Vec<u8> {
    let mut key = trail_prefix(decision_id);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Writes audit entries. Only constructible over a transactional view, so an
/// entry can never be appended outside a transition.
pub(crate) struct AuditRecorder<'a> {
    tree: &'a TransactionalTree,
    id_prefix: &'a str,
}

impl<'a> AuditRecorder<'a> {
    pub(crate) fn new(tree: &'a TransactionalTree, id_prefix: &'a str) -> Self {
        Self { tree, id_prefix }
    }

    /// Appends the entry and advances the decision's trail pointer. The caller
    /// must write the decision back in the same transaction.
    pub(crate) fn record(
        &self,
        decision: &mut Decision,
        actor_id: &str,
        action_type: Action,
        prev_state: DecisionStatus,
        new_state: DecisionStatus,
        metadata: AuditMetadata,
    ) -> ConflictableTransactionResult<AuditEntry, WorkflowError> {
        let id = match utils::new_uuid_to_bech32(self.id_prefix) {
            Ok(id) => id,
            Err(err) => return abort(err.into()),
        };

        let entry = AuditEntry {
            id,
            decision_id: decision.id.clone(),
            seq: decision.trail_len,
            actor_id: actor_id.to_string(),
            action_type,
            prev_state,
            new_state,
            metadata,
            timestamp: TimeStamp::new(),
            prev_hash: decision.trail_head.clone(),
        };

        let (hash, cbor) = match utils::digest_cbor(&entry) {
            Ok(encoded) => encoded,
            Err(err) => return abort(err.into()),
        };

        let key = trail_key(&entry.decision_id, entry.seq);
        if self.tree.insert(key, cbor)?.is_some() {
            // a slot is never reused
            return abort(WorkflowError::System(format!(
                "audit slot {} of {} already written",
                entry.seq, entry.decision_id
            )));
        }

        decision.trail_len += 1;
        decision.trail_head = Some(hash);

        Ok(entry)
    }
}

/// Outcome of walking a decision's hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub entries: u64,
    pub head: Option<String>,
    // first sequence number whose link or position is wrong
    pub broken_at: Option<u64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Read side of the ledger.
#[derive(Clone)]
pub struct AuditLog {
    tree: sled::Tree,
}

impl AuditLog {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Entries for a decision in sequence order. Each call reads afresh.
    pub fn trail(
        &self,
        decision_id: &str,
        order: TrailOrder,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        let mut entries = self
            .tree
            .scan_prefix(trail_prefix(decision_id))
            .map(|item| -> Result<AuditEntry, WorkflowError> {
                let (_, value) = item?;
                Ok(minicbor::decode(&value)?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if order == TrailOrder::Descending {
            entries.reverse();
        }
        Ok(entries)
    }

    pub fn verify(&self, decision_id: &str) -> Result<ChainReport, WorkflowError> {
        let mut report = ChainReport {
            entries: 0,
            head: None,
            broken_at: None,
        };

        for entry in self.trail(decision_id, TrailOrder::Ascending)? {
            if report.broken_at.is_none()
                && (entry.seq != report.entries || entry.prev_hash != report.head)
            {
                report.broken_at = Some(report.entries);
            }
            report.head = Some(entry.digest()?);
            report.entries += 1;
        }

        Ok(report)
    }
}
