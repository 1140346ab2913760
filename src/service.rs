//! Service layer API for decision workflow operations
use super::audit::{AuditEntry, AuditLog, AuditMetadata, AuditRecorder, ChainReport};
use super::authority::{self, AuthorityRule, Resolution};
use super::config::EngineConfig;
use super::decision::{Action, Decision, DecisionDraft, DecisionFilter, DecisionStatus, TimeStamp};
use super::directory::{Actor, ActorDirectory};
use super::error::WorkflowError;
use super::machine::{self, Guard};
use super::rulebook::RuleBook;
use super::utils;
use super::validator;
use sled::Transactional;
use sled::transaction::{TransactionResult, abort};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DECISIONS_TREE: &str = "decisions";
const AUDIT_TREE: &str = "audit";
const RULES_TREE: &str = "rules";

/// A decision together with what a reviewer needs to see alongside it.
#[derive(Debug, Clone)]
pub struct DecisionView {
    pub decision: Decision,
    pub rule: Option<AuthorityRule>,
    pub trail: Vec<AuditEntry>,
}

pub struct DecisionService<D: ActorDirectory> {
    instance: Arc<sled::Db>,
    decisions: sled::Tree,
    audit_tree: sled::Tree,
    audit: AuditLog,
    rules: RuleBook,
    directory: D,
    config: EngineConfig,
}

impl<D: ActorDirectory> DecisionService<D> {
    pub fn new(
        instance: Arc<sled::Db>,
        directory: D,
        config: EngineConfig,
    ) -> Result<Self, WorkflowError> {
        let decisions = instance.open_tree(DECISIONS_TREE)?;
        let audit_tree = instance.open_tree(AUDIT_TREE)?;
        let rules = RuleBook::new(instance.open_tree(RULES_TREE)?, &config.ids.rule_prefix);

        Ok(Self {
            audit: AuditLog::new(audit_tree.clone()),
            instance,
            decisions,
            audit_tree,
            rules,
            directory,
            config,
        })
    }

    /// Opens the sled store named by `config`.
    pub fn open(config: &EngineConfig, directory: D) -> Result<Self, WorkflowError> {
        let mut store = sled::Config::new().temporary(config.store.temporary);
        if !config.store.temporary {
            store = store.path(&config.store.path);
        }
        let db = store.open()?;

        info!(
            path = %config.store.path.display(),
            temporary = config.store.temporary,
            "decision store opened"
        );
        Self::new(Arc::new(db), directory, config.clone())
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), WorkflowError> {
        self.instance.flush()?;
        Ok(())
    }

    fn lookup_actor(&self, actor_id: &str) -> Result<Actor, WorkflowError> {
        if actor_id.trim().is_empty() {
            return Err(WorkflowError::validation("actor id is missing"));
        }
        self.directory
            .get_actor(actor_id)?
            .ok_or_else(|| WorkflowError::not_found("actor", actor_id))
    }

    fn active_actor(&self, actor_id: &str) -> Result<Actor, WorkflowError> {
        let actor = self.lookup_actor(actor_id)?;
        if !actor.active {
            warn!(actor_id, "inactive actor refused");
            return Err(WorkflowError::inactive_actor(actor_id));
        }
        Ok(actor)
    }

    fn load_decision(&self, decision_id: &str) -> Result<Decision, WorkflowError> {
        if decision_id.trim().is_empty() {
            return Err(WorkflowError::validation("decision id is missing"));
        }
        match self.decisions.get(decision_id.as_bytes())? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Err(WorkflowError::not_found("decision", decision_id)),
        }
    }

    fn resolve_rule(&self, decision: &Decision) -> Result<Option<String>, WorkflowError> {
        let Some(classification) = decision.classification.as_ref() else {
            return Ok(None);
        };
        match authority::resolve(&self.rules, classification, decision.amount)? {
            Resolution::Found(found) => Ok(Some(found.rule_id)),
            Resolution::Uncovered => {
                warn!(
                    decision_id = %decision.id,
                    amount = %decision.amount,
                    "amount exceeds every configured authority; rule left unset"
                );
                Ok(None)
            }
        }
    }

    fn insert_new(&self, mut decision: Decision) -> Result<Decision, WorkflowError> {
        decision.authority_rule_id = self.resolve_rule(&decision)?;

        let cbor = minicbor::to_vec(&decision).map_err(|e| WorkflowError::System(e.to_string()))?;
        self.decisions
            .compare_and_swap(decision.id.as_bytes(), None as Option<&[u8]>, Some(cbor))?
            .map_err(|_| WorkflowError::System(format!("decision id {} reused", decision.id)))?;

        info!(
            decision_id = %decision.id,
            initiator = %decision.initiator_actor_id,
            amount = %decision.amount,
            rule = decision.authority_rule_id.as_deref().unwrap_or("-"),
            parent = decision.parent_decision_id.as_deref().unwrap_or("-"),
            "decision created"
        );
        Ok(decision)
    }

    /// Creates a decision in `DRAFT`, pinning the authority rule that covers
    /// its amount when a classification is given.
    pub fn create_decision(&self, draft: DecisionDraft) -> Result<Decision, WorkflowError> {
        let draft = draft.validate(&self.config.outcome.amount_field)?;
        self.active_actor(&draft.initiator_actor_id)?;

        let now = TimeStamp::new();
        let decision = Decision {
            id: utils::new_uuid_to_bech32(&self.config.ids.decision_prefix)?,
            initiator_actor_id: draft.initiator_actor_id,
            dept_context_id: draft.dept_context_id,
            region_context_id: draft.region_context_id,
            status: DecisionStatus::Draft,
            classification: draft.classification,
            amount: draft.outcome.amount(),
            authority_rule_id: None,
            parent_decision_id: None,
            outcome_data: draft.outcome.raw().to_string(),
            created_at: now.clone(),
            updated_at: now,
            trail_len: 0,
            trail_head: None,
        };

        self.insert_new(decision)
    }

    /// Opens a fresh `DRAFT` that continues an escalated decision. The
    /// escalated record itself is left untouched.
    pub fn create_successor(
        &self,
        parent_id: &str,
        actor_id: &str,
    ) -> Result<Decision, WorkflowError> {
        let actor = self.active_actor(actor_id)?;
        let parent = self.load_decision(parent_id)?;
        if parent.status != DecisionStatus::Escalated {
            return Err(WorkflowError::validation(format!(
                "decision {parent_id} is {}; only ESCALATED decisions take a successor",
                parent.status
            )));
        }

        let now = TimeStamp::new();
        let decision = Decision {
            id: utils::new_uuid_to_bech32(&self.config.ids.decision_prefix)?,
            initiator_actor_id: actor.id,
            dept_context_id: parent.dept_context_id,
            region_context_id: parent.region_context_id,
            status: DecisionStatus::Draft,
            classification: parent.classification,
            amount: parent.amount,
            authority_rule_id: None,
            parent_decision_id: Some(parent.id),
            outcome_data: parent.outcome_data,
            created_at: now.clone(),
            updated_at: now,
            trail_len: 0,
            trail_head: None,
        };

        self.insert_new(decision)
    }

    fn check_authority(&self, decision: &Decision, actor: &Actor) -> Result<(), WorkflowError> {
        let Some(rule_id) = decision.authority_rule_id.as_deref() else {
            debug!(decision_id = %decision.id, "no pinned rule; approval not limit-checked");
            return Ok(());
        };
        let classification = decision.classification.as_ref().ok_or_else(|| {
            WorkflowError::System(format!(
                "decision {} pins rule {rule_id} without a classification",
                decision.id
            ))
        })?;

        let result = validator::validate(
            &self.rules,
            actor.authority_body_type,
            &actor.authority_body_id,
            classification,
            decision.amount,
        );
        match result.into_error(decision.amount) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Applies `action` to a decision.
    ///
    /// The read of the current state, the guard checks, the status write and
    /// the audit append all happen in one sled transaction. A failure leaves
    /// the decision and its trail exactly as they were.
    pub fn perform_action(
        &self,
        decision_id: &str,
        actor_id: &str,
        action: Action,
        metadata: AuditMetadata,
    ) -> Result<Decision, WorkflowError> {
        if decision_id.trim().is_empty() {
            return Err(WorkflowError::validation("decision id is missing"));
        }
        let actor = self.lookup_actor(actor_id)?;
        let audit_prefix = self.config.ids.audit_prefix.as_str();

        let result: TransactionResult<(Decision, AuditEntry), WorkflowError> =
            (&self.decisions, &self.audit_tree).transaction(|(decisions, audit)| {
            let Some(bytes) = decisions.get(decision_id.as_bytes())? else {
                return abort(WorkflowError::not_found("decision", decision_id));
            };
            let mut decision: Decision = match minicbor::decode(&bytes) {
                Ok(decision) => decision,
                Err(err) => return abort(err.into()),
            };

            let step = match machine::transition(decision.status, action) {
                Ok(step) => step,
                Err(err) => return abort(err),
            };
            if !actor.active {
                return abort(WorkflowError::inactive_actor(&actor.id));
            }
            if step.guard == Guard::AuthorityLimit {
                if let Err(err) = self.check_authority(&decision, &actor) {
                    return abort(err);
                }
            }

            let prev_state = decision.status;
            decision.status = step.to;
            decision.updated_at = TimeStamp::new();

            let entry = AuditRecorder::new(audit, audit_prefix).record(
                &mut decision,
                &actor.id,
                action,
                prev_state,
                step.to,
                metadata.clone(),
            )?;

            let cbor = match minicbor::to_vec(&decision) {
                Ok(cbor) => cbor,
                Err(err) => return abort(WorkflowError::System(err.to_string())),
            };
            decisions.insert(decision_id.as_bytes(), cbor)?;

            Ok((decision, entry))
        });

        match result.map_err(WorkflowError::from) {
            Ok((decision, entry)) => {
                info!(
                    decision_id,
                    actor_id,
                    action = %action,
                    from = %entry.prev_state,
                    to = %entry.new_state,
                    seq = entry.seq,
                    "decision transitioned"
                );
                Ok(decision)
            }
            Err(err) => {
                match &err {
                    WorkflowError::Forbidden { reason, message, .. } => {
                        warn!(decision_id, actor_id, action = %action, %reason, detail = %message, "action forbidden")
                    }
                    WorkflowError::System(message) => {
                        warn!(decision_id, actor_id, action = %action, detail = %message, "action failed")
                    }
                    other => debug!(decision_id, actor_id, action = %action, error = %other, "action refused"),
                }
                Err(err)
            }
        }
    }

    /// The decision with its pinned rule and audit trail.
    pub fn get_decision(&self, decision_id: &str) -> Result<DecisionView, WorkflowError> {
        let decision = self.load_decision(decision_id)?;

        let rule = match decision.authority_rule_id.as_deref() {
            Some(rule_id) => Some(
                self.rules
                    .rule(rule_id)?
                    .ok_or_else(|| WorkflowError::not_found("authority rule", rule_id))?,
            ),
            None => None,
        };
        let trail = self.audit.trail(&decision.id, self.config.audit.order)?;

        Ok(DecisionView {
            decision,
            rule,
            trail,
        })
    }

    /// Decisions matching `filter`, oldest first.
    pub fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>, WorkflowError> {
        let mut decisions = Vec::new();
        for value in self.decisions.iter().values() {
            let decision: Decision = minicbor::decode(&value?)?;
            if filter.matches(&decision) {
                decisions.push(decision);
            }
        }
        decisions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(decisions)
    }

    /// Walks the decision's hash chain and checks it ends where the decision
    /// says it does.
    pub fn verify_trail(&self, decision_id: &str) -> Result<ChainReport, WorkflowError> {
        let decision = self.load_decision(decision_id)?;
        let mut report = self.audit.verify(decision_id)?;

        if report.broken_at.is_none()
            && (report.entries != decision.trail_len || report.head != decision.trail_head)
        {
            report.broken_at = Some(report.entries.min(decision.trail_len));
        }
        if !report.is_intact() {
            warn!(decision_id, broken_at = ?report.broken_at, "audit chain broken");
        }
        Ok(report)
    }
}
