//! sled-backed store of authority rules with a per-classification cache
use super::authority::{AuthorityRule, RuleSource};
use super::decision::Classification;
use super::error::WorkflowError;
use super::utils;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

pub struct RuleBook {
    tree: sled::Tree,
    id_prefix: String,
    cache: RwLock<HashMap<Classification, Vec<AuthorityRule>>>,
    // bumped on every write; a scan that straddles a write is not cached
    generation: AtomicU64,
}

impl RuleBook {
    pub(crate) fn new(tree: sled::Tree, id_prefix: &str) -> Self {
        Self {
            tree,
            id_prefix: id_prefix.to_string(),
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces a rule. An empty id is filled in with a fresh one.
    pub fn put_rule(&self, mut rule: AuthorityRule) -> Result<AuthorityRule, WorkflowError> {
        if rule.id.trim().is_empty() {
            rule.id = utils::new_uuid_to_bech32(&self.id_prefix)?;
        }
        rule.check()?;

        let cbor = minicbor::to_vec(&rule).map_err(|e| WorkflowError::System(e.to_string()))?;
        let previous = self.tree.insert(rule.id.as_bytes(), cbor)?;

        // a replaced rule may have moved between classifications
        self.invalidate();

        info!(
            rule_id = %rule.id,
            body_type = %rule.authority_body_type,
            body_id = %rule.authority_body_id,
            decision_type = %rule.classification.decision_type_id,
            functional_scope = %rule.classification.functional_scope_id,
            limit_min = ?rule.limit_min,
            limit_max = ?rule.limit_max,
            replaced = previous.is_some(),
            "authority rule stored"
        );
        Ok(rule)
    }

    pub fn rule(&self, rule_id: &str) -> Result<Option<AuthorityRule>, WorkflowError> {
        match self.tree.get(rule_id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn rules(&self) -> Result<Vec<AuthorityRule>, WorkflowError> {
        self.tree
            .iter()
            .values()
            .map(|value| -> Result<AuthorityRule, WorkflowError> {
                Ok(minicbor::decode(&value?)?)
            })
            .collect()
    }

    fn invalidate(&self) {
        // a poisoned cache is simply rebuilt
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    /// Caches `rules` only if no write landed since `seen` was read.
    fn fill_cache(
        &self,
        classification: &Classification,
        rules: &[AuthorityRule],
        seen: u64,
    ) -> bool {
        let Ok(mut cache) = self.cache.write() else {
            return false;
        };
        if self.generation.load(Ordering::SeqCst) != seen {
            return false;
        }
        cache.insert(classification.clone(), rules.to_vec());
        true
    }
}

impl RuleSource for RuleBook {
    fn rules_for(&self, classification: &Classification) -> anyhow::Result<Vec<AuthorityRule>> {
        if let Some(rules) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(classification).cloned())
        {
            return Ok(rules);
        }

        let seen = self.generation.load(Ordering::SeqCst);
        let rules: Vec<AuthorityRule> = self
            .rules()?
            .into_iter()
            .filter(|rule| &rule.classification == classification)
            .collect();

        let cached = self.fill_cache(classification, &rules, seen);
        debug!(
            decision_type = %classification.decision_type_id,
            functional_scope = %classification.functional_scope_id,
            count = rules.len(),
            cached,
            "rule cache refreshed"
        );
        Ok(rules)
    }
}
