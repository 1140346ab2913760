//! Delegation-of-authority rules and amount resolution
use super::amount::Amount;
use super::decision::Classification;
use super::error::WorkflowError;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum AuthorityBodyType {
    #[n(0)]
    Role,
    #[n(1)]
    Committee,
}

impl AuthorityBodyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityBodyType::Role => "ROLE",
            AuthorityBodyType::Committee => "COMMITTEE",
        }
    }
}

impl fmt::Display for AuthorityBodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityBodyType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROLE" => Ok(AuthorityBodyType::Role),
            "COMMITTEE" => Ok(AuthorityBodyType::Committee),
            other => Err(WorkflowError::validation(format!(
                "unknown authority body type '{other}'"
            ))),
        }
    }
}

/// One rung of an authority ladder: the band of amounts a body may sign for
/// under a classification.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRule {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub authority_body_type: AuthorityBodyType,
    #[n(2)]
    pub authority_body_id: String,
    #[n(3)]
    pub classification: Classification,
    #[n(4)]
    pub limit_min: Option<Amount>, // None reads as 0
    #[n(5)]
    pub limit_max: Option<Amount>, // None is unbounded
    #[n(6)]
    pub currency: String,
    #[n(7)]
    pub is_escalation_mandatory: bool,
}

impl AuthorityRule {
    pub fn new(
        id: &str,
        authority_body_type: AuthorityBodyType,
        authority_body_id: &str,
        classification: Classification,
    ) -> Self {
        Self {
            id: id.to_string(),
            authority_body_type,
            authority_body_id: authority_body_id.to_string(),
            classification,
            limit_min: None,
            limit_max: None,
            currency: "INR".to_string(),
            is_escalation_mandatory: false,
        }
    }
    /// Band in whole currency units.
    pub fn set_limits(self, limit_min: Option<u64>, limit_max: Option<u64>) -> Self {
        self.set_bounds(limit_min.map(Amount::from), limit_max.map(Amount::from))
    }
    pub fn set_bounds(mut self, limit_min: Option<Amount>, limit_max: Option<Amount>) -> Self {
        self.limit_min = limit_min;
        self.limit_max = limit_max;
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }
    pub fn set_escalation_mandatory(mut self, mandatory: bool) -> Self {
        self.is_escalation_mandatory = mandatory;
        self
    }

    pub fn effective_min(&self) -> Amount {
        self.limit_min.unwrap_or(Amount::ZERO)
    }

    /// Inclusive on both bounds.
    pub fn covers(&self, amount: Amount) -> bool {
        self.effective_min() <= amount && self.limit_max.is_none_or(|max| amount <= max)
    }

    pub fn is_held_by(&self, body_type: AuthorityBodyType, body_id: &str) -> bool {
        self.authority_body_type == body_type && self.authority_body_id == body_id
    }

    // ascending effective max (unbounded last), then min, then id
    fn ladder_key(&self) -> (bool, Option<Amount>, Amount, &str) {
        (
            self.limit_max.is_none(),
            self.limit_max,
            self.effective_min(),
            &self.id,
        )
    }

    /// Rejects rules that could never be selected consistently.
    pub fn check(&self) -> Result<(), WorkflowError> {
        if self.id.trim().is_empty() {
            return Err(WorkflowError::validation("rule id is empty"));
        }
        if self.authority_body_id.trim().is_empty() {
            return Err(WorkflowError::validation("authority body id is empty"));
        }
        if self.classification.decision_type_id.trim().is_empty()
            || self.classification.functional_scope_id.trim().is_empty()
        {
            return Err(WorkflowError::validation("rule classification is incomplete"));
        }
        match self.limit_max {
            Some(max) if self.effective_min() > max => Err(WorkflowError::validation(format!(
                "rule {} has limit_min {} above limit_max {max}",
                self.id,
                self.effective_min()
            ))),
            _ => Ok(()),
        }
    }
}

/// Orders rules into a ladder of increasing limits.
pub fn ladder<'a>(rules: impl IntoIterator<Item = &'a AuthorityRule>) -> Vec<&'a AuthorityRule> {
    let mut ladder: Vec<_> = rules.into_iter().collect();
    ladder.sort_by(|a, b| a.ladder_key().cmp(&b.ladder_key()));
    ladder
}

/// First rung of the ladder whose band covers `amount`.
pub fn select_rule(rules: &[AuthorityRule], amount: Amount) -> Option<&AuthorityRule> {
    ladder(rules).into_iter().find(|rule| rule.covers(amount))
}

/// Read access to the configured rules.
pub trait RuleSource {
    /// All rules defined for a classification, in any order.
    fn rules_for(&self, classification: &Classification) -> anyhow::Result<Vec<AuthorityRule>>;
}

impl RuleSource for [AuthorityRule] {
    fn rules_for(&self, classification: &Classification) -> anyhow::Result<Vec<AuthorityRule>> {
        Ok(self
            .iter()
            .filter(|rule| &rule.classification == classification)
            .cloned()
            .collect())
    }
}

impl RuleSource for Vec<AuthorityRule> {
    fn rules_for(&self, classification: &Classification) -> anyhow::Result<Vec<AuthorityRule>> {
        self.as_slice().rules_for(classification)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthority {
    pub rule_id: String,
    pub authority_body_type: AuthorityBodyType,
    pub authority_body_id: String,
    pub limit_max: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedAuthority),
    // amount is beyond every configured band; handled outside the engine
    Uncovered,
}

impl Resolution {
    pub fn found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            Resolution::Found(authority) => Some(&authority.rule_id),
            Resolution::Uncovered => None,
        }
    }
}

/// Finds the narrowest authority whose band covers `amount`.
pub fn resolve<S: RuleSource + ?Sized>(
    source: &S,
    classification: &Classification,
    amount: Amount,
) -> anyhow::Result<Resolution> {
    let rules = source.rules_for(classification)?;

    let resolution = match select_rule(&rules, amount) {
        Some(rule) => Resolution::Found(ResolvedAuthority {
            rule_id: rule.id.clone(),
            authority_body_type: rule.authority_body_type,
            authority_body_id: rule.authority_body_id.clone(),
            limit_max: rule.limit_max,
        }),
        None => Resolution::Uncovered,
    };

    debug!(
        decision_type = %classification.decision_type_id,
        functional_scope = %classification.functional_scope_id,
        amount = %amount,
        candidates = rules.len(),
        rule = resolution.rule_id().unwrap_or("-"),
        "resolved authority"
    );

    Ok(resolution)
}
