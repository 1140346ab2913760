//! Checks whether an authority body may sign at a given amount.
//!
//! Business outcomes come back as a [`ValidationResult`] value. Only a failing
//! rule source is reported as [`DenialReason::SystemError`], so the caller can
//! tell "not authorized" apart from "could not check".
use super::amount::Amount;
use super::authority::{AuthorityBodyType, RuleSource, ladder};
use super::decision::Classification;
use super::error::{ReasonCode, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NoRule,
    BelowMin,
    ExceedsLimit,
    SystemError,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NoRule => "NO_RULE",
            DenialReason::BelowMin => "BELOW_MIN",
            DenialReason::ExceedsLimit => "EXCEEDS_LIMIT",
            DenialReason::SystemError => "SYSTEM_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<DenialReason>,
    pub rule_id: Option<String>,
    pub limit_min: Option<Amount>,
    pub limit_max: Option<Amount>,
    pub is_escalation_mandatory: Option<bool>,
    pub detail: Option<String>,
}

impl ValidationResult {
    fn allowed(rule_id: &str) -> Self {
        Self {
            valid: true,
            rule_id: Some(rule_id.to_string()),
            ..Default::default()
        }
    }

    fn denied(reason: DenialReason) -> Self {
        Self {
            reason: Some(reason),
            ..Default::default()
        }
    }

    /// Maps a denial onto the service error surface. `None` when valid.
    pub fn into_error(self, amount: Amount) -> Option<WorkflowError> {
        let reason = self.reason?;
        let forbidden = |reason, message, escalation_required| WorkflowError::Forbidden {
            reason,
            message,
            escalation_required,
        };

        Some(match reason {
            DenialReason::NoRule => forbidden(
                ReasonCode::NoRule,
                "no authority rule held for this classification".to_string(),
                false,
            ),
            DenialReason::BelowMin => forbidden(
                ReasonCode::BelowMin,
                format!(
                    "amount {amount} is below authority floor of {}",
                    self.limit_min.unwrap_or(Amount::ZERO)
                ),
                false,
            ),
            DenialReason::ExceedsLimit => forbidden(
                ReasonCode::ExceedsLimit,
                match self.limit_max {
                    Some(max) => format!("amount {amount} exceeds authority limit of {max}"),
                    None => format!("amount {amount} exceeds authority limit"),
                },
                self.is_escalation_mandatory.unwrap_or(false),
            ),
            DenialReason::SystemError => WorkflowError::System(
                self.detail
                    .unwrap_or_else(|| "authority rules unavailable".to_string()),
            ),
        })
    }
}

/// Validates the band of the rule(s) held by the acting body, not the rule
/// resolved for the amount.
pub fn validate<S: RuleSource + ?Sized>(
    source: &S,
    body_type: AuthorityBodyType,
    body_id: &str,
    classification: &Classification,
    amount: Amount,
) -> ValidationResult {
    let rules = match source.rules_for(classification) {
        Ok(rules) => rules,
        Err(err) => {
            let mut result = ValidationResult::denied(DenialReason::SystemError);
            result.detail = Some(format!("{err:#}"));
            return result;
        }
    };

    let held = ladder(rules.iter().filter(|r| r.is_held_by(body_type, body_id)));
    if held.is_empty() {
        return ValidationResult::denied(DenialReason::NoRule);
    }

    if let Some(rule) = held.iter().find(|r| r.covers(amount)) {
        return ValidationResult::allowed(&rule.id);
    }

    // the nearest band below the amount decides; a body with every floor above
    // the amount is mis-routed rather than over its limit
    match held.iter().rev().find(|r| r.effective_min() <= amount) {
        Some(rule) => ValidationResult {
            reason: Some(DenialReason::ExceedsLimit),
            rule_id: Some(rule.id.clone()),
            limit_min: rule.limit_min,
            limit_max: rule.limit_max,
            is_escalation_mandatory: Some(rule.is_escalation_mandatory),
            ..Default::default()
        },
        None => {
            let floor = held[0];
            ValidationResult {
                reason: Some(DenialReason::BelowMin),
                rule_id: Some(floor.id.clone()),
                limit_min: Some(floor.effective_min()),
                limit_max: floor.limit_max,
                ..Default::default()
            }
        }
    }
}
