//! Boundary accessor for the opaque outcome payload.
//!
//! Callers hand over an arbitrary JSON object. The only fact the engine reads
//! from it is the monetary amount, extracted once here as an exact [`Amount`].
//! Everything past this point works on [`Outcome`].
use super::amount::Amount;
use super::error::WorkflowError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    amount: Amount,
    raw: String,
}

impl Outcome {
    /// Extracts the amount stored under `amount_field`.
    ///
    /// A missing or null field is an amount of zero. Negative and non-numeric
    /// values are rejected.
    pub fn from_payload(payload: &Value, amount_field: &str) -> Result<Self, WorkflowError> {
        let object = payload
            .as_object()
            .ok_or_else(|| WorkflowError::validation("outcome payload must be a JSON object"))?;

        let amount = match object.get(amount_field) {
            None | Some(Value::Null) => Amount::ZERO,
            Some(value) => parse_amount(value).map_err(|err| {
                WorkflowError::validation(format!(
                    "'{amount_field}' must be a non-negative number, got {value}: {err}"
                ))
            })?,
        };

        Ok(Self {
            amount,
            raw: payload.to_string(),
        })
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Compact JSON text of the payload as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// numbers are read from their JSON text, which serde_json keeps verbatim
fn parse_amount(value: &Value) -> Result<Amount, WorkflowError> {
    match value {
        Value::Number(n) => n.to_string().parse(),
        Value::String(s) => s.parse(),
        other => Err(WorkflowError::validation(format!("{other} is not numeric"))),
    }
}
