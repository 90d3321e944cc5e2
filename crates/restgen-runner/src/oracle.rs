//! Response judging
//!
//! No I/O. Nominal requests must succeed and match the declared response
//! schema; mutated requests must be rejected with a client error.

use restgen_core::sequence::{ExecutionOutcome, ObservedValue};
use serde_json::Value;

/// Nesting depth past which response bodies are not flattened.
const MAX_FLATTEN_DEPTH: usize = 8;

/// Validation errors kept in a failure summary.
const MAX_REPORTED_ERRORS: usize = 5;

/// Everything the oracle needs about one exchange.
pub(crate) struct Exchange<'a> {
    pub(crate) mutated: bool,
    pub(crate) status: u16,
    pub(crate) body_text: &'a str,
    /// Declared JSON schema for `status`, if any.
    pub(crate) schema: Option<&'a Value>,
}

pub(crate) fn judge(exchange: &Exchange<'_>) -> ExecutionOutcome {
    let status = exchange.status;
    if exchange.mutated {
        return if (400..500).contains(&status) {
            ExecutionOutcome::pass(Some(status), Vec::new())
        } else if (500..600).contains(&status) {
            ExecutionOutcome::fail(Some(status), format!("server error {status} on invalid input"))
        } else {
            ExecutionOutcome::fail(Some(status), format!("invalid input accepted with {status}"))
        };
    }

    if !(200..300).contains(&status) {
        return ExecutionOutcome::fail(Some(status), format!("unexpected status {status}"));
    }

    let body: Option<Value> = serde_json::from_str(exchange.body_text).ok();
    if let Some(schema) = exchange.schema.filter(|s| s.as_object().is_some_and(|o| !o.is_empty())) {
        let Some(body) = &body else {
            if exchange.body_text.trim().is_empty() {
                return ExecutionOutcome::fail(Some(status), "empty body where a JSON schema is declared");
            }
            return ExecutionOutcome::fail(Some(status), "response body is not valid JSON");
        };
        if let Ok(validator) = jsonschema::validator_for(schema) {
            let errors: Vec<String> = validator
                .iter_errors(body)
                .take(MAX_REPORTED_ERRORS)
                .map(|e| e.to_string())
                .collect();
            if !errors.is_empty() {
                return ExecutionOutcome::fail(
                    Some(status),
                    format!("response does not match schema: {}", errors.join("; ")),
                );
            }
        }
    }

    let observed = body.as_ref().map(flatten).unwrap_or_default();
    ExecutionOutcome::pass(Some(status), observed)
}

/// Scalar fields of a JSON document, keyed by their property name and
/// tagged with the property holding their enclosing object.
pub(crate) fn flatten(body: &Value) -> Vec<ObservedValue> {
    let mut out = Vec::new();
    flatten_into(body, None, None, 0, &mut out);
    out
}

fn flatten_into(
    value: &Value,
    field: Option<&str>,
    enclosing: Option<&str>,
    depth: usize,
    out: &mut Vec<ObservedValue>,
) {
    if depth > MAX_FLATTEN_DEPTH {
        return;
    }
    match value {
        Value::Object(fields) => {
            let holder = field.or(enclosing);
            for (name, v) in fields {
                flatten_into(v, Some(name), holder, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(item, field, enclosing, depth + 1, out);
            }
        }
        Value::Null => {}
        scalar => {
            if let Some(field) = field {
                let observed = ObservedValue::new(field, scalar.clone());
                out.push(match enclosing {
                    Some(holder) => observed.within(holder),
                    None => observed,
                });
            }
        }
    }
}
