//! Value compliance checks and safe coercion

use std::net::{Ipv4Addr, Ipv6Addr};

use serde_json::{Number, Value};
use tracing::debug;

use super::{Combinator, NodeId, NodeKind, NumberNode, ParameterArena, StringNode};
use crate::error::CoreError;

impl ParameterArena {
    /// Whether `value` satisfies every declared constraint of `id`:
    /// type, format, length/range, enum, pattern and, for structured nodes,
    /// items and required properties.
    #[must_use]
    pub fn is_value_compliant(&self, id: NodeId, value: &Value) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if !node.enum_values.is_empty() && !node.enum_values.contains(value) {
            return false;
        }
        match &node.kind {
            NodeKind::String(s) => value
                .as_str()
                .is_some_and(|v| string_compliant(s, node.format.as_deref(), v)),
            NodeKind::Number(n) => number_compliant(n, value),
            NodeKind::Boolean(_) => value.is_boolean(),
            NodeKind::Null(_) => value.is_null(),
            NodeKind::Generic(_) => true,
            NodeKind::Array(a) => {
                let Some(items) = value.as_array() else {
                    return false;
                };
                let len = items.len() as u64;
                if a.min_items.is_some_and(|m| len < m) || a.max_items.is_some_and(|m| len > m) {
                    return false;
                }
                if a.unique_items
                    && items
                        .iter()
                        .enumerate()
                        .any(|(i, x)| items[..i].contains(x))
                {
                    return false;
                }
                items
                    .iter()
                    .all(|item| self.is_value_compliant(a.reference_element, item))
            }
            NodeKind::Object(o) => {
                let Some(fields) = value.as_object() else {
                    return false;
                };
                o.properties.iter().all(|p| {
                    let property = &self[*p];
                    match fields.get(&property.name) {
                        Some(v) => self.is_value_compliant(*p, v),
                        None => !property.required,
                    }
                })
            }
            NodeKind::Combined(c) => match c.combinator {
                Combinator::AllOf => self
                    .effective_schema(id)
                    .is_some_and(|e| self.is_value_compliant(e, value)),
                Combinator::AnyOf | Combinator::OneOf => c
                    .candidates
                    .iter()
                    .any(|candidate| self.is_value_compliant(*candidate, value)),
            },
        }
    }

    /// Coarse check: does the JSON type of `value` match the declared type?
    #[must_use]
    pub fn is_object_type_compliant(&self, id: NodeId, value: &Value) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        match &node.kind {
            NodeKind::String(_) => value.is_string(),
            NodeKind::Number(_) => value.is_number(),
            NodeKind::Boolean(_) => value.is_boolean(),
            NodeKind::Null(_) => value.is_null(),
            NodeKind::Generic(_) => true,
            NodeKind::Array(_) => value.is_array(),
            NodeKind::Object(_) => value.is_object(),
            NodeKind::Combined(c) => c
                .candidates
                .iter()
                .any(|candidate| self.is_object_type_compliant(*candidate, value)),
        }
    }

    /// Cast `value` to the declared type of `id` when that is lossless.
    ///
    /// # Errors
    ///
    /// [`CoreError::TypeMismatch`] when no safe cast exists.
    pub fn coerce_value(&self, id: NodeId, value: Value) -> Result<Value, CoreError> {
        let node = self.get(id).ok_or(CoreError::UnknownNode(id))?;
        let mismatch = |value: &Value| CoreError::TypeMismatch {
            name: node.name.clone(),
            expected: node.parameter_type(),
            value: value.to_string(),
        };
        // explicit null is a legal sentinel for every leaf
        if value.is_null() {
            return Ok(value);
        }
        match &node.kind {
            NodeKind::String(_) => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(mismatch(&other)),
            },
            NodeKind::Number(n) => {
                let number = match &value {
                    Value::Number(x) => Some(x.clone()),
                    Value::String(s) => parse_number(s.trim()),
                    _ => None,
                };
                let Some(number) = number else {
                    return Err(mismatch(&value));
                };
                if n.integer {
                    integral(&number)
                        .map(Value::Number)
                        .ok_or_else(|| mismatch(&value))
                } else {
                    Ok(Value::Number(number))
                }
            }
            NodeKind::Boolean(_) => match value {
                Value::Bool(_) => Ok(value),
                Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(mismatch(&value)),
                },
                other => Err(mismatch(&other)),
            },
            NodeKind::Null(_) => Err(mismatch(&value)),
            NodeKind::Generic(_) => Ok(value),
            NodeKind::Array(_) | NodeKind::Object(_) | NodeKind::Combined(_) => {
                Err(mismatch(&value))
            }
        }
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.into());
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Integer form of `n`, if it has no fractional part.
fn integral(n: &Number) -> Option<Number> {
    if n.is_i64() || n.is_u64() {
        return Some(n.clone());
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(Number::from(f as i64))
    } else {
        None
    }
}

fn number_compliant(n: &NumberNode, value: &Value) -> bool {
    let Value::Number(number) = value else {
        return false;
    };
    if n.integer && integral(number).is_none() {
        return false;
    }
    let Some(x) = number.as_f64() else {
        return false;
    };
    let above_min = n
        .minimum
        .is_none_or(|m| if n.exclusive_minimum { x > m } else { x >= m });
    let below_max = n
        .maximum
        .is_none_or(|m| if n.exclusive_maximum { x < m } else { x <= m });
    above_min && below_max
}

fn string_compliant(s: &StringNode, format: Option<&str>, value: &str) -> bool {
    let len = value.chars().count() as u64;
    if s.min_length.is_some_and(|m| len < m) || s.max_length.is_some_and(|m| len > m) {
        return false;
    }
    if let Some(pattern) = &s.pattern {
        match regex::Regex::new(pattern) {
            Ok(re) if !re.is_match(value) => return false,
            Ok(_) => {}
            Err(e) => debug!(pattern = %pattern, error = %e, "ignoring unparsable pattern"),
        }
    }
    format.is_none_or(|f| format_compliant(f, value))
}

/// Checks the formats the value providers generate; unknown formats pass.
pub(crate) fn format_compliant(format: &str, value: &str) -> bool {
    match format {
        "date" => is_date(value),
        "date-time" => value
            .split_once(['T', 't'])
            .is_some_and(|(date, time)| is_date(date) && is_time(time)),
        "uuid" => is_uuid(value),
        "email" => value
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.')),
        "ipv4" => value.parse::<Ipv4Addr>().is_ok(),
        "ipv6" => value.parse::<Ipv6Addr>().is_ok(),
        "uri" | "url" => value.split_once("://").is_some_and(|(scheme, rest)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c))
                && !rest.is_empty()
        }),
        _ => true,
    }
}

fn is_date(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    let digits = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    if !(digits(year, 4) && digits(month, 2) && digits(day, 2)) {
        return false;
    }
    let month: u32 = month.parse().unwrap_or(0);
    let day: u32 = day.parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn is_time(value: &str) -> bool {
    let clock = value
        .trim_end_matches(['Z', 'z'])
        .split(['+', '-'])
        .next()
        .unwrap_or_default();
    let mut fields = clock.split(':');
    let (Some(h), Some(m), Some(s)) = (fields.next(), fields.next(), fields.next()) else {
        return false;
    };
    let seconds = s.split('.').next().unwrap_or_default();
    [h, m, seconds]
        .iter()
        .all(|f| f.len() == 2 && f.bytes().all(|b| b.is_ascii_digit()))
}

fn is_uuid(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, n)| g.len() == n && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, ParameterMeta};
    use serde_json::json;

    fn node(schema: Value) -> (ParameterArena, NodeId) {
        let mut arena = ParameterArena::new("GET /x");
        let id = arena
            .build_parameter("x", &schema, &ParameterMeta::new(Location::Query, "x"))
            .unwrap();
        (arena, id)
    }

    #[test]
    fn string_length_and_pattern() {
        let (arena, id) = node(json!({"type": "string", "minLength": 3, "maxLength": 5, "pattern": "^[a-z]+$"}));
        assert!(arena.is_value_compliant(id, &json!("abcd")));
        assert!(!arena.is_value_compliant(id, &json!("ab")));
        assert!(!arena.is_value_compliant(id, &json!("abcdef")));
        assert!(!arena.is_value_compliant(id, &json!("ab1d")));
        assert!(!arena.is_value_compliant(id, &json!(1234)));
    }

    #[test]
    fn number_range_respects_exclusivity() {
        let (arena, id) = node(json!({"type": "integer", "minimum": 10, "exclusiveMaximum": 20}));
        assert!(arena.is_value_compliant(id, &json!(10)));
        assert!(arena.is_value_compliant(id, &json!(19)));
        assert!(!arena.is_value_compliant(id, &json!(20)));
        assert!(!arena.is_value_compliant(id, &json!(12.5)));
    }

    #[test]
    fn enum_membership() {
        let (arena, id) = node(json!({"type": "string", "enum": ["on", "off"]}));
        assert!(arena.is_value_compliant(id, &json!("on")));
        assert!(!arena.is_value_compliant(id, &json!("dim")));
    }

    #[test]
    fn object_requires_required_properties() {
        let (arena, id) = node(json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}, "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 2}}
        }));
        assert!(arena.is_value_compliant(id, &json!({"id": 1})));
        assert!(!arena.is_value_compliant(id, &json!({"tags": []})));
        assert!(!arena.is_value_compliant(id, &json!({"id": 1, "tags": ["a", "b", "c"]})));
    }

    #[test]
    fn formats() {
        assert!(format_compliant("date", "2024-02-29"));
        assert!(!format_compliant("date", "2024-2-29"));
        assert!(format_compliant("date-time", "2024-02-29T10:11:12.5Z"));
        assert!(format_compliant("uuid", "123e4567-e89b-12d3-a456-426614174000"));
        assert!(format_compliant("ipv6", "::1"));
        assert!(!format_compliant("email", "nobody"));
        assert!(format_compliant("x-custom", "anything"));
    }

    #[test]
    fn coercion_casts_only_safe_values() {
        let (arena, id) = node(json!({"type": "integer"}));
        assert_eq!(arena.coerce_value(id, json!("42")).unwrap(), json!(42));
        assert_eq!(arena.coerce_value(id, json!(7.0)).unwrap(), json!(7));
        assert!(matches!(
            arena.coerce_value(id, json!("forty")),
            Err(CoreError::TypeMismatch { .. })
        ));

        let (arena, id) = node(json!({"type": "string"}));
        assert_eq!(arena.coerce_value(id, json!(true)).unwrap(), json!("true"));
        assert!(arena.coerce_value(id, json!({"a": 1})).is_err());

        let (arena, id) = node(json!({"type": "boolean"}));
        assert_eq!(arena.coerce_value(id, json!("False")).unwrap(), json!(false));
    }

    #[test]
    fn type_compliance_is_coarse() {
        let (arena, id) = node(json!({"type": "integer", "maximum": 1}));
        assert!(arena.is_object_type_compliant(id, &json!(500)));
        assert!(!arena.is_value_compliant(id, &json!(500)));
        assert!(!arena.is_object_type_compliant(id, &json!("500")));
    }
}
