use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::{NodeId, NodeKind, NumberNode, ParameterArena, ParameterNode, StringNode};
use crate::provider::random::random_char;
use crate::sequence::TestInteraction;

use super::{MutationContext, Mutator, MutatorKind, refresh_input, target_leaf};

/// Resampling budget for values outside an enum.
const ENUM_ATTEMPTS: usize = 32;

/// Largest overshoot past `maxLength`.
const LENGTH_OVERSHOOT: usize = 8;

/// Largest distance from a violated numeric bound.
const RANGE_OVERSHOOT: i64 = 100;

/// Assigns a value outside the declared enum, length or range.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstraintViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    Enum,
    Length,
    Range,
}

/// Constraints a value of `node` can be pushed outside of.
fn violations(node: &ParameterNode) -> Vec<Violation> {
    let mut found = Vec::new();
    if enum_has_outside(node) {
        found.push(Violation::Enum);
    }
    match &node.kind {
        NodeKind::String(s) if s.min_length.is_some_and(|m| m > 0) || s.max_length.is_some() => {
            found.push(Violation::Length);
        }
        NodeKind::Number(n) if n.minimum.is_some() || n.maximum.is_some() => {
            found.push(Violation::Range);
        }
        _ => {}
    }
    found
}

/// Whether some value of the node's kind lies outside its declared enum.
fn enum_has_outside(node: &ParameterNode) -> bool {
    let declared = &node.enum_values;
    if declared.is_empty() {
        return false;
    }
    match &node.kind {
        NodeKind::String(_) | NodeKind::Generic(_) | NodeKind::Number(_) => true,
        NodeKind::Boolean(_) => {
            !(declared.contains(&Value::Bool(true)) && declared.contains(&Value::Bool(false)))
        }
        _ => false,
    }
}

impl Mutator for ConstraintViolation {
    fn kind(&self) -> MutatorKind {
        MutatorKind::ConstraintViolation
    }

    fn is_parameter_mutable(&self, arena: &ParameterArena, leaf: NodeId) -> bool {
        arena
            .get(leaf)
            .is_some_and(|n| n.is_leaf() && !violations(n).is_empty())
    }

    fn mutate(
        &self,
        interaction: &mut TestInteraction,
        input: usize,
        ctx: &mut MutationContext<'_>,
    ) -> Result<String, CoreError> {
        let leaf = target_leaf(self, interaction, input)?;
        let node = interaction.instance.arena()[leaf].clone();
        let mut candidates = violations(&node);
        candidates.shuffle(ctx.rng);

        for violation in candidates {
            let outcome = match (violation, &node.kind) {
                (Violation::Enum, _) => outside_enum(&node, ctx.rng)
                    .map(|v| (v, "a value outside the declared enum".to_string())),
                (Violation::Length, NodeKind::String(s)) => {
                    outside_length(&node, s, ctx.rng).map(|(v, len)| {
                        (v, format!("a string of length {len} outside {}", length_range(s)))
                    })
                }
                (Violation::Range, NodeKind::Number(n)) => outside_range(n, ctx.rng)
                    .map(|v| (v, format!("a number outside {}", numeric_range(n)))),
                _ => None,
            };
            let Some((value, what)) = outcome else {
                continue;
            };
            interaction.instance.arena_mut().set_value(leaf, value.clone())?;
            refresh_input(interaction, input, leaf);
            return Ok(format!("set '{}' to {value}, {what}", node.name));
        }
        Err(CoreError::not_applicable(
            self.kind().name(),
            &node.name,
            "no declared constraint can be violated",
        ))
    }
}

/// A value of the node's type not among its enum values.
fn outside_enum(node: &ParameterNode, rng: &mut dyn RngCore) -> Option<Value> {
    let declared = &node.enum_values;
    let fresh = |rng: &mut dyn RngCore| -> Option<Value> {
        Some(match &node.kind {
            NodeKind::String(_) | NodeKind::Generic(_) => {
                let len = rng.gen_range(1..=12);
                Value::String((0..len).map(|_| random_char(rng)).collect())
            }
            NodeKind::Number(n) if n.integer => json!(rng.gen_range(-1_000_000_i64..=1_000_000)),
            NodeKind::Number(_) => json!(rng.gen_range(-1_000_000.0..=1_000_000.0_f64)),
            NodeKind::Boolean(_) => Value::Bool(rng.gen_bool(0.5)),
            _ => return None,
        })
    };
    (0..ENUM_ATTEMPTS).find_map(|_| fresh(&mut *rng).filter(|v| !declared.contains(v)))
}

/// Current value padded or truncated to a length outside the bounds.
fn outside_length(
    node: &ParameterNode,
    s: &StringNode,
    rng: &mut dyn RngCore,
) -> Option<(Value, usize)> {
    let mut sides = Vec::new();
    if let Some(min) = s.min_length.filter(|m| *m > 0) {
        sides.push(0..usize::try_from(min).ok()?);
    }
    if let Some(max) = s.max_length {
        let above = usize::try_from(max).ok()?.checked_add(1)?;
        sides.push(above..above + LENGTH_OVERSHOOT);
    }
    let range = sides.choose(rng)?.clone();
    let target = rng.gen_range(range);

    let current = node.value().and_then(Value::as_str).unwrap_or_default();
    let mut chars: Vec<char> = current.chars().take(target).collect();
    while chars.len() < target {
        chars.push(random_char(rng));
    }
    Some((Value::String(chars.into_iter().collect()), target))
}

/// A number beyond one of the declared bounds.
fn outside_range(n: &NumberNode, rng: &mut dyn RngCore) -> Option<Value> {
    let mut sides = Vec::new();
    if let Some(min) = n.minimum {
        sides.push((min, n.exclusive_minimum, -1.0));
    }
    if let Some(max) = n.maximum {
        sides.push((max, n.exclusive_maximum, 1.0));
    }
    let &(bound, exclusive, direction) = sides.choose(rng)?;

    if n.integer {
        #[allow(clippy::cast_possible_truncation)]
        let edge = (if direction < 0.0 { bound.ceil() } else { bound.floor() }) as i64;
        let distance = rng.gen_range(0..RANGE_OVERSHOOT);
        // the bound itself violates an exclusive bound
        let step = if exclusive && bound.fract() == 0.0 {
            distance
        } else {
            distance + 1
        };
        let value = if direction < 0.0 {
            edge.checked_sub(step)?
        } else {
            edge.checked_add(step)?
        };
        return Some(json!(value));
    }

    let distance = rng.gen_range(1.0..100.0_f64);
    let value = if exclusive && rng.gen_bool(0.5) {
        bound
    } else {
        bound + direction * distance * bound.abs().max(1.0)
    };
    let violates = if direction < 0.0 {
        value < bound || (exclusive && value <= bound)
    } else {
        value > bound || (exclusive && value >= bound)
    };
    if !violates || !value.is_finite() {
        return None;
    }
    serde_json::Number::from_f64(value).map(Value::Number)
}

fn length_range(s: &StringNode) -> String {
    format!(
        "[{}, {}]",
        s.min_length.map_or_else(|| "0".to_string(), |v| v.to_string()),
        s.max_length.map_or_else(|| "inf".to_string(), |v| v.to_string())
    )
}

fn numeric_range(n: &NumberNode) -> String {
    let lower = n
        .minimum
        .map_or_else(|| "(-inf".to_string(), |m| {
            format!("{}{m}", if n.exclusive_minimum { "(" } else { "[" })
        });
    let upper = n
        .maximum
        .map_or_else(|| "inf)".to_string(), |m| {
            format!("{m}{}", if n.exclusive_maximum { ")" } else { "]" })
        });
    format!("{lower}, {upper}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::mutation::test_support::interaction;
    use crate::provider::ProviderChain;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn mutate_q(schema: Value, value: Value, seed: u64) -> (TestInteraction, String) {
        let mut target = interaction(schema, true, value);
        let chain = ProviderChain::default();
        let dictionary = Dictionary::new();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut ctx = MutationContext {
            chain: &chain,
            dictionary: &dictionary,
            rng: &mut rng,
        };
        let description = ConstraintViolation.mutate(&mut target, 0, &mut ctx).unwrap();
        (target, description)
    }

    fn q_leaf(target: &TestInteraction) -> NodeId {
        target.instance.parameters()[0]
    }

    #[test]
    fn string_length_leaves_the_bounds() {
        for seed in 0..20 {
            let (target, _) = mutate_q(
                json!({"type": "string", "minLength": 3, "maxLength": 5}),
                json!("abcd"),
                seed,
            );
            let leaf = q_leaf(&target);
            let value = target.instance.arena().value(leaf).unwrap().clone();
            let len = value.as_str().unwrap().chars().count();
            assert!(!(3..=5).contains(&len), "length {len}");
            assert!(!target.instance.arena().is_value_compliant(leaf, &value));
            assert_eq!(target.inputs[0].value, value);
        }
    }

    #[test]
    fn number_range_is_violated() {
        for seed in 0..20 {
            let (target, _) = mutate_q(
                json!({"type": "integer", "minimum": 10, "exclusiveMaximum": 20}),
                json!(15),
                seed,
            );
            let leaf = q_leaf(&target);
            let value = target.instance.arena().value(leaf).unwrap().clone();
            assert!(!target.instance.arena().is_value_compliant(leaf, &value), "{value}");
        }
    }

    #[test]
    fn enum_value_is_replaced_by_an_undeclared_one() {
        let (target, description) = mutate_q(
            json!({"type": "string", "enum": ["red", "green"]}),
            json!("red"),
            3,
        );
        let leaf = q_leaf(&target);
        let value = target.instance.arena().value(leaf).unwrap();
        assert!(value != &json!("red") && value != &json!("green"));
        assert!(description.contains("outside the declared enum"));
    }

    #[test]
    fn unconstrained_parameters_are_not_mutable() {
        let target = interaction(json!({"type": "string"}), true, json!("x"));
        assert!(!ConstraintViolation.is_parameter_mutable(target.instance.arena(), q_leaf(&target)));
        let bounded = interaction(json!({"type": "integer", "maximum": 4}), true, json!(1));
        assert!(ConstraintViolation.is_parameter_mutable(bounded.instance.arena(), q_leaf(&bounded)));
    }

    #[test]
    fn zero_min_length_alone_is_not_mutable() {
        let target = interaction(json!({"type": "string", "minLength": 0}), true, json!("x"));
        assert!(!ConstraintViolation.is_parameter_mutable(target.instance.arena(), q_leaf(&target)));

        let capped = interaction(json!({"type": "string", "minLength": 0, "maxLength": 2}), true, json!("x"));
        assert!(ConstraintViolation.is_parameter_mutable(capped.instance.arena(), q_leaf(&capped)));
    }

    #[test]
    fn exhaustive_boolean_enum_is_not_mutable() {
        let both = interaction(json!({"type": "boolean", "enum": [true, false]}), true, json!(true));
        assert!(!ConstraintViolation.is_parameter_mutable(both.instance.arena(), q_leaf(&both)));

        let (target, _) = mutate_q(json!({"type": "boolean", "enum": [true]}), json!(true), 5);
        let value = target.instance.arena().value(q_leaf(&target)).unwrap();
        assert_eq!(value, &json!(false));
    }

    #[test]
    fn mutable_parameters_can_always_be_mutated() {
        let cases = [
            (json!({"type": "string", "minLength": 0}), json!("x")),
            (json!({"type": "string", "maxLength": 3}), json!("abc")),
            (json!({"type": "string", "enum": ["a"]}), json!("a")),
            (json!({"type": "boolean", "enum": [true, false]}), json!(true)),
            (json!({"type": "boolean", "enum": [false]}), json!(false)),
            (json!({"type": "number", "minimum": 0.5}), json!(1.5)),
            (json!({"type": "integer", "enum": [1, 2]}), json!(1)),
        ];
        for (schema, value) in cases {
            let target = interaction(schema.clone(), true, value);
            if !ConstraintViolation.is_parameter_mutable(target.instance.arena(), q_leaf(&target)) {
                continue;
            }
            for seed in 0..10 {
                let mut copy = target.clone();
                let chain = ProviderChain::default();
                let dictionary = Dictionary::new();
                let mut rng = SmallRng::seed_from_u64(seed);
                let mut ctx = MutationContext {
                    chain: &chain,
                    dictionary: &dictionary,
                    rng: &mut rng,
                };
                assert!(ConstraintViolation.mutate(&mut copy, 0, &mut ctx).is_ok(), "{schema}");
            }
        }
    }
}
