//! Mutation of nominal interactions into error tests
//!
//! A mutator rewrites one recorded input of an interaction so that the
//! request violates exactly one declared constraint. The error phase picks
//! `(input, mutator)` pairs from a pool computed by [`next_mutation_pool`].

mod constraint_violation;
mod missing_required;
mod unmatched_regex;
mod wrong_type;

use rand::RngCore;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::{Dictionary, DictionaryEntry};
use crate::error::CoreError;
use crate::model::{NodeId, ParameterArena};
use crate::provider::ProviderChain;
use crate::sequence::TestInteraction;

pub use constraint_violation::ConstraintViolation;
pub use missing_required::MissingRequired;
pub use unmatched_regex::UnmatchedRegex;
pub use wrong_type::WrongType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MutatorKind {
    MissingRequired,
    WrongType,
    ConstraintViolation,
    UnmatchedRegex,
}

impl MutatorKind {
    pub const ALL: [Self; 4] = [
        Self::MissingRequired,
        Self::WrongType,
        Self::ConstraintViolation,
        Self::UnmatchedRegex,
    ];

    /// Mutators used once the first pool is exhausted. Omission always
    /// yields the same request, so it is not repeated.
    pub const REPLENISH: [Self; 3] = [
        Self::WrongType,
        Self::ConstraintViolation,
        Self::UnmatchedRegex,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MissingRequired => "missing_required",
            Self::WrongType => "wrong_type",
            Self::ConstraintViolation => "constraint_violation",
            Self::UnmatchedRegex => "unmatched_regex",
        }
    }

    #[must_use]
    pub fn mutator(self) -> &'static dyn Mutator {
        match self {
            Self::MissingRequired => &MissingRequired,
            Self::WrongType => &WrongType,
            Self::ConstraintViolation => &ConstraintViolation,
            Self::UnmatchedRegex => &UnmatchedRegex,
        }
    }
}

impl std::fmt::Display for MutatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Collaborators a mutator may draw fresh values from.
pub struct MutationContext<'a> {
    pub chain: &'a ProviderChain,
    pub dictionary: &'a Dictionary,
    pub rng: &'a mut dyn RngCore,
}

pub trait Mutator {
    fn kind(&self) -> MutatorKind;

    fn is_parameter_mutable(&self, arena: &ParameterArena, leaf: NodeId) -> bool;

    /// Rewrite input `input` of `interaction` in place and describe the change.
    ///
    /// # Errors
    ///
    /// [`CoreError::MutationNotApplicable`] when the input cannot be mutated
    /// by this mutator; arena errors are propagated.
    fn mutate(
        &self,
        interaction: &mut TestInteraction,
        input: usize,
        ctx: &mut MutationContext<'_>,
    ) -> Result<String, CoreError>;
}

/// One candidate mutation: which recorded input, which mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTarget {
    pub input: usize,
    pub node: NodeId,
    pub mutator: MutatorKind,
}

/// Every applicable `(input, mutator)` pair of `interaction`.
#[must_use]
pub fn next_mutation_pool(
    interaction: &TestInteraction,
    mutators: &[MutatorKind],
) -> Vec<MutationTarget> {
    let arena = interaction.instance.arena();
    interaction
        .inputs
        .iter()
        .enumerate()
        .filter_map(|(input, entry)| Some((input, entry.source.as_ref()?.node?)))
        .flat_map(|(input, node)| {
            mutators
                .iter()
                .filter(move |kind| kind.mutator().is_parameter_mutable(arena, node))
                .map(move |&mutator| MutationTarget {
                    input,
                    node,
                    mutator,
                })
        })
        .collect()
}

/// Apply `target` to a copy of `interaction`.
///
/// # Errors
///
/// See [`Mutator::mutate`].
pub fn apply(
    interaction: &TestInteraction,
    target: MutationTarget,
    ctx: &mut MutationContext<'_>,
) -> Result<TestInteraction, CoreError> {
    let mut mutant = interaction.mutant();
    let description = target.mutator.mutator().mutate(&mut mutant, target.input, ctx)?;
    debug!(operation = %interaction.label(), mutator = %target.mutator, %description, "mutant created");
    mutant.tags.insert(target.mutator.name().to_string());
    mutant.mutation = Some(description);
    Ok(mutant)
}

/// Leaf behind input `input`, if `mutator` may touch it.
fn target_leaf(
    mutator: &dyn Mutator,
    interaction: &TestInteraction,
    input: usize,
) -> Result<NodeId, CoreError> {
    let name = mutator.kind().name();
    let entry = interaction
        .inputs
        .get(input)
        .ok_or_else(|| CoreError::not_applicable(name, format!("#{input}"), "no such input"))?;
    let leaf = entry
        .source
        .as_ref()
        .and_then(|s| s.node)
        .ok_or_else(|| {
            CoreError::not_applicable(name, &entry.parameter_name, "input has no source leaf")
        })?;
    if !mutator.is_parameter_mutable(interaction.instance.arena(), leaf) {
        return Err(CoreError::not_applicable(
            name,
            &entry.parameter_name,
            "parameter is not eligible",
        ));
    }
    Ok(leaf)
}

/// Refresh input `input` from the current value of `leaf`.
fn refresh_input(interaction: &mut TestInteraction, input: usize, leaf: NodeId) {
    if let Some(entry) = DictionaryEntry::from_leaf(interaction.instance.arena(), leaf) {
        if let Some(slot) = interaction.inputs.get_mut(input) {
            *slot = entry;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use crate::model::Location;
    use crate::operation::{HttpMethod, Operation, OperationSpec, ParameterSpec};
    use crate::sequence::TestInteraction;

    /// `GET /items` with one query parameter `q` of the given schema, set to `value`.
    pub(crate) fn interaction(schema: Value, required: bool, value: Value) -> TestInteraction {
        let mut spec = OperationSpec::new(HttpMethod::Get, "/items");
        spec.parameters.push(ParameterSpec {
            name: "q".into(),
            location: Location::Query,
            style: None,
            explode: None,
            required,
            schema,
        });
        spec.parameters.push(ParameterSpec {
            name: "page".into(),
            location: Location::Query,
            style: None,
            explode: None,
            required: false,
            schema: json!({"type": "integer"}),
        });
        let operation = Arc::new(Operation::from_spec(spec));
        let mut instance = operation.instantiate();
        let leaves = instance.leaves();
        instance.arena_mut().set_value(leaves[0], value).unwrap();
        instance.arena_mut().set_value(leaves[1], json!(1)).unwrap();
        TestInteraction::new(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    #[test]
    fn pool_pairs_inputs_with_applicable_mutators() {
        let interaction = test_support::interaction(
            json!({"type": "string", "minLength": 2, "pattern": "^[a-z]+$"}),
            true,
            json!("abc"),
        );
        let pool = next_mutation_pool(&interaction, &MutatorKind::ALL);
        let for_q: Vec<MutatorKind> = pool
            .iter()
            .filter(|t| t.input == 0)
            .map(|t| t.mutator)
            .collect();
        assert_eq!(for_q, MutatorKind::ALL);
        // optional unconstrained integer: only a type change applies
        let for_page: Vec<MutatorKind> = pool
            .iter()
            .filter(|t| t.input == 1)
            .map(|t| t.mutator)
            .collect();
        assert_eq!(for_page, [MutatorKind::WrongType]);

        let replenished = next_mutation_pool(&interaction, &MutatorKind::REPLENISH);
        assert!(replenished.iter().all(|t| t.mutator != MutatorKind::MissingRequired));
    }

    #[test]
    fn apply_works_on_a_copy() {
        let interaction = test_support::interaction(json!({"type": "string"}), true, json!("abc"));
        let chain = ProviderChain::default();
        let dictionary = Dictionary::new();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ctx = MutationContext {
            chain: &chain,
            dictionary: &dictionary,
            rng: &mut rng,
        };
        let target = next_mutation_pool(&interaction, &[MutatorKind::MissingRequired])[0];
        let mutant = apply(&interaction, target, &mut ctx).unwrap();

        assert!(mutant.is_mutated());
        assert!(mutant.tags.contains("missing_required"));
        assert!(mutant.mutation.as_deref().unwrap().contains("'q'"));
        assert_eq!(mutant.inputs.len(), 1);
        assert_eq!(interaction.inputs.len(), 2);
        assert_eq!(interaction.instance.parameters().len(), 2);
    }

    #[test]
    fn ineligible_targets_are_rejected() {
        let interaction = test_support::interaction(json!({"type": "string"}), false, json!("abc"));
        let chain = ProviderChain::default();
        let dictionary = Dictionary::new();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ctx = MutationContext {
            chain: &chain,
            dictionary: &dictionary,
            rng: &mut rng,
        };
        let target = MutationTarget {
            input: 0,
            node: interaction.inputs[0].source.as_ref().unwrap().node.unwrap(),
            mutator: MutatorKind::UnmatchedRegex,
        };
        assert!(matches!(
            apply(&interaction, target, &mut ctx),
            Err(CoreError::MutationNotApplicable { .. })
        ));
    }
}
