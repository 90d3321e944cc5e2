use rand::Rng;

use crate::error::CoreError;
use crate::model::{LeafNode, NodeId, NodeKind, NumberNode, ParameterArena, StringNode};
use crate::provider::random_leaf_value;
use crate::sequence::TestInteraction;

use super::{MutationContext, Mutator, MutatorKind, refresh_input, target_leaf};

/// Swaps a scalar parameter for one of another scalar type.
#[derive(Debug, Default, Clone, Copy)]
pub struct WrongType;

fn string_kind() -> NodeKind {
    NodeKind::String(StringNode::default())
}

fn number_kind() -> NodeKind {
    NodeKind::Number(NumberNode::default())
}

fn boolean_kind() -> NodeKind {
    NodeKind::Boolean(LeafNode::default())
}

impl Mutator for WrongType {
    fn kind(&self) -> MutatorKind {
        MutatorKind::WrongType
    }

    fn is_parameter_mutable(&self, arena: &ParameterArena, leaf: NodeId) -> bool {
        arena.get(leaf).is_some_and(|n| {
            matches!(
                n.kind,
                NodeKind::String(_) | NodeKind::Number(_) | NodeKind::Boolean(_)
            )
        })
    }

    fn mutate(
        &self,
        interaction: &mut TestInteraction,
        input: usize,
        ctx: &mut MutationContext<'_>,
    ) -> Result<String, CoreError> {
        let leaf = target_leaf(self, interaction, input)?;
        let original = interaction.instance.arena()[leaf].clone();
        let alternatives = match original.kind {
            NodeKind::String(_) => [number_kind(), boolean_kind()],
            NodeKind::Number(_) => [string_kind(), boolean_kind()],
            _ => [string_kind(), number_kind()],
        };
        let [first, second] = alternatives;
        let kind = if ctx.rng.gen_bool(0.5) { first } else { second };

        let arena = interaction.instance.arena_mut();
        let replacement = arena.alloc(original.with_kind(kind))?;
        let value = ctx
            .chain
            .provide_value_for(arena, replacement, ctx.dictionary, ctx.rng)
            .map(|(value, _)| value)
            .or_else(|| random_leaf_value(arena, replacement, ctx.dictionary, ctx.rng))
            .ok_or_else(|| {
                CoreError::not_applicable(self.kind().name(), &original.name, "no value of the new type")
            })?;
        arena.set_value(replacement, value.clone())?;
        interaction.instance.replace_node(leaf, replacement)?;
        refresh_input(interaction, input, replacement);

        Ok(format!(
            "replaced {} parameter '{}' with {} value {value}",
            original.parameter_type(),
            original.name,
            interaction.instance.arena()[replacement].parameter_type()
        ))
    }
}
