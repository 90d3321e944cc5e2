use serde_json::Value;

use crate::error::CoreError;
use crate::model::{NodeId, NodeKind, ParameterArena};
use crate::provider::PatternGenerator;
use crate::sequence::TestInteraction;

use super::{MutationContext, Mutator, MutatorKind, refresh_input, target_leaf};

/// Assigns a string that does not match the declared pattern.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmatchedRegex;

impl Mutator for UnmatchedRegex {
    fn kind(&self) -> MutatorKind {
        MutatorKind::UnmatchedRegex
    }

    fn is_parameter_mutable(&self, arena: &ParameterArena, leaf: NodeId) -> bool {
        arena
            .get(leaf)
            .is_some_and(|n| matches!(&n.kind, NodeKind::String(s) if s.pattern.is_some()))
    }

    fn mutate(
        &self,
        interaction: &mut TestInteraction,
        input: usize,
        ctx: &mut MutationContext<'_>,
    ) -> Result<String, CoreError> {
        let leaf = target_leaf(self, interaction, input)?;
        let node = &interaction.instance.arena()[leaf];
        let name = node.name.clone();
        let pattern = match &node.kind {
            NodeKind::String(s) => s.pattern.clone().unwrap_or_default(),
            _ => String::new(),
        };
        let not_applicable = |reason: String| CoreError::not_applicable(self.kind().name(), &name, reason);

        let generator = PatternGenerator::compile(&pattern).map_err(|e| not_applicable(e.to_string()))?;
        let value = generator
            .generate_mismatch(ctx.rng)
            .ok_or_else(|| not_applicable(format!("no string found outside /{pattern}/")))?;

        interaction
            .instance
            .arena_mut()
            .set_value(leaf, Value::String(value.clone()))?;
        refresh_input(interaction, input, leaf);
        Ok(format!("set '{name}' to {value:?}, which does not match /{pattern}/"))
    }
}
