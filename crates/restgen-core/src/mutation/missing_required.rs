use crate::error::CoreError;
use crate::model::{NodeId, ParameterArena};
use crate::sequence::TestInteraction;

use super::{MutationContext, Mutator, MutatorKind, target_leaf};

/// Omits a required parameter from the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingRequired;

impl Mutator for MissingRequired {
    fn kind(&self) -> MutatorKind {
        MutatorKind::MissingRequired
    }

    fn is_parameter_mutable(&self, arena: &ParameterArena, leaf: NodeId) -> bool {
        arena.get(leaf).is_some_and(|n| n.required)
    }

    fn mutate(
        &self,
        interaction: &mut TestInteraction,
        input: usize,
        _ctx: &mut MutationContext<'_>,
    ) -> Result<String, CoreError> {
        let leaf = target_leaf(self, interaction, input)?;
        let node = &interaction.instance.arena()[leaf];
        let description = format!(
            "removed required {} parameter '{}'",
            node.location, node.name
        );
        if !interaction.instance.remove_node(leaf)? {
            return Err(CoreError::not_applicable(
                self.kind().name(),
                &interaction.inputs[input].parameter_name,
                "parameter is not part of the request",
            ));
        }
        interaction.inputs.remove(input);
        Ok(description)
    }
}
