use rand::Rng;
use tracing::{debug, info, warn};

use crate::mutation::{MutatorKind, next_mutation_pool};
use crate::sequence::{InteractionExecutor, TestInteraction, TestSequence};

use super::{GenerationContext, GenerationError};

#[derive(Debug, Default)]
pub struct ErrorRun {
    /// Executed mutants, each with its outcome.
    pub mutants: Vec<TestInteraction>,
    /// Mutations that could not be applied.
    pub skipped: usize,
}

impl ErrorRun {
    /// Mutants the oracle accepted (the server rejected the invalid request).
    #[must_use]
    pub fn passed(&self) -> usize {
        self.mutants.iter().filter(|m| m.passed()).count()
    }
}

/// Derives error tests from successful nominal interactions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorGenerator;

impl ErrorGenerator {
    /// Up to `number_of_mutants` mutants per interaction of `sequence`.
    ///
    /// # Errors
    ///
    /// [`GenerationError::Execution`] when the executor itself fails.
    pub fn run<E: InteractionExecutor + ?Sized>(
        &self,
        ctx: &mut GenerationContext,
        sequence: &TestSequence,
        executor: &mut E,
    ) -> Result<ErrorRun, GenerationError> {
        let budget = ctx.config.number_of_mutants;
        let mut run = ErrorRun::default();
        if budget == 0 {
            return Ok(run);
        }

        for interaction in sequence {
            let mut pool = next_mutation_pool(interaction, &MutatorKind::ALL);
            for _ in 0..budget {
                if pool.is_empty() {
                    pool = next_mutation_pool(interaction, &MutatorKind::REPLENISH);
                    if pool.is_empty() {
                        debug!(operation = %interaction.label(), "nothing left to mutate");
                        break;
                    }
                }
                let pick = ctx.rng().gen_range(0..pool.len());
                let target = pool.swap_remove(pick);

                let mut mutant = match ctx.mutate(interaction, target) {
                    Ok(mutant) => mutant,
                    Err(e) if e.is_recoverable() => {
                        debug!(operation = %interaction.label(), error = %e, "mutation skipped");
                        run.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(operation = %interaction.label(), error = %e, "aborting mutation of operation");
                        run.skipped += 1;
                        break;
                    }
                };
                let outcome = executor
                    .execute(&mutant)
                    .map_err(GenerationError::execution)?;
                debug!(
                    operation = %mutant.label(),
                    mutation = mutant.mutation.as_deref().unwrap_or_default(),
                    passed = outcome.passed,
                    "error attempt"
                );
                mutant.outcome = Some(outcome);
                run.mutants.push(mutant);
            }
        }
        info!(
            mutants = run.mutants.len(),
            passed = run.passed(),
            skipped = run.skipped,
            "error generation finished"
        );
        Ok(run)
    }
}
