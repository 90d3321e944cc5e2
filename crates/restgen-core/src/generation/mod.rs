//! Generation control loop
//!
//! [`NominalGenerator`] walks the dependency graph and produces valid
//! requests, feeding observed values back into the dictionary.
//! [`ErrorGenerator`] then mutates the successful interactions.
//! Both share one [`GenerationContext`] per run.

mod mutants;
mod nominal;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::dictionary::{Dictionary, DictionaryEntry, SourceLeaf};
use crate::error::CoreError;
use crate::model::{Location, ParameterType};
use crate::mutation::{self, MutationContext, MutationTarget};
use crate::normalize::{NameScope, normalized_in_scope};
use crate::operation::OperationInstance;
use crate::provider::{AuthenticationSource, FillOptions, Filler, ProviderChain, StaticAuthentication};
use crate::sequence::TestInteraction;

pub use mutants::{ErrorGenerator, ErrorRun};
pub use nominal::{NominalGenerator, NominalRun, Termination};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The execution collaborator failed; generation cannot continue.
    #[error("execution failed: {0}")]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GenerationError {
    pub(crate) fn execution(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Execution(Box::new(e))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    /// Every attempt of the last pass that reached it failed.
    Exhausted,
}

/// Per-operation bookkeeping of nominal generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OperationState {
    pub operation: String,
    pub status: OperationStatus,
    /// Executed attempts over all passes.
    pub attempts: u32,
}

impl OperationState {
    #[must_use]
    pub fn pending(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            status: OperationStatus::Pending,
            attempts: 0,
        }
    }
}

/// Run-scoped state shared by both generation phases.
pub struct GenerationContext {
    pub dictionary: Dictionary,
    pub config: GenerationConfig,
    pub chain: ProviderChain,
    pub authentication: Box<dyn AuthenticationSource>,
    rng: SmallRng,
}

impl GenerationContext {
    /// Context with an empty dictionary, seeded from `config.seed` when present.
    #[must_use]
    pub fn new(config: GenerationConfig, authentication: Box<dyn AuthenticationSource>) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        Self {
            dictionary: Dictionary::new(),
            config,
            chain: ProviderChain::default(),
            authentication,
            rng,
        }
    }

    /// Context without authentication parameters.
    #[must_use]
    pub fn unauthenticated(config: GenerationConfig) -> Self {
        Self::new(config, Box::new(StaticAuthentication::default()))
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Fill the parameters of `instance`.
    ///
    /// # Errors
    ///
    /// Programming errors only, see [`Filler::fill_instance`].
    pub fn fill(&mut self, instance: &mut OperationInstance) -> Result<(), CoreError> {
        let filler = Filler {
            chain: &self.chain,
            dictionary: &self.dictionary,
            authentication: self.authentication.as_ref(),
            options: FillOptions::from(&self.config),
        };
        filler.fill_instance(instance, &mut self.rng)
    }

    /// Apply one mutation to a copy of `interaction`.
    ///
    /// # Errors
    ///
    /// See [`mutation::apply`].
    pub fn mutate(
        &mut self,
        interaction: &TestInteraction,
        target: MutationTarget,
    ) -> Result<TestInteraction, CoreError> {
        let mut ctx = MutationContext {
            chain: &self.chain,
            dictionary: &self.dictionary,
            rng: &mut self.rng,
        };
        mutation::apply(interaction, target, &mut ctx)
    }

    /// Fold the inputs and observed outputs of a successful interaction into
    /// the dictionary. Returns the number of new entries.
    pub fn harvest(&mut self, interaction: &TestInteraction) -> usize {
        let operation = interaction.operation();
        let spec = operation.spec();
        let observed = interaction
            .outcome
            .iter()
            .flat_map(|o| &o.observed)
            .map(|o| {
                let scope = NameScope {
                    path: &spec.path,
                    operation_id: spec.operation_id.as_deref(),
                    location: Some(Location::ResponseBody),
                    enclosing: o.enclosing.as_deref(),
                };
                DictionaryEntry::new(
                    o.field.clone(),
                    normalized_in_scope(&o.field, &scope),
                    ParameterType::of_value(&o.value),
                    o.value.clone(),
                )
                .with_source(SourceLeaf {
                    operation: operation.label().to_string(),
                    node: None,
                    location: Location::ResponseBody,
                })
            });
        let mut added = 0;
        for entry in interaction.inputs.iter().cloned().chain(observed) {
            if self.dictionary.add_entry(entry) {
                added += 1;
            }
        }
        debug!(operation = %operation.label(), added, total = self.dictionary.len(), "dictionary updated");
        added
    }
}
