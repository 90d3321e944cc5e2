//! Serializable generation report
//!
//! A [`GenerationReport`] is a self-contained snapshot of one run: it owns no
//! arena and can be written as JSON or checked against [`generate_schema`].

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dictionary::DictionaryEntry;
use crate::generation::{ErrorRun, NominalRun, OperationState, OperationStatus, Termination};
use crate::graph::{Dependency, DependencyGraph};
use crate::model::{Location, ParameterType};
use crate::render::{RenderedRequest, masked_header};
use crate::sequence::{ExecutionOutcome, TestInteraction};

/// Top-level report of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationReport {
    /// Version of the generator that produced the report.
    pub version: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub summary: ReportSummary,
    pub operations: Vec<OperationState>,
    pub dependencies: Vec<Dependency>,
    /// Successful nominal interactions, in execution order.
    pub nominal: Vec<InteractionRecord>,
    #[serde(default)]
    pub mutants: Vec<InteractionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportSummary {
    pub total_operations: usize,
    pub covered_operations: usize,
    /// Covered over total, 0 when there is nothing to cover.
    pub coverage: f64,
    pub termination: Termination,
    pub passes: u32,
    /// Nominal attempts, successful or not.
    pub attempts: usize,
    pub mutants: usize,
    /// Mutants the server rejected as expected.
    pub mutants_rejected: usize,
    pub mutants_skipped: usize,
}

/// One executed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InteractionRecord {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub request: RenderedRequest,
    pub inputs: Vec<InputRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputRecord {
    pub name: String,
    pub normalized_name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub value: Value,
}

impl From<&DictionaryEntry> for InputRecord {
    fn from(entry: &DictionaryEntry) -> Self {
        Self {
            name: entry.parameter_name.clone(),
            normalized_name: entry.normalized_name.clone(),
            parameter_type: entry.parameter_type,
            location: entry.source.as_ref().map(|s| s.location),
            value: entry.value.clone(),
        }
    }
}

impl InteractionRecord {
    /// Snapshot of `interaction`; sensitive headers are masked when `mask` is set.
    #[must_use]
    pub fn capture(interaction: &TestInteraction, mask: bool) -> Self {
        let mut request = RenderedRequest::from_instance(&interaction.instance);
        if mask {
            for (name, value) in &mut request.headers {
                *value = masked_header(name, value);
            }
            for (_, value) in &mut request.cookies {
                *value = masked_header("cookie", value);
            }
        }
        Self {
            operation: interaction.label().to_string(),
            mutation: interaction.mutation.clone(),
            tags: interaction.tags.clone(),
            request,
            inputs: interaction.inputs.iter().map(InputRecord::from).collect(),
            outcome: interaction.outcome.clone(),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.passed)
    }
}

impl GenerationReport {
    /// Assemble the report of a run; `errors` is absent when error
    /// generation was skipped.
    #[must_use]
    pub fn new(
        graph: &DependencyGraph,
        nominal: &NominalRun,
        errors: Option<&ErrorRun>,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let sequence = &nominal.sequence;
        let elapsed = chrono::Utc::now()
            .signed_duration_since(started_at)
            .num_milliseconds();
        let mutants: Vec<InteractionRecord> = errors
            .map(|e| e.mutants.iter().map(|m| InteractionRecord::capture(m, true)).collect())
            .unwrap_or_default();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: started_at.to_rfc3339(),
            elapsed_ms: u64::try_from(elapsed).unwrap_or_default(),
            summary: ReportSummary {
                total_operations: sequence.total_operations(),
                covered_operations: sequence.covered_operations().len(),
                coverage: sequence.operation_coverage(),
                termination: nominal.termination,
                passes: nominal.passes,
                attempts: nominal.attempts,
                mutants: mutants.len(),
                mutants_rejected: mutants.iter().filter(|m| m.passed()).count(),
                mutants_skipped: errors.map_or(0, |e| e.skipped),
            },
            operations: nominal.states.values().cloned().collect(),
            dependencies: graph.dependencies(),
            nominal: sequence
                .interactions()
                .iter()
                .map(|i| InteractionRecord::capture(i, true))
                .collect(),
            mutants,
        }
    }

    /// Every operation produced at least one successful interaction.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.summary.total_operations == self.summary.covered_operations
    }

    /// Operations that never succeeded.
    pub fn uncovered(&self) -> impl Iterator<Item = &OperationState> {
        self.operations
            .iter()
            .filter(|s| s.status != OperationStatus::Succeeded)
    }
}

/// JSON Schema of [`GenerationReport`].
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(GenerationReport);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
