//! Test interactions, sequences and the execution boundary

use std::collections::BTreeSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dictionary::DictionaryEntry;
use crate::operation::{Operation, OperationInstance};

/// Tag carried by every mutant.
pub const MUTATED_TAG: &str = "mutated";

/// A `(field, value)` pair read from a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObservedValue {
    pub field: String,
    pub value: Value,
    /// Name of the nearest object or array property holding `field`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
}

impl ObservedValue {
    #[must_use]
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
            enclosing: None,
        }
    }

    #[must_use]
    pub fn within(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing = Some(enclosing.into());
        self
    }
}

/// Verdict of the execution collaborator for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionOutcome {
    pub passed: bool,
    /// Status code, for reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Values observed in the response of a passing nominal interaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observed: Vec<ObservedValue>,
    pub summary: String,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn pass(status: Option<u16>, observed: Vec<ObservedValue>) -> Self {
        Self {
            passed: true,
            status,
            observed,
            summary: "passed".into(),
        }
    }

    #[must_use]
    pub fn fail(status: Option<u16>, summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            status,
            observed: Vec::new(),
            summary: summary.into(),
        }
    }
}

/// Sends interactions and judges them.
///
/// Rejections by the server are reported as a failing [`ExecutionOutcome`];
/// `Err` is reserved for failures of the collaborator itself (unreachable
/// server, broken configuration) and aborts generation.
pub trait InteractionExecutor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// The collaborator could not execute the interaction at all.
    fn execute(&mut self, interaction: &TestInteraction) -> Result<ExecutionOutcome, Self::Error>;
}

/// One attempt at invoking an operation.
#[derive(Debug, Clone)]
pub struct TestInteraction {
    pub instance: OperationInstance,
    /// Values chosen for this attempt, one per set leaf.
    pub inputs: Vec<DictionaryEntry>,
    /// What the mutator changed; `None` for nominal interactions.
    pub mutation: Option<String>,
    pub tags: BTreeSet<String>,
    pub outcome: Option<ExecutionOutcome>,
}

impl TestInteraction {
    /// Interaction over a filled instance; inputs are read from its set leaves.
    #[must_use]
    pub fn new(instance: OperationInstance) -> Self {
        let mut interaction = Self {
            instance,
            inputs: Vec::new(),
            mutation: None,
            tags: BTreeSet::new(),
            outcome: None,
        };
        interaction.record_inputs();
        interaction
    }

    /// Re-read inputs from the set leaves of the instance.
    pub fn record_inputs(&mut self) {
        let arena = self.instance.arena();
        self.inputs = self
            .instance
            .leaves()
            .into_iter()
            .filter_map(|leaf| DictionaryEntry::from_leaf(arena, leaf))
            .collect();
    }

    #[must_use]
    pub fn operation(&self) -> &Arc<Operation> {
        self.instance.operation()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.instance.operation().label()
    }

    #[must_use]
    pub fn is_mutated(&self) -> bool {
        self.tags.contains(MUTATED_TAG)
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.passed)
    }

    /// Writable copy for mutation, without the outcome of the original.
    #[must_use]
    pub fn mutant(&self) -> Self {
        let mut copy = self.clone();
        copy.outcome = None;
        copy.tags.insert(MUTATED_TAG.to_string());
        copy
    }
}

/// Interactions in execution order.
#[derive(Debug, Clone, Default)]
pub struct TestSequence {
    interactions: Vec<TestInteraction>,
    total_operations: usize,
}

impl TestSequence {
    /// Empty sequence measured against `total_operations` (the graph size at generation start).
    #[must_use]
    pub fn new(total_operations: usize) -> Self {
        Self {
            interactions: Vec::new(),
            total_operations,
        }
    }

    pub fn push(&mut self, interaction: TestInteraction) {
        self.interactions.push(interaction);
    }

    #[must_use]
    pub fn interactions(&self) -> &[TestInteraction] {
        &self.interactions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.total_operations
    }

    /// Labels of the operations appearing in the sequence.
    #[must_use]
    pub fn covered_operations(&self) -> BTreeSet<&str> {
        self.interactions.iter().map(TestInteraction::label).collect()
    }

    /// Distinct operations appearing, over the total number of operations.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn operation_coverage(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.covered_operations().len() as f64 / self.total_operations as f64
    }
}

impl<'a> IntoIterator for &'a TestSequence {
    type Item = &'a TestInteraction;
    type IntoIter = std::slice::Iter<'a, TestInteraction>;

    fn into_iter(self) -> Self::IntoIter {
        self.interactions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;
    use crate::operation::{HttpMethod, OperationSpec, ParameterSpec};
    use serde_json::json;

    fn operation(path: &str) -> Arc<Operation> {
        let mut spec = OperationSpec::new(HttpMethod::Get, path);
        spec.parameters.push(ParameterSpec {
            name: "limit".into(),
            location: Location::Query,
            style: None,
            explode: None,
            required: false,
            schema: json!({"type": "integer"}),
        });
        Arc::new(Operation::from_spec(spec))
    }

    #[test]
    fn inputs_are_the_set_leaves() {
        let op = operation("/a");
        let mut instance = op.instantiate();
        let unset = TestInteraction::new(instance.clone());
        assert!(unset.inputs.is_empty());

        let leaf = instance.leaves()[0];
        instance.arena_mut().set_value(leaf, json!(5)).unwrap();
        let interaction = TestInteraction::new(instance);
        assert_eq!(interaction.inputs.len(), 1);
        assert_eq!(interaction.inputs[0].value, json!(5));
        assert_eq!(interaction.inputs[0].source.as_ref().unwrap().node, Some(leaf));
    }

    #[test]
    fn coverage_counts_distinct_operations() {
        let a = operation("/a");
        let b = operation("/b");
        let mut sequence = TestSequence::new(4);
        sequence.push(TestInteraction::new(a.instantiate()));
        sequence.push(TestInteraction::new(a.instantiate()));
        sequence.push(TestInteraction::new(b.instantiate()));
        assert!((sequence.operation_coverage() - 0.5).abs() < f64::EPSILON);
        assert_eq!(TestSequence::new(0).operation_coverage(), 0.0);
    }

    #[test]
    fn mutant_is_tagged_and_forgets_outcome() {
        let mut original = TestInteraction::new(operation("/a").instantiate());
        original.outcome = Some(ExecutionOutcome::pass(Some(200), Vec::new()));
        let mutant = original.mutant();
        assert!(mutant.is_mutated());
        assert!(!mutant.passed());
        assert!(original.passed());
        assert!(!original.is_mutated());
    }
}
