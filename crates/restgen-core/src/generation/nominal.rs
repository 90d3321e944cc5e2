use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::graph::DependencyGraph;
use crate::operation::Operation;
use crate::sequence::{InteractionExecutor, TestInteraction, TestSequence};

use super::{GenerationContext, GenerationError, OperationState, OperationStatus};

/// Why nominal generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    FullCoverage,
    GraphExhausted,
    TimeBudget,
    PassLimit,
}

#[derive(Debug)]
pub struct NominalRun {
    /// Successful interactions, in execution order.
    pub sequence: TestSequence,
    pub states: BTreeMap<String, OperationState>,
    /// Executed interactions, successful or not.
    pub attempts: usize,
    pub passes: u32,
    pub termination: Termination,
    pub elapsed: Duration,
}

/// Produces valid requests in dependency order.
#[derive(Debug, Clone, Copy)]
pub struct NominalGenerator<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> NominalGenerator<'g> {
    #[must_use]
    pub const fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Traverse a working copy of the graph until every operation succeeded,
    /// the graph is exhausted, the time budget elapsed or `max_passes` passes ran.
    ///
    /// # Errors
    ///
    /// [`GenerationError::Execution`] when the executor itself fails.
    pub fn run<E: InteractionExecutor + ?Sized>(
        &self,
        ctx: &mut GenerationContext,
        executor: &mut E,
    ) -> Result<NominalRun, GenerationError> {
        let started = Instant::now();
        let budget = ctx.config.time_budget_secs;
        let mut traversal = Traversal {
            working: self.graph.deep_clone(),
            sequence: TestSequence::new(self.graph.len()),
            states: self
                .graph
                .operations()
                .map(|o| (o.label().to_string(), OperationState::pending(o.label())))
                .collect(),
            aborted: BTreeSet::new(),
            attempts: 0,
            deadline: (budget > 0).then(|| started + Duration::from_secs(budget)),
        };

        let mut passes = 0;
        let termination = loop {
            if traversal.sequence.operation_coverage() >= 1.0 {
                break Termination::FullCoverage;
            }
            if traversal.remaining_testable() == 0 {
                break Termination::GraphExhausted;
            }
            if traversal.expired() {
                break Termination::TimeBudget;
            }
            if passes >= ctx.config.max_passes {
                break Termination::PassLimit;
            }
            passes += 1;
            debug!(pass = passes, remaining = traversal.working.len(), "graph pass");
            traversal.pass(ctx, executor)?;
        };

        let run = NominalRun {
            sequence: traversal.sequence,
            states: traversal.states,
            attempts: traversal.attempts,
            passes,
            termination,
            elapsed: started.elapsed(),
        };
        info!(
            coverage = run.sequence.operation_coverage(),
            attempts = run.attempts,
            passes,
            ?termination,
            "nominal generation finished"
        );
        Ok(run)
    }
}

struct Traversal {
    working: DependencyGraph,
    sequence: TestSequence,
    states: BTreeMap<String, OperationState>,
    /// Operations that hit a programming error; never retried.
    aborted: BTreeSet<String>,
    attempts: usize,
    deadline: Option<Instant>,
}

impl Traversal {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn remaining_testable(&self) -> usize {
        self.working
            .operations()
            .filter(|o| !self.aborted.contains(o.label()))
            .count()
    }

    fn state(&mut self, label: &str) -> &mut OperationState {
        self.states
            .entry(label.to_string())
            .or_insert_with(|| OperationState::pending(label))
    }

    /// One pass over the residual graph: ready operations first, then
    /// dependency groups, until every remaining operation was given up.
    fn pass<E: InteractionExecutor + ?Sized>(
        &mut self,
        ctx: &mut GenerationContext,
        executor: &mut E,
    ) -> Result<(), GenerationError> {
        let mut given_up = self.aborted.clone();
        loop {
            let mut ready: Vec<Arc<Operation>> = self
                .working
                .leaves()
                .into_iter()
                .filter(|o| !given_up.contains(o.label()))
                .collect();
            if ready.is_empty() {
                ready = self.working.next_dependent_nodes(&given_up, ctx.rng());
            }
            if ready.is_empty() {
                return Ok(());
            }
            for operation in ready {
                if self.expired() {
                    return Ok(());
                }
                let label = operation.label();
                if self.working.contains(label) && !given_up.contains(label) {
                    self.test_operation(&operation, &mut given_up, ctx, executor)?;
                }
            }
        }
    }

    /// Attempt `operation` until it succeeds or is given up for this pass.
    fn test_operation<E: InteractionExecutor + ?Sized>(
        &mut self,
        operation: &Arc<Operation>,
        given_up: &mut BTreeSet<String>,
        ctx: &mut GenerationContext,
        executor: &mut E,
    ) -> Result<(), GenerationError> {
        let label = operation.label().to_string();
        loop {
            self.state(&label).status = OperationStatus::InProgress;

            let mut instance = operation.instantiate();
            if let Err(e) = ctx.fill(&mut instance) {
                warn!(operation = %label, error = %e, "aborting operation");
                self.state(&label).status = OperationStatus::Exhausted;
                self.aborted.insert(label.clone());
                given_up.insert(label);
                return Ok(());
            }

            let mut interaction = TestInteraction::new(instance);
            let outcome = executor
                .execute(&interaction)
                .map_err(GenerationError::execution)?;
            self.attempts += 1;
            self.state(&label).attempts += 1;
            debug!(operation = %label, passed = outcome.passed, summary = %outcome.summary, "nominal attempt");
            let passed = outcome.passed;
            interaction.outcome = Some(outcome);

            if passed {
                ctx.harvest(&interaction);
                self.sequence.push(interaction);
                self.working.remove_vertex(&label);
                self.state(&label).status = OperationStatus::Succeeded;
                return Ok(());
            }

            let retries = self.working.increment_retries(&label).unwrap_or(u32::MAX);
            if retries >= ctx.config.max_fuzzing_times {
                debug!(operation = %label, retries, "giving up for this pass");
                self.working.reset_retries(&label);
                self.state(&label).status = OperationStatus::Exhausted;
                given_up.insert(label);
                return Ok(());
            }
            if self.expired() {
                self.state(&label).status = OperationStatus::Pending;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::generation::test_support::{FnExecutor, item_operations};
    use crate::sequence::{ExecutionOutcome, ObservedValue};
    use serde_json::json;

    fn config() -> GenerationConfig {
        GenerationConfig {
            max_fuzzing_times: 3,
            max_passes: 2,
            time_budget_secs: 0,
            seed: Some(17),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn producers_run_before_consumers() {
        let graph = DependencyGraph::build(&item_operations());
        let mut ctx = GenerationContext::unauthenticated(config());
        let mut executor = FnExecutor(|interaction: &TestInteraction| {
            if interaction.label() == "POST /items" {
                return ExecutionOutcome::pass(
                    Some(201),
                    vec![ObservedValue::new("id", json!(42))],
                );
            }
            let id = interaction
                .inputs
                .iter()
                .find(|e| e.parameter_name == "id")
                .map(|e| e.value.clone());
            if id == Some(json!(42)) {
                ExecutionOutcome::pass(Some(200), Vec::new())
            } else {
                ExecutionOutcome::fail(Some(404), "unknown item")
            }
        });

        let run = NominalGenerator::new(&graph).run(&mut ctx, &mut executor).unwrap();
        let order: Vec<&str> = run.sequence.interactions().iter().map(TestInteraction::label).collect();
        assert_eq!(order, ["POST /items", "GET /items/{id}"]);
        assert_eq!(run.termination, Termination::FullCoverage);
        assert_eq!(run.attempts, 2);
        assert!(run.states.values().all(|s| s.status == OperationStatus::Succeeded));
        // the canonical graph is untouched
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn failing_operations_are_retried_each_pass() {
        let graph = DependencyGraph::build(&item_operations());
        let mut ctx = GenerationContext::unauthenticated(config());
        let mut executor = FnExecutor(|interaction: &TestInteraction| {
            if interaction.label() == "POST /items" {
                ExecutionOutcome::pass(Some(201), Vec::new())
            } else {
                ExecutionOutcome::fail(Some(500), "broken")
            }
        });

        let run = NominalGenerator::new(&graph).run(&mut ctx, &mut executor).unwrap();
        assert_eq!(run.termination, Termination::PassLimit);
        assert_eq!(run.passes, 2);
        let get = &run.states["GET /items/{id}"];
        assert_eq!(get.status, OperationStatus::Exhausted);
        assert_eq!(get.attempts, 6);
        assert!((run.sequence.operation_coverage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_graph_is_exhausted_immediately() {
        let graph = DependencyGraph::build(&[]);
        let mut ctx = GenerationContext::unauthenticated(config());
        let mut executor = FnExecutor(|_: &TestInteraction| ExecutionOutcome::fail(None, "unused"));
        let run = NominalGenerator::new(&graph).run(&mut ctx, &mut executor).unwrap();
        assert_eq!(run.termination, Termination::GraphExhausted);
        assert_eq!(run.passes, 0);
    }

    #[test]
    fn executor_errors_abort_generation() {
        let graph = DependencyGraph::build(&item_operations());
        let mut ctx = GenerationContext::unauthenticated(config());
        let mut executor = crate::generation::test_support::Unreachable;
        let err = NominalGenerator::new(&graph)
            .run(&mut ctx, &mut executor)
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
