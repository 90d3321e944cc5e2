//! Operation dependency graph
//!
//! Vertices are operations. An edge `consumer -> producer` labeled with a
//! normalized field name means some input leaf of `consumer` can be filled
//! with a value `producer` exposes in its response. Operations without
//! outgoing edges have no unmet dependency and are tested first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use rand::Rng;
use rand::seq::IteratorRandom;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::normalize::matches_output;
use crate::operation::Operation;

#[derive(Debug, Clone)]
pub struct OperationVertex {
    pub operation: Arc<Operation>,
    /// Failed attempts in the current graph pass.
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Normalized name of the shared field.
    pub field: String,
}

/// One edge, by operation label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Dependency {
    pub consumer: String,
    pub producer: String,
    pub field: String,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<OperationVertex, DependencyEdge>,
    index: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Add every operation and link each consumer to the producers of its inputs.
    ///
    /// Operations sharing a label are only added once.
    #[must_use]
    pub fn build(operations: &[Arc<Operation>]) -> Self {
        let mut graph = Self::default();
        for operation in operations {
            if graph.index.contains_key(operation.label()) {
                debug!(operation = %operation.label(), "duplicate operation ignored");
                continue;
            }
            let vertex = graph.graph.add_node(OperationVertex {
                operation: Arc::clone(operation),
                retries: 0,
            });
            graph.index.insert(operation.label().to_string(), vertex);
        }

        let vertices: Vec<NodeIndex> = graph.graph.node_indices().collect();
        for &consumer in &vertices {
            for &producer in &vertices {
                if consumer == producer {
                    continue;
                }
                for field in shared_fields(
                    &graph.graph[consumer].operation,
                    &graph.graph[producer].operation,
                ) {
                    graph.graph.add_edge(consumer, producer, DependencyEdge { field });
                }
            }
        }
        debug!(
            operations = graph.graph.node_count(),
            dependencies = graph.graph.edge_count(),
            "dependency graph built"
        );
        graph
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.graph.node_indices().map(|n| &self.graph[n].operation)
    }

    #[must_use]
    pub fn operation(&self, label: &str) -> Option<&Arc<Operation>> {
        self.index.get(label).map(|&i| &self.graph[i].operation)
    }

    /// Every edge, sorted.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut all: Vec<Dependency> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (source, target) = self.graph.edge_endpoints(e)?;
                Some(Dependency {
                    consumer: self.graph[source].operation.label().to_string(),
                    producer: self.graph[target].operation.label().to_string(),
                    field: self.graph[e].field.clone(),
                })
            })
            .collect();
        all.sort();
        all
    }

    /// Labels of the operations `label` depends on.
    #[must_use]
    pub fn producers_of(&self, label: &str) -> BTreeSet<String> {
        self.neighbors(label, Direction::Outgoing)
    }

    /// Labels of the operations depending on `label`.
    #[must_use]
    pub fn consumers_of(&self, label: &str) -> BTreeSet<String> {
        self.neighbors(label, Direction::Incoming)
    }

    fn neighbors(&self, label: &str, direction: Direction) -> BTreeSet<String> {
        let Some(&vertex) = self.index.get(label) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(vertex, direction)
            .map(|n| self.graph[n].operation.label().to_string())
            .collect()
    }

    /// Operations without outgoing edges, ready to be tested.
    #[must_use]
    pub fn leaves(&self) -> Vec<Arc<Operation>> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|n| Arc::clone(&self.graph[n].operation))
            .collect()
    }

    /// Progress step for graphs without leaves: one arbitrary vertex followed
    /// by every vertex with an edge into it. Labels in `exclude` are skipped.
    pub fn next_dependent_nodes<R: Rng + ?Sized>(
        &self,
        exclude: &BTreeSet<String>,
        rng: &mut R,
    ) -> Vec<Arc<Operation>> {
        let allowed = |n: &NodeIndex| !exclude.contains(self.graph[*n].operation.label());
        let Some(pick) = self.graph.node_indices().filter(allowed).choose(rng) else {
            return Vec::new();
        };
        let dependents: BTreeSet<NodeIndex> = self
            .graph
            .neighbors_directed(pick, Direction::Incoming)
            .filter(|n| *n != pick && allowed(n))
            .collect();
        std::iter::once(pick)
            .chain(dependents)
            .map(|n| Arc::clone(&self.graph[n].operation))
            .collect()
    }

    /// Working copy for a destructive traversal; retry counters start at zero.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let mut copy = self.clone();
        let vertices: Vec<NodeIndex> = copy.graph.node_indices().collect();
        for vertex in vertices {
            copy.graph[vertex].retries = 0;
        }
        copy
    }

    /// Remove a tested operation and its incident edges.
    pub fn remove_vertex(&mut self, label: &str) -> bool {
        match self.index.remove(label) {
            Some(vertex) => self.graph.remove_node(vertex).is_some(),
            None => false,
        }
    }

    #[must_use]
    pub fn retries(&self, label: &str) -> Option<u32> {
        self.index.get(label).map(|&i| self.graph[i].retries)
    }

    /// Count one failed attempt and return the new count.
    pub fn increment_retries(&mut self, label: &str) -> Option<u32> {
        let &vertex = self.index.get(label)?;
        let weight = self.graph.node_weight_mut(vertex)?;
        weight.retries += 1;
        Some(weight.retries)
    }

    pub fn reset_retries(&mut self, label: &str) {
        if let Some(weight) = self
            .index
            .get(label)
            .and_then(|&i| self.graph.node_weight_mut(i))
        {
            weight.retries = 0;
        }
    }

    /// Graphviz rendering, edges labeled with the shared field.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dependencies {\n    rankdir=LR;\n");
        for operation in self.operations() {
            let _ = writeln!(out, "    \"{}\";", escape(operation.label()));
        }
        for d in self.dependencies() {
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\" [label=\"{}\"];",
                escape(&d.consumer),
                escape(&d.producer),
                escape(&d.field)
            );
        }
        out.push_str("}\n");
        out
    }
}

/// Normalized names `consumer` reads that `producer` writes, one per name.
fn shared_fields(consumer: &Operation, producer: &Operation) -> BTreeSet<String> {
    let arena = consumer.arena();
    let mut fields = BTreeSet::new();
    for leaf in consumer.input_leaves() {
        let node = &arena[leaf];
        for output in producer.outputs() {
            if matches_output(node, output) {
                fields.insert(output.clone());
            }
        }
    }
    fields
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
