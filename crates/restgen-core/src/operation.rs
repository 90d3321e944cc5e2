//! Operations: read-only templates and per-interaction instances

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::CoreError;
use crate::model::{Location, NodeId, ParameterArena, ParameterMeta, ParameterStyle};
use crate::normalize::{NameScope, assign_normalized_names, normalized_in_scope};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    /// Methods in the order operations are listed under one path.
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Head,
        Self::Options,
        Self::Trace,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared path/query/header/cookie parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub location: Location,
    pub style: Option<ParameterStyle>,
    pub explode: Option<bool>,
    pub required: bool,
    pub schema: Value,
}

/// Root name of a request body that is not a component reference.
pub const DEFAULT_BODY_NAME: &str = "body";

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySpec {
    /// Root name; the decapitalized component name for `$ref` bodies.
    pub name: String,
    pub content_type: String,
    pub required: bool,
    pub schema: Value,
}

/// Everything the loader knows about one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub method: HttpMethod,
    pub path: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<RequestBodySpec>,
    /// Declared responses; the schema is absent for bodiless responses.
    pub responses: BTreeMap<u16, Option<Value>>,
    /// Raw names of fields the success responses expose.
    pub output_fields: BTreeSet<String>,
}

impl OperationSpec {
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation_id: None,
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            output_fields: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Read-only operation template.
///
/// The parameter arena is frozen; every interaction works on an
/// [`OperationInstance`] obtained from [`Operation::instantiate`].
#[derive(Debug)]
pub struct Operation {
    spec: OperationSpec,
    label: String,
    arena: ParameterArena,
    parameters: Vec<NodeId>,
    request_body: Option<NodeId>,
    outputs: BTreeSet<String>,
}

impl Operation {
    /// Model every parameter of `spec`. Parameters whose schema cannot be
    /// modeled are dropped with a warning.
    #[must_use]
    pub fn from_spec(spec: OperationSpec) -> Self {
        let label = spec.label();
        let owner = spec.operation_id.clone().unwrap_or_else(|| label.clone());
        let mut arena = ParameterArena::new(label.clone());

        let mut parameters = Vec::new();
        for p in &spec.parameters {
            let meta = ParameterMeta::new(p.location, owner.clone())
                .required(p.required || p.location == Location::Path)
                .style(p.style, p.explode);
            match model_root(&mut arena, &spec, &p.name, &p.schema, &meta) {
                Ok(id) => parameters.push(id),
                Err(e) => {
                    warn!(operation = %label, parameter = %p.name, error = %e, "dropping parameter");
                }
            }
        }

        let request_body = spec.request_body.as_ref().and_then(|body| {
            let meta =
                ParameterMeta::new(Location::RequestBody, owner.clone()).required(body.required);
            match model_root(&mut arena, &spec, &body.name, &body.schema, &meta) {
                Ok(id) => {
                    if let Ok(node) = arena.node_mut(id) {
                        node.keep_if_empty = body.required;
                    }
                    Some(id)
                }
                Err(e) => {
                    warn!(operation = %label, error = %e, "dropping request body");
                    None
                }
            }
        });

        let scope = NameScope {
            path: &spec.path,
            operation_id: spec.operation_id.as_deref(),
            location: Some(Location::ResponseBody),
            enclosing: None,
        };
        let outputs = spec
            .output_fields
            .iter()
            .map(|f| normalized_in_scope(f, &scope))
            .filter(|f| !f.is_empty())
            .collect();

        arena.freeze();
        Self {
            spec,
            label,
            arena,
            parameters,
            request_body,
            outputs,
        }
    }

    /// `METHOD /path`, unique per operation.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.spec.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.spec.path
    }

    /// The frozen template arena.
    #[must_use]
    pub const fn arena(&self) -> &ParameterArena {
        &self.arena
    }

    #[must_use]
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    #[must_use]
    pub const fn request_body(&self) -> Option<NodeId> {
        self.request_body
    }

    /// Declared leaves of every parameter and the body (array templates, not items).
    #[must_use]
    pub fn input_leaves(&self) -> Vec<NodeId> {
        self.parameters
            .iter()
            .chain(&self.request_body)
            .flat_map(|root| self.arena.reference_leaves(*root))
            .collect()
    }

    /// Normalized names of the fields this operation produces.
    #[must_use]
    pub const fn outputs(&self) -> &BTreeSet<String> {
        &self.outputs
    }

    /// Fresh writable copy of the parameter trees.
    #[must_use]
    pub fn instantiate(self: &Arc<Self>) -> OperationInstance {
        OperationInstance {
            operation: Arc::clone(self),
            arena: self.arena.deep_clone(),
            parameters: self.parameters.clone(),
            request_body: self.request_body,
        }
    }
}

fn model_root(
    arena: &mut ParameterArena,
    spec: &OperationSpec,
    name: &str,
    schema: &Value,
    meta: &ParameterMeta,
) -> Result<NodeId, CoreError> {
    let id = arena.build_parameter(name, schema, meta)?;
    assign_normalized_names(arena, id, &spec.path, spec.operation_id.as_deref())?;
    Ok(id)
}

/// Writable parameter trees of one operation, owned by one interaction.
#[derive(Debug, Clone)]
pub struct OperationInstance {
    operation: Arc<Operation>,
    arena: ParameterArena,
    parameters: Vec<NodeId>,
    request_body: Option<NodeId>,
}

impl OperationInstance {
    #[must_use]
    pub const fn operation(&self) -> &Arc<Operation> {
        &self.operation
    }

    #[must_use]
    pub const fn arena(&self) -> &ParameterArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ParameterArena {
        &mut self.arena
    }

    #[must_use]
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    #[must_use]
    pub const fn request_body(&self) -> Option<NodeId> {
        self.request_body
    }

    /// Parameter roots followed by the body root.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parameters.iter().copied().chain(self.request_body)
    }

    /// Materialized leaves of every root.
    #[must_use]
    pub fn leaves(&self) -> Vec<NodeId> {
        self.roots()
            .flat_map(|root| self.arena.leaves(root))
            .collect()
    }

    /// The root parameter (or body) containing `id`.
    #[must_use]
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.arena.parent(current) {
            current = parent;
        }
        current
    }

    /// Omit `id` from the request: roots are dropped from the instance,
    /// nested nodes are detached from their container.
    ///
    /// # Errors
    ///
    /// Propagates arena errors.
    pub fn remove_node(&mut self, id: NodeId) -> Result<bool, CoreError> {
        if self.arena.parent(id).is_some() {
            return self.arena.detach(id);
        }
        if self.request_body == Some(id) {
            self.request_body = None;
            return Ok(true);
        }
        let before = self.parameters.len();
        self.parameters.retain(|p| *p != id);
        Ok(self.parameters.len() != before)
    }

    /// Put `new` in the place of `old`, root or nested.
    ///
    /// # Errors
    ///
    /// Propagates arena errors.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<bool, CoreError> {
        if self.arena.replace(old, new)? {
            return Ok(true);
        }
        if self.request_body == Some(old) {
            self.request_body = Some(new);
            return Ok(true);
        }
        match self.parameters.iter_mut().find(|p| **p == old) {
            Some(slot) => {
                *slot = new;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// JSON body to send, if any.
    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        self.request_body
            .and_then(|b| self.arena.json_representation(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_get_item() -> OperationSpec {
        let mut spec = OperationSpec::new(HttpMethod::Get, "/items/{id}");
        spec.operation_id = Some("getItem".into());
        spec.parameters.push(ParameterSpec {
            name: "id".into(),
            location: Location::Path,
            style: None,
            explode: None,
            required: true,
            schema: json!({"type": "integer"}),
        });
        spec.parameters.push(ParameterSpec {
            name: "filter".into(),
            location: Location::Query,
            style: None,
            explode: None,
            required: false,
            schema: json!({"not": {}}),
        });
        spec.output_fields.insert("name".into());
        spec
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!(HttpMethod::parse("delete"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("CONNECT"), None);
    }

    #[test]
    fn unsupported_parameters_are_dropped() {
        let op = Operation::from_spec(spec_get_item());
        assert_eq!(op.label(), "GET /items/{id}");
        assert_eq!(op.parameters().len(), 1);
        let id = op.parameters()[0];
        assert_eq!(op.arena()[id].normalized_name, "item_id");
        assert!(op.arena()[id].required);
        assert!(op.outputs().contains("name"));
    }

    #[test]
    fn template_is_frozen_instances_are_not() {
        let op = Arc::new(Operation::from_spec(spec_get_item()));
        let id = op.parameters()[0];
        let mut template = op.arena().clone();
        assert!(matches!(
            template.set_value(id, json!(1)),
            Err(CoreError::ReadOnlyViolation { .. })
        ));

        let mut instance = op.instantiate();
        instance.arena_mut().set_value(id, json!(1)).unwrap();
        assert_eq!(instance.arena().value(id), Some(&json!(1)));
        assert_eq!(op.arena().value(id), None);
    }

    #[test]
    fn output_id_is_completed_from_operation() {
        let mut spec = OperationSpec::new(HttpMethod::Post, "/items");
        spec.output_fields.insert("id".into());
        let op = Operation::from_spec(spec);
        assert!(op.outputs().contains("item_id"));
    }

    #[test]
    fn removing_and_replacing_roots() {
        let op = Arc::new(Operation::from_spec(spec_get_item()));
        let id = op.parameters()[0];
        let mut instance = op.instantiate();

        let copy = instance.arena_mut().duplicate_subtree(id, None).unwrap();
        assert!(instance.replace_node(id, copy).unwrap());
        assert_eq!(instance.parameters(), &[copy]);

        assert!(instance.remove_node(copy).unwrap());
        assert!(instance.parameters().is_empty());
        assert!(instance.leaves().is_empty());
    }
}
