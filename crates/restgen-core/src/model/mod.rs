//! Recursive parameter model
//!
//! Every parameter of an operation (path/query/header/cookie parameters and the
//! request body) is a tree of [`ParameterNode`]s stored in a [`ParameterArena`].
//! Parent links are arena indices, so cloning a tree is a plain copy of the
//! arena and cannot produce cycles or dangling references.
//!
//! Arenas attached to an operation template are frozen: every mutating call
//! returns [`CoreError::ReadOnlyViolation`]. Work happens on
//! [`ParameterArena::deep_clone`] copies, which are always writable.

mod build;
pub(crate) mod compliance;
mod json;
mod merge;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

pub use build::ParameterMeta;

/// Index of a node inside its [`ParameterArena`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared type of a parameter node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    AllOf,
    AnyOf,
    OneOf,
    Null,
    Generic,
}

impl ParameterType {
    /// Type a JSON value would be declared with.
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
            Self::Null => "null",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter travels in the HTTP exchange.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Location {
    Path,
    Query,
    Header,
    Cookie,
    RequestBody,
    ResponseBody,
    Missing,
}

impl Location {
    /// Parse the OpenAPI `in` keyword.
    #[must_use]
    pub fn from_openapi(value: &str) -> Self {
        match value {
            "path" => Self::Path,
            "query" => Self::Query,
            "header" => Self::Header,
            "cookie" => Self::Cookie,
            _ => Self::Missing,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::RequestBody => "requestBody",
            Self::ResponseBody => "responseBody",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenAPI serialization style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "matrix" => Self::Matrix,
            "label" => Self::Label,
            "form" => Self::Form,
            "simple" => Self::Simple,
            "spaceDelimited" => Self::SpaceDelimited,
            "pipeDelimited" => Self::PipeDelimited,
            "deepObject" => Self::DeepObject,
            _ => return None,
        })
    }

    /// Default style for a location, per OpenAPI 3.
    #[must_use]
    pub const fn default_for(location: Location) -> Self {
        match location {
            Location::Query | Location::Cookie => Self::Form,
            _ => Self::Simple,
        }
    }
}

/// Composition keyword of a combined schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    AllOf,
    AnyOf,
    OneOf,
}

impl Combinator {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::OneOf => "oneOf",
        }
    }
}

/// Leaf without type-specific constraints (boolean, null, generic).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafNode {
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringNode {
    pub value: Option<Value>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberNode {
    pub value: Option<Value>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    /// Declared as `integer` (or with an integer format).
    pub integer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    /// Template for one item. Never rendered.
    pub reference_element: NodeId,
    /// Materialized items, in order.
    pub elements: Vec<NodeId>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub properties: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedNode {
    pub combinator: Combinator,
    pub candidates: Vec<NodeId>,
    pub resolved: Option<NodeId>,
}

/// Type-specific part of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    String(StringNode),
    Number(NumberNode),
    Boolean(LeafNode),
    Null(LeafNode),
    Generic(LeafNode),
    Array(ArrayNode),
    Object(ObjectNode),
    Combined(CombinedNode),
}

impl NodeKind {
    #[must_use]
    pub const fn parameter_type(&self) -> ParameterType {
        match self {
            Self::String(_) => ParameterType::String,
            Self::Number(_) => ParameterType::Number,
            Self::Boolean(_) => ParameterType::Boolean,
            Self::Null(_) => ParameterType::Null,
            Self::Generic(_) => ParameterType::Generic,
            Self::Array(_) => ParameterType::Array,
            Self::Object(_) => ParameterType::Object,
            Self::Combined(c) => match c.combinator {
                Combinator::AllOf => ParameterType::AllOf,
                Combinator::AnyOf => ParameterType::AnyOf,
                Combinator::OneOf => ParameterType::OneOf,
            },
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::String(_) | Self::Number(_) | Self::Boolean(_) | Self::Null(_) | Self::Generic(_)
        )
    }

    /// Value slot of a leaf; `None` for structured nodes.
    #[must_use]
    pub const fn value_slot(&self) -> Option<&Option<Value>> {
        match self {
            Self::String(s) => Some(&s.value),
            Self::Number(n) => Some(&n.value),
            Self::Boolean(l) | Self::Null(l) | Self::Generic(l) => Some(&l.value),
            _ => None,
        }
    }

    fn value_slot_mut(&mut self) -> Option<&mut Option<Value>> {
        match self {
            Self::String(s) => Some(&mut s.value),
            Self::Number(n) => Some(&mut n.value),
            Self::Boolean(l) | Self::Null(l) | Self::Generic(l) => Some(&mut l.value),
            _ => None,
        }
    }

    /// Direct structural children, including array templates and combined candidates.
    fn child_ids(&self) -> Vec<NodeId> {
        match self {
            Self::Array(a) => std::iter::once(a.reference_element)
                .chain(a.elements.iter().copied())
                .collect(),
            Self::Object(o) => o.properties.clone(),
            Self::Combined(c) => c.candidates.iter().copied().chain(c.resolved).collect(),
            _ => Vec::new(),
        }
    }

    fn remap_children(&mut self, map: &impl Fn(NodeId) -> NodeId) {
        match self {
            Self::Array(a) => {
                a.reference_element = map(a.reference_element);
                for e in &mut a.elements {
                    *e = map(*e);
                }
            }
            Self::Object(o) => {
                for p in &mut o.properties {
                    *p = map(*p);
                }
            }
            Self::Combined(c) => {
                for candidate in &mut c.candidates {
                    *candidate = map(*candidate);
                }
                c.resolved = c.resolved.map(map);
            }
            _ => {}
        }
    }
}

/// One parameter or body field together with its constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub normalized_name: String,
    pub format: Option<String>,
    pub location: Location,
    pub style: Option<ParameterStyle>,
    pub explode: bool,
    pub required: bool,
    pub default_value: Option<Value>,
    /// Declared enum values, deduplicated.
    pub enum_values: Vec<Value>,
    /// Declared examples, deduplicated.
    pub examples: Vec<Value>,
    pub operation_id: String,
    /// Render this node even when it has no content.
    pub keep_if_empty: bool,
    pub kind: NodeKind,
    parent: Option<NodeId>,
}

impl ParameterNode {
    #[must_use]
    pub fn new(name: impl Into<String>, location: Location, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            normalized_name: String::new(),
            format: None,
            location,
            style: None,
            explode: false,
            required: false,
            default_value: None,
            enum_values: Vec::new(),
            examples: Vec::new(),
            operation_id: String::new(),
            keep_if_empty: false,
            kind,
            parent: None,
        }
    }

    #[must_use]
    pub const fn parameter_type(&self) -> ParameterType {
        self.kind.parameter_type()
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.kind.value_slot().and_then(Option::as_ref)
    }

    /// A leaf is set iff its value slot is filled; explicit `null` counts as set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value().is_some()
    }

    /// Copy of the common fields with a different kind and no value constraints.
    #[must_use]
    pub fn with_kind(&self, kind: NodeKind) -> Self {
        Self {
            name: self.name.clone(),
            normalized_name: self.normalized_name.clone(),
            format: None,
            location: self.location,
            style: self.style,
            explode: self.explode,
            required: self.required,
            default_value: None,
            enum_values: Vec::new(),
            examples: Vec::new(),
            operation_id: self.operation_id.clone(),
            keep_if_empty: self.keep_if_empty,
            kind,
            parent: self.parent,
        }
    }
}

/// Owner of all parameter nodes of one operation (or one instance of it).
#[derive(Debug, Clone, Default)]
pub struct ParameterArena {
    nodes: Vec<ParameterNode>,
    read_only: bool,
    owner: String,
}

impl std::ops::Index<NodeId> for ParameterArena {
    type Output = ParameterNode;

    fn index(&self, id: NodeId) -> &ParameterNode {
        &self.nodes[id.index()]
    }
}

impl ParameterArena {
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            read_only: false,
            owner: owner.into(),
        }
    }

    /// Label of the operation owning this arena.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Mark the arena as a read-only template.
    pub fn freeze(&mut self) {
        self.read_only = true;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&ParameterNode> {
        self.nodes.get(id.index())
    }

    /// Writable access to a node.
    ///
    /// # Errors
    ///
    /// [`CoreError::ReadOnlyViolation`] on a frozen arena, [`CoreError::UnknownNode`]
    /// for ids from another arena.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut ParameterNode, CoreError> {
        self.check_writable()?;
        self.nodes
            .get_mut(id.index())
            .ok_or(CoreError::UnknownNode(id))
    }

    fn check_writable(&self) -> Result<(), CoreError> {
        if self.read_only {
            return Err(CoreError::ReadOnlyViolation {
                operation: self.owner.clone(),
            });
        }
        Ok(())
    }

    fn check_id(&self, id: NodeId) -> Result<(), CoreError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(CoreError::UnknownNode(id))
        }
    }

    /// Add a detached node.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena.
    pub fn alloc(&mut self, mut node: ParameterNode) -> Result<NodeId, CoreError> {
        self.check_writable()?;
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        node.parent = None;
        self.nodes.push(node);
        Ok(id)
    }

    /// Writable copy detached from any template.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            read_only: false,
            owner: self.owner.clone(),
        }
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(ParameterNode::parent)
    }

    /// Rendered children: object properties, array elements, or the effective combined schema.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Object(o)) => o.properties.clone(),
            Some(NodeKind::Array(a)) => a.elements.clone(),
            Some(NodeKind::Combined(_)) => self.effective_schema(id).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// The schema a combined node stands for: its resolved schema, else its first candidate.
    #[must_use]
    pub fn effective_schema(&self, id: NodeId) -> Option<NodeId> {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Combined(c)) => c.resolved.or_else(|| c.candidates.first().copied()),
            _ => None,
        }
    }

    /// Object property by name.
    #[must_use]
    pub fn property(&self, object: NodeId, name: &str) -> Option<NodeId> {
        match self.get(object).map(|n| &n.kind) {
            Some(NodeKind::Object(o)) => o.properties.iter().copied().find(|p| self[*p].name == name),
            _ => None,
        }
    }

    /// Attach `child` as the last property of `object`.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena or when `object` is not an object node.
    pub fn add_property(&mut self, object: NodeId, child: NodeId) -> Result<(), CoreError> {
        self.check_id(child)?;
        let node = self.node_mut(object)?;
        let NodeKind::Object(o) = &mut node.kind else {
            return Err(CoreError::TypeMismatch {
                name: node.name.clone(),
                expected: ParameterType::Object,
                value: "property".into(),
            });
        };
        o.properties.push(child);
        self.nodes[child.index()].parent = Some(object);
        Ok(())
    }

    /// Attach `child` as the last element of `array`.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena or when `array` is not an array node.
    pub fn add_element(&mut self, array: NodeId, child: NodeId) -> Result<(), CoreError> {
        self.check_id(child)?;
        let node = self.node_mut(array)?;
        let NodeKind::Array(a) = &mut node.kind else {
            return Err(CoreError::TypeMismatch {
                name: node.name.clone(),
                expected: ParameterType::Array,
                value: "element".into(),
            });
        };
        a.elements.push(child);
        self.nodes[child.index()].parent = Some(array);
        Ok(())
    }

    /// Set a child link (array template, combined candidate or resolved schema).
    pub(crate) fn set_parent(&mut self, child: NodeId, parent: NodeId) -> Result<(), CoreError> {
        self.check_id(parent)?;
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Materialize one more array item from the array's reference element.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena or when `array` is not an array node.
    pub fn push_element_from_reference(&mut self, array: NodeId) -> Result<NodeId, CoreError> {
        let reference = match self.get(array).map(|n| &n.kind) {
            Some(NodeKind::Array(a)) => a.reference_element,
            Some(node) => {
                return Err(CoreError::TypeMismatch {
                    name: self[array].name.clone(),
                    expected: ParameterType::Array,
                    value: node.parameter_type().to_string(),
                });
            }
            None => return Err(CoreError::UnknownNode(array)),
        };
        let element = self.duplicate_subtree(reference, None)?;
        self.add_element(array, element)?;
        Ok(element)
    }

    /// Detach `id` from its container. Returns `false` for roots, which have no container.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena.
    pub fn detach(&mut self, id: NodeId) -> Result<bool, CoreError> {
        self.check_writable()?;
        let Some(parent) = self.parent(id) else {
            return Ok(false);
        };
        match &mut self.nodes[parent.index()].kind {
            NodeKind::Object(o) => o.properties.retain(|p| *p != id),
            NodeKind::Array(a) => a.elements.retain(|e| *e != id),
            NodeKind::Combined(c) => {
                c.candidates.retain(|x| *x != id);
                if c.resolved == Some(id) {
                    c.resolved = None;
                }
            }
            _ => {}
        }
        self.nodes[id.index()].parent = None;
        Ok(true)
    }

    /// Put `new` where `old` sits in its container. Returns `false` when `old` is a root.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena or unknown ids.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<bool, CoreError> {
        self.check_writable()?;
        self.check_id(new)?;
        let Some(parent) = self.parent(old) else {
            self.nodes[new.index()].parent = None;
            return Ok(false);
        };
        let swap = |x: &mut NodeId| {
            if *x == old {
                *x = new;
            }
        };
        match &mut self.nodes[parent.index()].kind {
            NodeKind::Object(o) => o.properties.iter_mut().for_each(swap),
            NodeKind::Array(a) => {
                a.elements.iter_mut().for_each(swap);
                if a.reference_element == old {
                    a.reference_element = new;
                }
            }
            NodeKind::Combined(c) => {
                c.candidates.iter_mut().for_each(swap);
                if c.resolved == Some(old) {
                    c.resolved = Some(new);
                }
            }
            _ => {}
        }
        self.nodes[new.index()].parent = Some(parent);
        self.nodes[old.index()].parent = None;
        Ok(true)
    }

    /// Copy the subtree at `id` inside this arena. The copy's parent link points to
    /// `new_parent`; the caller inserts it into the container.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena.
    pub fn duplicate_subtree(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<NodeId, CoreError> {
        self.check_writable()?;
        self.check_id(id)?;
        let order = self.subtree(id);
        let copies = order.iter().map(|old| self[*old].clone()).collect();
        Ok(self.append_copies(&order, copies, new_parent, None))
    }

    /// Copy the subtree rooted at `id` in `source` into this arena.
    ///
    /// The copy is re-parented under `new_parent` and, if given, re-owned by
    /// `new_operation`. Node identities inside the copy are fresh.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena or an id unknown to `source`.
    pub fn import_subtree(
        &mut self,
        source: &Self,
        id: NodeId,
        new_parent: Option<NodeId>,
        new_operation: Option<&str>,
    ) -> Result<NodeId, CoreError> {
        self.check_writable()?;
        source.check_id(id)?;
        let order = source.subtree(id);
        let copies = order.iter().map(|old| source[*old].clone()).collect();
        Ok(self.append_copies(&order, copies, new_parent, new_operation))
    }

    /// Append `copies` (taken from the ids in `order`, root first) with remapped links.
    fn append_copies(
        &mut self,
        order: &[NodeId],
        copies: Vec<ParameterNode>,
        new_parent: Option<NodeId>,
        new_operation: Option<&str>,
    ) -> NodeId {
        let base = self.nodes.len();
        let remap: std::collections::BTreeMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(i, old)| (*old, NodeId(u32::try_from(base + i).unwrap_or(u32::MAX))))
            .collect();
        let map = |old: NodeId| remap.get(&old).copied().unwrap_or(old);

        for (i, mut node) in copies.into_iter().enumerate() {
            node.kind.remap_children(&map);
            node.parent = if i == 0 { new_parent } else { node.parent.map(map) };
            if let Some(op) = new_operation {
                node.operation_id = op.to_string();
            }
            self.nodes.push(node);
        }
        map(order[0])
    }

    /// All node ids of the subtree rooted at `id`, pre-order, including templates and candidates.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            let mut children = node.kind.child_ids();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Leaves reachable through rendered content (materialized array elements).
    #[must_use]
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(id, false, &mut out);
        out
    }

    /// Leaves of the declared shape: arrays contribute their template, never their items.
    #[must_use]
    pub fn reference_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(id, true, &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, reference: bool, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Object(o) => {
                for p in &o.properties {
                    self.collect_leaves(*p, reference, out);
                }
            }
            NodeKind::Array(a) => {
                if reference {
                    self.collect_leaves(a.reference_element, reference, out);
                } else {
                    for e in &a.elements {
                        self.collect_leaves(*e, reference, out);
                    }
                }
            }
            NodeKind::Combined(_) => {
                if let Some(effective) = self.effective_schema(id) {
                    self.collect_leaves(effective, reference, out);
                }
            }
            _ => out.push(id),
        }
    }

    /// Structured nodes are empty without content; leaves are empty when unset.
    #[must_use]
    pub fn is_empty_node(&self, id: NodeId) -> bool {
        match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Object(o)) => o.properties.is_empty(),
            Some(NodeKind::Array(a)) => a.elements.is_empty(),
            Some(NodeKind::Combined(_)) => self
                .effective_schema(id)
                .is_none_or(|e| self.is_empty_node(e)),
            Some(node) => node.value_slot().is_none_or(Option::is_none),
            None => true,
        }
    }

    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.get(id).and_then(ParameterNode::value)
    }

    /// Assign a value to a leaf, casting it when that is safe.
    ///
    /// # Errors
    ///
    /// [`CoreError::TypeMismatch`] when the value neither fits nor casts,
    /// [`CoreError::ReadOnlyViolation`] on a template.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<(), CoreError> {
        self.check_writable()?;
        self.check_id(id)?;
        let value = self.coerce_value(id, value)?;
        let node = self.node_mut(id)?;
        let name = node.name.clone();
        let expected = node.parameter_type();
        match node.kind.value_slot_mut() {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(CoreError::TypeMismatch {
                name,
                expected,
                value: value.to_string(),
            }),
        }
    }

    /// Empty the value slot of a leaf.
    ///
    /// # Errors
    ///
    /// Fails on a frozen arena.
    pub fn clear_value(&mut self, id: NodeId) -> Result<(), CoreError> {
        if let Some(slot) = self.node_mut(id)?.kind.value_slot_mut() {
            *slot = None;
        }
        Ok(())
    }

    /// Dotted path from the root parameter to `id`; array items use their index.
    #[must_use]
    pub fn path(&self, id: NodeId) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self[node_id];
            let parent = node.parent;
            let segment = match parent.map(|p| &self[p].kind) {
                Some(NodeKind::Array(a)) => a
                    .elements
                    .iter()
                    .position(|e| *e == node_id)
                    .map_or_else(|| "[]".to_string(), |i| format!("[{i}]")),
                Some(NodeKind::Combined(_)) => String::new(),
                _ => node.name.clone(),
            };
            if !segment.is_empty() {
                segments.push(segment);
            }
            current = parent;
        }
        segments.reverse();
        segments
    }

    /// Name of the nearest named object or array enclosing `id`.
    #[must_use]
    pub fn enclosing_name(&self, id: NodeId) -> Option<&str> {
        let mut current = self.parent(id);
        while let Some(node_id) = current {
            let node = &self[node_id];
            if matches!(node.kind, NodeKind::Object(_) | NodeKind::Array(_))
                && !node.name.is_empty()
            {
                return Some(node.name.as_str());
            }
            current = node.parent;
        }
        None
    }

    /// Structural equality of two subtrees, ignoring node identities and property order.
    #[must_use]
    pub fn structurally_equal(&self, a: NodeId, other: &Self, b: NodeId) -> bool {
        let (Some(x), Some(y)) = (self.get(a), other.get(b)) else {
            return false;
        };
        let common = x.name == y.name
            && x.normalized_name == y.normalized_name
            && x.format == y.format
            && x.location == y.location
            && x.style == y.style
            && x.explode == y.explode
            && x.required == y.required
            && x.default_value == y.default_value
            && x.enum_values == y.enum_values
            && x.examples == y.examples
            && x.operation_id == y.operation_id;
        if !common {
            return false;
        }
        match (&x.kind, &y.kind) {
            (NodeKind::String(s1), NodeKind::String(s2)) => s1 == s2,
            (NodeKind::Number(n1), NodeKind::Number(n2)) => n1 == n2,
            (NodeKind::Boolean(l1), NodeKind::Boolean(l2))
            | (NodeKind::Null(l1), NodeKind::Null(l2))
            | (NodeKind::Generic(l1), NodeKind::Generic(l2)) => l1 == l2,
            (NodeKind::Array(a1), NodeKind::Array(a2)) => {
                a1.min_items == a2.min_items
                    && a1.max_items == a2.max_items
                    && a1.unique_items == a2.unique_items
                    && self.structurally_equal(a1.reference_element, other, a2.reference_element)
                    && a1.elements.len() == a2.elements.len()
                    && a1
                        .elements
                        .iter()
                        .zip(&a2.elements)
                        .all(|(e1, e2)| self.structurally_equal(*e1, other, *e2))
            }
            (NodeKind::Object(o1), NodeKind::Object(o2)) => {
                o1.properties.len() == o2.properties.len()
                    && o1.properties.iter().all(|p1| {
                        other
                            .property(b, &self[*p1].name)
                            .is_some_and(|p2| self.structurally_equal(*p1, other, p2))
                    })
            }
            (NodeKind::Combined(c1), NodeKind::Combined(c2)) => {
                c1.combinator == c2.combinator
                    && c1.candidates.len() == c2.candidates.len()
                    && c1
                        .candidates
                        .iter()
                        .zip(&c2.candidates)
                        .all(|(x1, x2)| self.structurally_equal(*x1, other, *x2))
                    && match (c1.resolved, c2.resolved) {
                        (Some(r1), Some(r2)) => self.structurally_equal(r1, other, r2),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pet_arena() -> (ParameterArena, NodeId) {
        let mut arena = ParameterArena::new("POST /pets");
        let body = arena
            .build_parameter(
                "pet",
                &json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "age": {"type": "integer", "minimum": 0},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }
                }),
                &ParameterMeta::new(Location::RequestBody, "createPet"),
            )
            .unwrap();
        (arena, body)
    }

    #[test]
    fn imported_subtree_is_reowned_and_detached_from_source() {
        let (mut source, body) = pet_arena();
        source.freeze();
        let mut target = ParameterArena::new("PUT /pets/{id}");
        let copy = target
            .import_subtree(&source, body, None, Some("updatePet"))
            .unwrap();

        assert_eq!(target.len(), source.subtree(body).len());
        assert!(target.parent(copy).is_none());
        let name = target.property(copy, "name").unwrap();
        assert_eq!(target.parent(name), Some(copy));
        assert!(target.subtree(copy).iter().all(|id| target[*id].operation_id == "updatePet"));

        target.set_value(name, json!("rex")).unwrap();
        let original = source.property(body, "name").unwrap();
        assert!(source.value(original).is_none());
    }

    #[test]
    fn frozen_arena_rejects_mutation() {
        let (mut arena, body) = pet_arena();
        arena.freeze();
        let name = arena.property(body, "name").unwrap();
        let err = arena.set_value(name, json!("rex")).unwrap_err();
        assert!(matches!(err, CoreError::ReadOnlyViolation { .. }));
        assert!(arena.value(name).is_none());
    }

    #[test]
    fn deep_clone_is_equal_and_independent() {
        let (mut arena, body) = pet_arena();
        arena.freeze();
        let mut copy = arena.deep_clone();
        assert!(!copy.is_read_only());
        assert!(arena.structurally_equal(body, &copy, body));

        let name = copy.property(body, "name").unwrap();
        copy.set_value(name, json!("rex")).unwrap();
        assert_eq!(copy.value(name), Some(&json!("rex")));
        assert!(arena.value(name).is_none());
        assert!(!arena.structurally_equal(body, &copy, body));
    }

    #[test]
    fn reference_leaves_ignore_materialized_items() {
        let (arena, body) = pet_arena();
        let mut copy = arena.deep_clone();
        let tags = copy.property(body, "tags").unwrap();
        assert!(copy.is_empty_node(tags));

        copy.push_element_from_reference(tags).unwrap();
        copy.push_element_from_reference(tags).unwrap();
        assert!(!copy.is_empty_node(tags));

        assert_eq!(copy.reference_leaves(body).len(), 3);
        assert_eq!(copy.leaves(body).len(), 4);
    }

    #[test]
    fn path_follows_parent_links() {
        let (arena, body) = pet_arena();
        let mut copy = arena.deep_clone();
        let tags = copy.property(body, "tags").unwrap();
        let item = copy.push_element_from_reference(tags).unwrap();
        assert_eq!(copy.path(item), vec!["pet", "tags", "[0]"]);
        assert_eq!(copy.parent(item), Some(tags));
    }

    #[test]
    fn explicit_null_counts_as_set() {
        let mut arena = ParameterArena::new("GET /x");
        let id = arena
            .alloc(ParameterNode::new(
                "n",
                Location::Query,
                NodeKind::Null(LeafNode::default()),
            ))
            .unwrap();
        assert!(!arena[id].is_set());
        arena.set_value(id, Value::Null).unwrap();
        assert!(arena[id].is_set());
        arena.clear_value(id).unwrap();
        assert!(!arena[id].is_set());
    }

    #[test]
    fn replace_swaps_container_slot() {
        let (arena, body) = pet_arena();
        let mut copy = arena.deep_clone();
        let age = copy.property(body, "age").unwrap();
        let replacement = copy
            .alloc(copy[age].with_kind(NodeKind::Boolean(LeafNode::default())))
            .unwrap();
        assert!(copy.replace(age, replacement).unwrap());
        assert_eq!(copy.property(body, "age"), Some(replacement));
        assert_eq!(copy.parent(replacement), Some(body));
        assert_eq!(copy.parent(age), None);
    }

    #[test]
    fn detach_root_reports_false() {
        let (arena, body) = pet_arena();
        let mut copy = arena.deep_clone();
        assert!(!copy.detach(body).unwrap());
        let name = copy.property(body, "name").unwrap();
        assert!(copy.detach(name).unwrap());
        assert!(copy.property(body, "name").is_none());
    }
}
