//! Schema → parameter tree mapping

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    ArrayNode, CombinedNode, Combinator, LeafNode, Location, NodeId, NodeKind, NumberNode,
    ObjectNode, ParameterArena, ParameterNode, ParameterStyle, StringNode,
};
use crate::error::CoreError;

/// Nesting limit for schemas; deeper trees are rejected.
pub const MAX_SCHEMA_DEPTH: usize = 20;

/// Attributes of a root parameter that do not come from its schema.
#[derive(Debug, Clone)]
pub struct ParameterMeta {
    pub location: Location,
    pub operation_id: String,
    pub style: Option<ParameterStyle>,
    pub explode: Option<bool>,
    pub required: bool,
}

impl ParameterMeta {
    #[must_use]
    pub fn new(location: Location, operation_id: impl Into<String>) -> Self {
        Self {
            location,
            operation_id: operation_id.into(),
            style: None,
            explode: None,
            required: false,
        }
    }

    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub const fn style(mut self, style: Option<ParameterStyle>, explode: Option<bool>) -> Self {
        self.style = style;
        self.explode = explode;
        self
    }
}

impl ParameterArena {
    /// Model one parameter (or request body) from its JSON schema.
    ///
    /// The schema is expected to have its `$ref`s resolved already. Properties
    /// that cannot be modeled are dropped with a warning; the parameter itself
    /// fails only when its root cannot be modeled.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedSchemaFeature`] for `not` or an unresolved `$ref`
    /// at the root, [`CoreError::ParameterCreation`] for combined schemas
    /// without usable candidates or nesting deeper than [`MAX_SCHEMA_DEPTH`].
    pub fn build_parameter(
        &mut self,
        name: &str,
        schema: &Value,
        meta: &ParameterMeta,
    ) -> Result<NodeId, CoreError> {
        let mark = self.nodes.len();
        let result = self.build_node(name, schema, meta, 0);
        match result {
            Ok(id) => {
                let style = meta
                    .style
                    .unwrap_or_else(|| ParameterStyle::default_for(meta.location));
                let node = self.node_mut(id)?;
                node.required = meta.required;
                node.style = Some(style);
                node.explode = meta.explode.unwrap_or(style == ParameterStyle::Form);
                Ok(id)
            }
            Err(e) => {
                self.nodes.truncate(mark);
                Err(e)
            }
        }
    }

    fn build_node(
        &mut self,
        name: &str,
        schema: &Value,
        meta: &ParameterMeta,
        depth: usize,
    ) -> Result<NodeId, CoreError> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(CoreError::ParameterCreation {
                name: name.to_string(),
                reason: format!("schema nested deeper than {MAX_SCHEMA_DEPTH} levels"),
            });
        }
        let empty = Map::new();
        let obj = match schema {
            Value::Object(obj) => obj,
            // `true` accepts anything
            Value::Bool(true) => &empty,
            other => {
                return Err(CoreError::ParameterCreation {
                    name: name.to_string(),
                    reason: format!("schema must be an object, got {other}"),
                });
            }
        };
        if obj.contains_key("$ref") {
            return Err(unsupported(name, "unresolved $ref"));
        }
        if obj.contains_key("not") {
            return Err(unsupported(name, "not"));
        }

        for (keyword, combinator) in [
            ("allOf", Combinator::AllOf),
            ("anyOf", Combinator::AnyOf),
            ("oneOf", Combinator::OneOf),
        ] {
            if let Some(Value::Array(candidates)) = obj.get(keyword) {
                let id = self.build_combined(name, combinator, candidates, meta, depth)?;
                self.apply_common(id, obj)?;
                return Ok(id);
            }
        }

        let id = match schema_type(obj) {
            SchemaType::String => self.alloc_node(
                name,
                meta,
                NodeKind::String(StringNode {
                    value: None,
                    min_length: obj.get("minLength").and_then(Value::as_u64),
                    max_length: obj.get("maxLength").and_then(Value::as_u64),
                    pattern: obj.get("pattern").and_then(Value::as_str).map(String::from),
                }),
            )?,
            SchemaType::Number { integer } => {
                let (minimum, exclusive_minimum) =
                    bound(obj, "minimum", "exclusiveMinimum");
                let (maximum, exclusive_maximum) =
                    bound(obj, "maximum", "exclusiveMaximum");
                let integer = integer
                    || matches!(
                        obj.get("format").and_then(Value::as_str),
                        Some("int32" | "int64")
                    );
                self.alloc_node(
                    name,
                    meta,
                    NodeKind::Number(NumberNode {
                        value: None,
                        minimum,
                        maximum,
                        exclusive_minimum,
                        exclusive_maximum,
                        integer,
                    }),
                )?
            }
            SchemaType::Boolean => {
                self.alloc_node(name, meta, NodeKind::Boolean(LeafNode::default()))?
            }
            SchemaType::Null => self.alloc_node(name, meta, NodeKind::Null(LeafNode::default()))?,
            SchemaType::Generic => {
                self.alloc_node(name, meta, NodeKind::Generic(LeafNode::default()))?
            }
            SchemaType::Array => self.build_array(name, obj, meta, depth)?,
            SchemaType::Object => self.build_object(name, obj, meta, depth)?,
        };
        self.apply_common(id, obj)?;
        Ok(id)
    }

    fn alloc_node(
        &mut self,
        name: &str,
        meta: &ParameterMeta,
        kind: NodeKind,
    ) -> Result<NodeId, CoreError> {
        let mut node = ParameterNode::new(name, meta.location, kind);
        node.operation_id.clone_from(&meta.operation_id);
        self.alloc(node)
    }

    fn apply_common(&mut self, id: NodeId, obj: &Map<String, Value>) -> Result<(), CoreError> {
        let node = self.node_mut(id)?;
        node.format = obj.get("format").and_then(Value::as_str).map(String::from);
        node.default_value = obj.get("default").cloned();
        if let Some(Value::Array(values)) = obj.get("enum") {
            push_unique(&mut node.enum_values, values.iter().cloned());
        }
        if let Some(example) = obj.get("example") {
            push_unique(&mut node.examples, std::iter::once(example.clone()));
        }
        match obj.get("examples") {
            Some(Value::Array(values)) => push_unique(&mut node.examples, values.iter().cloned()),
            // OpenAPI example objects carry the payload under `value`
            Some(Value::Object(named)) => push_unique(
                &mut node.examples,
                named
                    .values()
                    .filter_map(|e| e.get("value").cloned()),
            ),
            _ => {}
        }
        Ok(())
    }

    fn build_array(
        &mut self,
        name: &str,
        obj: &Map<String, Value>,
        meta: &ParameterMeta,
        depth: usize,
    ) -> Result<NodeId, CoreError> {
        let items = obj.get("items").unwrap_or(&Value::Bool(true));
        let reference = self.build_node(name, items, meta, depth + 1)?;
        let id = self.alloc_node(
            name,
            meta,
            NodeKind::Array(ArrayNode {
                reference_element: reference,
                elements: Vec::new(),
                min_items: obj.get("minItems").and_then(Value::as_u64),
                max_items: obj.get("maxItems").and_then(Value::as_u64),
                unique_items: obj
                    .get("uniqueItems")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
        )?;
        self.set_parent(reference, id)?;
        Ok(id)
    }

    fn build_object(
        &mut self,
        name: &str,
        obj: &Map<String, Value>,
        meta: &ParameterMeta,
        depth: usize,
    ) -> Result<NodeId, CoreError> {
        let id = self.alloc_node(name, meta, NodeKind::Object(ObjectNode::default()))?;
        let required: Vec<&str> = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(Value::Object(properties)) = obj.get("properties") else {
            return Ok(id);
        };
        for (prop_name, prop_schema) in properties {
            let read_only = prop_schema
                .get("readOnly")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if read_only && meta.location == Location::RequestBody {
                debug!(parameter = %prop_name, "skipping readOnly property in request body");
                continue;
            }
            let mark = self.nodes.len();
            match self.build_node(prop_name, prop_schema, meta, depth + 1) {
                Ok(child) => {
                    self.node_mut(child)?.required = required.contains(&prop_name.as_str());
                    self.add_property(id, child)?;
                }
                Err(e) if e.is_recoverable() => {
                    self.nodes.truncate(mark);
                    warn!(parent = %name, property = %prop_name, error = %e, "dropping property");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(id)
    }

    fn build_combined(
        &mut self,
        name: &str,
        combinator: Combinator,
        schemas: &[Value],
        meta: &ParameterMeta,
        depth: usize,
    ) -> Result<NodeId, CoreError> {
        let mut candidates = Vec::new();
        for schema in schemas {
            let mark = self.nodes.len();
            match self.build_node(name, schema, meta, depth + 1) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) if e.is_recoverable() => {
                    self.nodes.truncate(mark);
                    warn!(parameter = %name, combinator = combinator.keyword(), error = %e, "dropping candidate schema");
                }
                Err(e) => return Err(e),
            }
        }
        if candidates.is_empty() {
            return Err(CoreError::ParameterCreation {
                name: name.to_string(),
                reason: format!("{} without usable candidates", combinator.keyword()),
            });
        }

        let resolved = self.resolve_combined(combinator, &candidates)?;
        let id = self.alloc_node(
            name,
            meta,
            NodeKind::Combined(CombinedNode {
                combinator,
                candidates: candidates.clone(),
                resolved: Some(resolved),
            }),
        )?;
        for child in candidates.into_iter().chain(std::iter::once(resolved)) {
            self.set_parent(child, id)?;
        }
        Ok(id)
    }

    /// allOf merges every candidate onto the first concrete one; anyOf/oneOf
    /// take the first candidate that is not `null`.
    fn resolve_combined(
        &mut self,
        combinator: Combinator,
        candidates: &[NodeId],
    ) -> Result<NodeId, CoreError> {
        let first = candidates
            .iter()
            .copied()
            .find(|c| !matches!(self[*c].kind, NodeKind::Generic(_) | NodeKind::Null(_)))
            .or_else(|| candidates.first().copied())
            .ok_or(CoreError::UnknownNode(NodeId(0)))?;
        let resolved = self.duplicate_subtree(first, None)?;
        if combinator == Combinator::AllOf {
            for other in candidates.iter().filter(|c| **c != first) {
                if let Err(e) = self.merge(resolved, *other) {
                    warn!(error = %e, "allOf candidate not merged");
                }
            }
        }
        Ok(resolved)
    }
}

fn unsupported(name: &str, feature: &str) -> CoreError {
    CoreError::UnsupportedSchemaFeature {
        name: name.to_string(),
        feature: feature.to_string(),
    }
}

fn push_unique(target: &mut Vec<Value>, values: impl IntoIterator<Item = Value>) {
    for value in values {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}

/// Reads an inclusive bound and its exclusivity in both OpenAPI 3.0 (boolean
/// flag) and 3.1 (numeric keyword) forms.
fn bound(obj: &Map<String, Value>, key: &str, exclusive_key: &str) -> (Option<f64>, bool) {
    match obj.get(exclusive_key) {
        Some(Value::Number(n)) => (n.as_f64(), true),
        Some(Value::Bool(flag)) => (obj.get(key).and_then(Value::as_f64), *flag),
        _ => (obj.get(key).and_then(Value::as_f64), false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaType {
    String,
    Number { integer: bool },
    Boolean,
    Null,
    Generic,
    Array,
    Object,
}

fn schema_type(obj: &Map<String, Value>) -> SchemaType {
    let declared = match obj.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        // 3.1 type arrays: the first non-null entry wins
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .copied()
                .find(|t| *t != "null")
                .or_else(|| names.first().copied())
        }
        _ => None,
    };
    match declared {
        Some("string") => SchemaType::String,
        Some("integer") => SchemaType::Number { integer: true },
        Some("number") => SchemaType::Number { integer: false },
        Some("boolean") => SchemaType::Boolean,
        Some("null") => SchemaType::Null,
        Some("array") => SchemaType::Array,
        Some("object") => SchemaType::Object,
        _ => infer_type(obj),
    }
}

fn infer_type(obj: &Map<String, Value>) -> SchemaType {
    if obj.contains_key("properties") || obj.contains_key("additionalProperties") {
        return SchemaType::Object;
    }
    if obj.contains_key("items") {
        return SchemaType::Array;
    }
    if ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"]
        .iter()
        .any(|k| obj.contains_key(*k))
    {
        return SchemaType::Number { integer: false };
    }
    if ["minLength", "maxLength", "pattern"]
        .iter()
        .any(|k| obj.contains_key(*k))
    {
        return SchemaType::String;
    }
    let sample = obj
        .get("enum")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .or_else(|| obj.get("example"))
        .or_else(|| obj.get("default"));
    match sample {
        Some(Value::String(_)) => SchemaType::String,
        Some(Value::Number(n)) => SchemaType::Number {
            integer: n.is_i64() || n.is_u64(),
        },
        Some(Value::Bool(_)) => SchemaType::Boolean,
        Some(Value::Array(_)) => SchemaType::Array,
        Some(Value::Object(_)) => SchemaType::Object,
        _ => SchemaType::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterType;
    use serde_json::json;

    fn build(schema: Value) -> Result<(ParameterArena, NodeId), CoreError> {
        let mut arena = ParameterArena::new("POST /things");
        let id = arena.build_parameter(
            "thing",
            &schema,
            &ParameterMeta::new(Location::RequestBody, "createThing"),
        )?;
        Ok((arena, id))
    }

    #[test]
    fn not_clause_is_unsupported() {
        let err = build(json!({"not": {"type": "string"}})).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSchemaFeature { .. }));
    }

    #[test]
    fn failing_property_is_dropped_not_fatal() {
        let (arena, id) = build(json!({
            "type": "object",
            "properties": {
                "ok": {"type": "string"},
                "bad": {"not": {"type": "integer"}},
            }
        }))
        .unwrap();
        assert!(arena.property(id, "ok").is_some());
        assert!(arena.property(id, "bad").is_none());
        // dropped subtree leaves no orphans behind
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn combined_without_candidates_fails() {
        let err = build(json!({"oneOf": [{"not": {}}, {"$ref": "#/x"}]})).unwrap_err();
        assert!(matches!(err, CoreError::ParameterCreation { .. }));
    }

    #[test]
    fn all_of_merges_properties() {
        let (arena, id) = build(json!({
            "allOf": [
                {"type": "object", "properties": {"name": {"type": "string"}}},
                {"type": "object", "properties": {"age": {"type": "integer", "minimum": 1}}},
            ]
        }))
        .unwrap();
        assert_eq!(arena[id].parameter_type(), ParameterType::AllOf);
        let resolved = arena.effective_schema(id).unwrap();
        assert!(arena.property(resolved, "name").is_some());
        assert!(arena.property(resolved, "age").is_some());
        assert_eq!(arena.leaves(id).len(), 2);
    }

    #[test]
    fn one_of_takes_first_concrete_candidate() {
        let (arena, id) = build(json!({"oneOf": [{"type": "null"}, {"type": "string"}]})).unwrap();
        let resolved = arena.effective_schema(id).unwrap();
        assert_eq!(arena[resolved].parameter_type(), ParameterType::String);
    }

    #[test]
    fn openapi_31_type_array_and_exclusive_bounds() {
        let (arena, id) = build(json!({
            "type": ["null", "integer"],
            "exclusiveMinimum": 0,
            "maximum": 10
        }))
        .unwrap();
        let NodeKind::Number(n) = &arena[id].kind else {
            panic!("expected number");
        };
        assert!(n.integer);
        assert_eq!(n.minimum, Some(0.0));
        assert!(n.exclusive_minimum);
        assert_eq!(n.maximum, Some(10.0));
        assert!(!n.exclusive_maximum);
    }

    #[test]
    fn required_and_enum_are_recorded() {
        let (arena, id) = build(json!({
            "type": "object",
            "required": ["status"],
            "properties": {
                "status": {"type": "string", "enum": ["a", "b", "a"]},
                "note": {"type": "string"}
            }
        }))
        .unwrap();
        let status = arena.property(id, "status").unwrap();
        assert!(arena[status].required);
        assert_eq!(arena[status].enum_values, vec![json!("a"), json!("b")]);
        assert!(!arena[arena.property(id, "note").unwrap()].required);
    }

    #[test]
    fn array_template_carries_parent_name() {
        let (arena, id) = build(json!({"type": "array", "items": {"type": "integer"}})).unwrap();
        let NodeKind::Array(a) = &arena[id].kind else {
            panic!("expected array");
        };
        assert_eq!(arena[a.reference_element].name, "thing");
        assert_eq!(arena.parent(a.reference_element), Some(id));
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut schema = json!({"type": "string"});
        for _ in 0..=MAX_SCHEMA_DEPTH {
            schema = json!({"type": "array", "items": schema});
        }
        assert!(matches!(
            build(schema).unwrap_err(),
            CoreError::ParameterCreation { .. }
        ));
    }

    #[test]
    fn query_defaults_to_form_explode() {
        let mut arena = ParameterArena::new("GET /things");
        let id = arena
            .build_parameter(
                "tags",
                &json!({"type": "array", "items": {"type": "string"}}),
                &ParameterMeta::new(Location::Query, "listThings"),
            )
            .unwrap();
        assert_eq!(arena[id].style, Some(ParameterStyle::Form));
        assert!(arena[id].explode);
    }
}
