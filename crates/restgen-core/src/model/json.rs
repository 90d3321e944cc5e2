//! JSON rendering of populated trees

use serde_json::{Map, Value};

use super::{NodeId, NodeKind, ParameterArena};

impl ParameterArena {
    /// Current values of the subtree as JSON.
    ///
    /// Unset leaves render as `None`. Objects and arrays without content are
    /// omitted unless the node is flagged `keep_if_empty`.
    #[must_use]
    pub fn json_representation(&self, id: NodeId) -> Option<Value> {
        let node = self.get(id)?;
        match &node.kind {
            NodeKind::Object(o) => {
                let fields: Map<String, Value> = o
                    .properties
                    .iter()
                    .filter_map(|p| {
                        self.json_representation(*p)
                            .map(|v| (self[*p].name.clone(), v))
                    })
                    .collect();
                (!fields.is_empty() || node.keep_if_empty).then_some(Value::Object(fields))
            }
            NodeKind::Array(a) => {
                let items: Vec<Value> = a
                    .elements
                    .iter()
                    .filter_map(|e| self.json_representation(*e))
                    .collect();
                (!items.is_empty() || node.keep_if_empty).then_some(Value::Array(items))
            }
            NodeKind::Combined(_) => self
                .effective_schema(id)
                .and_then(|e| self.json_representation(e))
                .or_else(|| node.keep_if_empty.then(|| Value::Object(Map::new()))),
            leaf => leaf.value_slot().and_then(Clone::clone),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Location, ParameterArena, ParameterMeta};
    use serde_json::json;

    #[test]
    fn renders_set_values_and_omits_empty_structures() {
        let mut arena = ParameterArena::new("POST /pets");
        let body = arena
            .build_parameter(
                "pet",
                &json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "owner": {"type": "object", "properties": {"email": {"type": "string"}}},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }
                }),
                &ParameterMeta::new(Location::RequestBody, "createPet"),
            )
            .unwrap();
        assert_eq!(arena.json_representation(body), None);

        let name = arena.property(body, "name").unwrap();
        arena.set_value(name, json!("rex")).unwrap();
        let tags = arena.property(body, "tags").unwrap();
        let tag = arena.push_element_from_reference(tags).unwrap();
        arena.set_value(tag, json!("good")).unwrap();

        assert_eq!(
            arena.json_representation(body),
            Some(json!({"name": "rex", "tags": ["good"]}))
        );
    }

    #[test]
    fn keep_if_empty_renders_empty_object() {
        let mut arena = ParameterArena::new("POST /ping");
        let body = arena
            .build_parameter(
                "ping",
                &json!({"type": "object"}),
                &ParameterMeta::new(Location::RequestBody, "ping"),
            )
            .unwrap();
        arena.node_mut(body).unwrap().keep_if_empty = true;
        assert_eq!(arena.json_representation(body), Some(json!({})));
    }
}
