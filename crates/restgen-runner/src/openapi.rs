//! OpenAPI 3 loading: operations, parameters and response schemas

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use restgen_core::model::{Location, ParameterStyle};
use restgen_core::operation::{
    DEFAULT_BODY_NAME, HttpMethod, OperationSpec, ParameterSpec, RequestBodySpec,
};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::RunnerError;

/// Depth at which `$ref` resolution stops, guarding circular references.
const MAX_REF_DEPTH: u32 = 20;


/// Read and extract every operation of an OpenAPI document.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed, or declares no operation.
pub fn load(path: &Path) -> Result<Vec<OperationSpec>, RunnerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RunnerError::Io(format!("{}: {e}", path.display())))?;
    let document = parse_spec(path, &content)?;
    let operations = extract_operations(&document);
    if operations.is_empty() {
        return Err(RunnerError::Parse(
            "No operations found in OpenAPI spec".into(),
        ));
    }
    debug!(operations = operations.len(), path = %path.display(), "spec loaded");
    Ok(operations)
}

/// Parse an OpenAPI spec from JSON or YAML.
///
/// Detection strategy: try extension first (`.yaml`/`.yml`), then fall back to
/// content sniffing (leading `{` → JSON, otherwise YAML).
///
/// # Errors
///
/// [`RunnerError::Parse`] with the parser message.
pub fn parse_spec(path: &Path, content: &str) -> Result<Value, RunnerError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let json = |content: &str| {
        serde_json::from_str(content).map_err(|e| RunnerError::Parse(format!("Invalid JSON: {e}")))
    };
    let yaml = |content: &str| {
        serde_yml::from_str(content).map_err(|e| RunnerError::Parse(format!("Invalid YAML: {e}")))
    };
    match ext.as_str() {
        "yaml" | "yml" => yaml(content),
        "json" => json(content),
        _ if content.trim_start().starts_with('{') => json(content),
        _ => yaml(content),
    }
}

/// One [`OperationSpec`] per method of every path, in document order.
#[must_use]
pub fn extract_operations(document: &Value) -> Vec<OperationSpec> {
    let components = document.get("components").cloned().unwrap_or_else(|| json!({}));
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut operations = Vec::new();
    for (path, item) in paths {
        for method in HttpMethod::ALL {
            let key = method.as_str().to_ascii_lowercase();
            let Some(operation) = item.get(&key) else {
                continue;
            };
            operations.push(extract_operation(method, path, item, operation, &components));
        }
    }
    operations
}

fn extract_operation(
    method: HttpMethod,
    path: &str,
    item: &Value,
    operation: &Value,
    components: &Value,
) -> OperationSpec {
    let schemas = components.get("schemas").unwrap_or(&Value::Null);
    let mut spec = OperationSpec::new(method, path);
    spec.operation_id = operation
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::to_string);

    // operation-level parameters override path-level ones with the same name and location
    let mut parameters: Vec<ParameterSpec> = Vec::new();
    for source in [item.get("parameters"), operation.get("parameters")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
    {
        for raw in source {
            let raw = resolve_parameter_ref(raw, components);
            match parse_parameter(raw, schemas) {
                Some(p) => {
                    parameters.retain(|q| !(q.name == p.name && q.location == p.location));
                    parameters.push(p);
                }
                None => warn!(operation = %spec.label(), parameter = %raw, "skipping unusable parameter"),
            }
        }
    }
    spec.parameters = parameters;

    spec.request_body = operation
        .get("requestBody")
        .and_then(|b| parse_request_body(b, schemas));

    if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
        for (status, response) in responses {
            let Ok(status) = status.parse::<u16>() else {
                continue;
            };
            let schema = response
                .pointer("/content/application~1json/schema")
                .map(|s| resolve_refs(s, schemas));
            if (200..300).contains(&status) {
                if let Some(schema) = &schema {
                    collect_output_fields(schema, &mut spec.output_fields, 0);
                }
            }
            spec.responses.insert(status, schema);
        }
    }
    spec
}

/// Inline `#/components/parameters/*` references.
fn resolve_parameter_ref<'a>(raw: &'a Value, components: &'a Value) -> &'a Value {
    raw.get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("#/components/parameters/"))
        .and_then(|name| components.get("parameters")?.get(name))
        .unwrap_or(raw)
}

fn parse_parameter(raw: &Value, schemas: &Value) -> Option<ParameterSpec> {
    let name = raw.get("name")?.as_str()?.to_string();
    let location = Location::from_openapi(raw.get("in")?.as_str()?);
    if !matches!(
        location,
        Location::Path | Location::Query | Location::Header | Location::Cookie
    ) {
        return None;
    }
    let schema = raw
        .get("schema")
        .map_or_else(|| json!({"type": "string"}), |s| resolve_refs(s, schemas));
    // path parameters are always required
    let required = location == Location::Path
        || raw.get("required").and_then(Value::as_bool).unwrap_or(false);

    Some(ParameterSpec {
        name,
        location,
        style: raw
            .get("style")
            .and_then(Value::as_str)
            .and_then(ParameterStyle::parse),
        explode: raw.get("explode").and_then(Value::as_bool),
        required,
        schema,
    })
}

fn parse_request_body(raw: &Value, schemas: &Value) -> Option<RequestBodySpec> {
    let content = raw.get("content")?.as_object()?;
    let (content_type, media) = content
        .get_key_value("application/json")
        .or_else(|| content.iter().find(|(k, _)| k.ends_with("+json")))?;
    let schema = media.get("schema")?;
    let name = schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.rsplit('/').next())
        .map_or_else(|| DEFAULT_BODY_NAME.to_string(), decapitalize);

    Some(RequestBodySpec {
        name,
        content_type: content_type.clone(),
        required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema: resolve_refs(schema, schemas),
    })
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

/// Property names reachable through objects, arrays and combined schemas.
fn collect_output_fields(schema: &Value, out: &mut BTreeSet<String>, depth: u32) {
    if depth > MAX_REF_DEPTH {
        return;
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            out.insert(name.clone());
            collect_output_fields(property, out, depth + 1);
        }
    }
    if let Some(items) = schema.get("items") {
        collect_output_fields(items, out, depth + 1);
    }
    for key in ["allOf", "anyOf", "oneOf"] {
        for member in schema.get(key).and_then(Value::as_array).into_iter().flatten() {
            collect_output_fields(member, out, depth + 1);
        }
    }
}

/// Recursively resolve `$ref` in a JSON Schema against `#/components/schemas`.
///
/// Produces a self-contained schema suitable for `jsonschema` validation.
/// Depth-limited to prevent infinite recursion on circular refs.
#[must_use]
pub fn resolve_refs(schema: &Value, schemas: &Value) -> Value {
    resolve_refs_inner(schema, schemas, 0)
}

fn resolve_refs_inner(schema: &Value, schemas: &Value, depth: u32) -> Value {
    if depth > MAX_REF_DEPTH {
        return schema.clone();
    }
    match schema {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                if let Some(resolved) = resolve_ref(reference, schemas) {
                    return resolve_refs_inner(resolved, schemas, depth + 1);
                }
                return schema.clone();
            }
            let resolved: Map<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), resolve_refs_inner(v, schemas, depth + 1)))
                .collect();
            Value::Object(resolved)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_refs_inner(v, schemas, depth + 1))
                .collect(),
        ),
        _ => schema.clone(),
    }
}

fn resolve_ref<'a>(reference: &str, schemas: &'a Value) -> Option<&'a Value> {
    reference
        .strip_prefix("#/components/schemas/")
        .and_then(|name| schemas.get(name))
}

/// Response schemas keyed by status, for the oracle.
#[must_use]
pub fn response_schemas(spec: &OperationSpec) -> BTreeMap<u16, &Value> {
    spec.responses
        .iter()
        .filter_map(|(status, schema)| schema.as_ref().map(|s| (*status, s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.3",
            "paths": {
                "/pets": {
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/NewPet"}}}
                        },
                        "responses": {
                            "201": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
                            "400": {"description": "bad request"}
                        }
                    },
                    "get": {
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer", "maximum": 100}},
                            {"name": "tags", "in": "query", "style": "pipeDelimited", "explode": false,
                             "schema": {"type": "array", "items": {"type": "string"}}}
                        ],
                        "responses": {
                            "200": {"content": {"application/json": {"schema": {
                                "type": "array", "items": {"$ref": "#/components/schemas/Pet"}
                            }}}}
                        }
                    }
                },
                "/pets/{petId}": {
                    "parameters": [{"name": "petId", "in": "path", "schema": {"type": "integer"}}],
                    "get": {
                        "operationId": "getPet",
                        "parameters": [{"name": "X-Trace", "in": "header", "required": true}],
                        "responses": {"200": {"description": "ok"}}
                    }
                }
            },
            "components": {
                "schemas": {
                    "NewPet": {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}},
                    "Pet": {"allOf": [
                        {"$ref": "#/components/schemas/NewPet"},
                        {"type": "object", "properties": {"id": {"type": "integer"}, "owner": {
                            "type": "object", "properties": {"ownerId": {"type": "string"}}
                        }}}
                    ]}
                }
            }
        })
    }

    fn find<'a>(ops: &'a [OperationSpec], label: &str) -> &'a OperationSpec {
        ops.iter().find(|o| o.label() == label).unwrap()
    }

    #[test]
    fn extracts_every_operation() {
        let ops = extract_operations(&petstore());
        let labels: Vec<String> = ops.iter().map(OperationSpec::label).collect();
        assert_eq!(labels, ["GET /pets", "POST /pets", "GET /pets/{petId}"]);
    }

    #[test]
    fn body_root_is_named_after_the_component() {
        let ops = extract_operations(&petstore());
        let create = find(&ops, "POST /pets");
        let body = create.request_body.as_ref().unwrap();
        assert_eq!(body.name, "newPet");
        assert!(body.required);
        assert_eq!(body.schema["properties"]["name"]["type"], "string");
        assert_eq!(create.operation_id.as_deref(), Some("createPet"));
    }

    #[test]
    fn output_fields_come_from_success_responses() {
        let ops = extract_operations(&petstore());
        let create = find(&ops, "POST /pets");
        let fields: Vec<&str> = create.output_fields.iter().map(String::as_str).collect();
        assert_eq!(fields, ["id", "name", "owner", "ownerId"]);
        assert!(create.responses[&400].is_none());
        // array responses expose their items' fields
        assert!(find(&ops, "GET /pets").output_fields.contains("id"));
    }

    #[test]
    fn parameters_merge_path_and_operation_levels() {
        let ops = extract_operations(&petstore());
        let get = find(&ops, "GET /pets/{petId}");
        assert_eq!(get.parameters.len(), 2);
        assert_eq!(get.parameters[0].location, Location::Path);
        assert!(get.parameters[0].required);
        assert_eq!(get.parameters[1].schema, json!({"type": "string"}));

        let list = find(&ops, "GET /pets");
        assert_eq!(list.parameters[1].style, Some(ParameterStyle::PipeDelimited));
        assert_eq!(list.parameters[1].explode, Some(false));
        assert!(!list.parameters[0].required);
    }

    #[test]
    fn circular_refs_terminate() {
        let schemas = json!({"Node": {"type": "object", "properties": {"next": {"$ref": "#/components/schemas/Node"}}}});
        let resolved = resolve_refs(&json!({"$ref": "#/components/schemas/Node"}), &schemas);
        assert_eq!(resolved["type"], "object");
    }

    #[test]
    fn yaml_and_json_are_detected() {
        let yaml = "openapi: 3.0.0\npaths: {}\n";
        let parsed = parse_spec(&PathBuf::from("api.yml"), yaml).unwrap();
        assert_eq!(parsed["openapi"], "3.0.0");
        let parsed = parse_spec(&PathBuf::from("api"), r#"{"openapi": "3.1.0"}"#).unwrap();
        assert_eq!(parsed["openapi"], "3.1.0");
        assert!(matches!(
            parse_spec(&PathBuf::from("api.json"), "{"),
            Err(RunnerError::Parse(_))
        ));
    }

    #[test]
    fn load_rejects_documents_without_operations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"openapi": "3.0.0", "paths": {}}"#).unwrap();
        assert!(matches!(load(&path), Err(RunnerError::Parse(_))));

        let path = dir.path().join("pets.json");
        std::fs::write(&path, petstore().to_string()).unwrap();
        assert_eq!(load(&path).unwrap().len(), 3);
    }
}
