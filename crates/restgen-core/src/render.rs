//! Request rendering and `.http` export
//!
//! [`RenderedRequest::from_instance`] serializes the parameter trees of an
//! instance following the OpenAPI `style`/`explode` rules. The executor sends
//! it; [`to_http_file`] writes it out for replay in an HTTP client.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Location, ParameterStyle};
use crate::operation::{HttpMethod, OperationInstance};
use crate::sequence::TestInteraction;

/// A request ready to be sent, with decoded values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderedRequest {
    pub method: HttpMethod,
    /// Path with placeholders substituted and percent-encoded.
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RenderedRequest {
    /// Render the set parameters of `instance`.
    ///
    /// Unset parameters are left out; a path placeholder without a value
    /// becomes an empty segment.
    #[must_use]
    pub fn from_instance(instance: &OperationInstance) -> Self {
        let arena = instance.arena();
        let mut path_values = BTreeMap::new();
        let mut request = Self {
            method: instance.operation().method(),
            path: String::new(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            content_type: None,
            body: None,
        };

        for &root in instance.parameters() {
            let node = &arena[root];
            let Some(value) = arena.json_representation(root) else {
                continue;
            };
            let style = node
                .style
                .unwrap_or_else(|| ParameterStyle::default_for(node.location));
            match node.location {
                Location::Path => {
                    path_values.insert(node.name.clone(), path_value(&node.name, &value, style, node.explode));
                }
                Location::Query => request.query.extend(form_pairs(&node.name, &value, style, node.explode)),
                Location::Header => request.headers.push((node.name.clone(), simple(&value, node.explode))),
                Location::Cookie => request.cookies.extend(form_pairs(&node.name, &value, style, node.explode)),
                Location::RequestBody | Location::ResponseBody | Location::Missing => {}
            }
        }

        request.path = substitute(instance.operation().path(), &path_values);
        request.body = instance.body_json();
        if request.body.is_some() {
            request.content_type = Some(
                instance
                    .operation()
                    .spec()
                    .request_body
                    .as_ref()
                    .map_or_else(|| "application/json".to_string(), |b| b.content_type.clone()),
            );
        }
        request
    }

    /// Path and encoded query string.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }

    /// `Cookie` header value, if any cookie is set.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        (!self.cookies.is_empty()).then(|| {
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ")
        })
    }

    /// Full URL against `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path_and_query())
    }
}

/// Replace `{name}` placeholders; unknown names become empty.
fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &rest[start + 1..start + len];
        if let Some(value) = values.get(name) {
            out.push_str(value);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn path_value(name: &str, value: &Value, style: ParameterStyle, explode: bool) -> String {
    match style {
        ParameterStyle::Label => {
            let sep = if explode { "." } else { "," };
            format!(".{}", join_encoded(value, sep, explode))
        }
        ParameterStyle::Matrix => match value {
            Value::Array(items) if explode => items
                .iter()
                .map(|v| format!(";{name}={}", encode(&scalar(v))))
                .collect(),
            Value::Object(fields) if explode => fields
                .iter()
                .map(|(k, v)| format!(";{k}={}", encode(&scalar(v))))
                .collect(),
            _ => format!(";{name}={}", join_encoded(value, ",", false)),
        },
        _ => join_encoded(value, ",", explode),
    }
}

fn join_encoded(value: &Value, sep: &str, explode: bool) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| encode(&scalar(v)))
            .collect::<Vec<_>>()
            .join(sep),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| {
                if explode {
                    format!("{}={}", encode(k), encode(&scalar(v)))
                } else {
                    format!("{},{}", encode(k), encode(&scalar(v)))
                }
            })
            .collect::<Vec<_>>()
            .join(sep),
        other => encode(&scalar(other)),
    }
}

/// Header serialization (`simple` style).
fn simple(value: &Value, explode: bool) -> String {
    match value {
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(","),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| {
                if explode {
                    format!("{k}={}", scalar(v))
                } else {
                    format!("{k},{}", scalar(v))
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        other => scalar(other),
    }
}

/// Query and cookie serialization; values are not encoded.
fn form_pairs(name: &str, value: &Value, style: ParameterStyle, explode: bool) -> Vec<(String, String)> {
    let delimiter = match style {
        ParameterStyle::SpaceDelimited => " ",
        ParameterStyle::PipeDelimited => "|",
        _ => ",",
    };
    match value {
        Value::Array(items) if explode => items.iter().map(|v| (name.to_string(), scalar(v))).collect(),
        Value::Array(items) => vec![(
            name.to_string(),
            items.iter().map(scalar).collect::<Vec<_>>().join(delimiter),
        )],
        Value::Object(fields) if style == ParameterStyle::DeepObject => fields
            .iter()
            .map(|(k, v)| (format!("{name}[{k}]"), scalar(v)))
            .collect(),
        Value::Object(fields) if explode => fields.iter().map(|(k, v)| (k.clone(), scalar(v))).collect(),
        Value::Object(fields) => vec![(
            name.to_string(),
            fields
                .iter()
                .flat_map(|(k, v)| [k.clone(), scalar(v)])
                .collect::<Vec<_>>()
                .join(","),
        )],
        other => vec![(name.to_string(), scalar(other))],
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Header names whose values never leave the process unmasked.
pub(crate) const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-auth-token",
    "cookie",
    "proxy-authorization",
];

pub(crate) fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Render interactions as an `.http` file.
#[must_use]
pub fn to_http_file(interactions: &[TestInteraction], base_url_var: &str) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Generated test cases ({} interactions)", interactions.len()));
    lines.push(format!("# Base URL variable: {{{{{base_url_var}}}}}"));
    lines.push(String::new());

    for (idx, interaction) in interactions.iter().enumerate() {
        let kind = if interaction.is_mutated() { "error" } else { "nominal" };
        lines.push(format!("### [{idx}] {} ({kind})", interaction.label()));
        if let Some(mutation) = &interaction.mutation {
            lines.push(format!("# Mutation: {mutation}"));
        }
        if let Some(outcome) = &interaction.outcome {
            let verdict = if outcome.passed { "passed" } else { "failed" };
            match outcome.status {
                Some(status) => lines.push(format!("# Outcome: {verdict} ({status})")),
                None => lines.push(format!("# Outcome: {verdict}")),
            }
        }

        let request = RenderedRequest::from_instance(&interaction.instance);
        lines.push(format!(
            "{} {{{{{base_url_var}}}}}{}",
            request.method,
            request.path_and_query()
        ));
        for (name, value) in &request.headers {
            lines.push(format!("{name}: {value}"));
        }
        if let Some(cookie) = request.cookie_header() {
            lines.push(format!("Cookie: {cookie}"));
        }
        if let Some(body) = &request.body {
            if let Some(content_type) = &request.content_type {
                lines.push(format!("Content-Type: {content_type}"));
            }
            lines.push(String::new());
            lines.push(serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()));
        }

        lines.push(String::new());
    }

    lines.join("\n")
}

/// Masked copy of a header value for persisted output.
#[must_use]
pub(crate) fn masked_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        "***".to_string()
    } else {
        value.to_string()
    }
}
