//! Blocking HTTP executor
//!
//! Sends rendered interactions with reqwest and judges the responses.

use std::collections::BTreeMap;
use std::time::Duration;

use restgen_core::render::RenderedRequest;
use restgen_core::sequence::{ExecutionOutcome, InteractionExecutor, TestInteraction};
use tracing::debug;

use crate::RunnerError;
use crate::oracle::{Exchange, judge};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes interactions against a live server.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::blocking::Client,
    base_url: String,
    /// Sent with every request; interaction headers take precedence.
    headers: BTreeMap<String, String>,
}

impl HttpExecutor {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, headers: BTreeMap<String, String>) -> Result<Self, RunnerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RunnerError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: &RenderedRequest) -> Result<reqwest::blocking::RequestBuilder, RunnerError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| RunnerError::Http(format!("invalid method {}: {e}", request.method)))?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (k, v) in &request.headers {
            headers.insert(k, v);
        }
        let cookie = request.cookie_header();
        if let Some(cookie) = &cookie {
            headers.insert("Cookie", cookie);
        }

        let mut builder = self.client.request(method, url).query(&request.query);
        for (k, v) in headers {
            // values that are not valid in HTTP never reach the server
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                builder = builder.header(k, v);
            } else {
                debug!(header = k, "dropping header with invalid value");
            }
        }
        if let Some(body) = &request.body {
            builder = builder.header(
                "Content-Type",
                request.content_type.as_deref().unwrap_or("application/json"),
            );
            builder = builder.body(body.to_string());
        }
        Ok(builder)
    }
}

impl InteractionExecutor for HttpExecutor {
    type Error = RunnerError;

    fn execute(&mut self, interaction: &TestInteraction) -> Result<ExecutionOutcome, RunnerError> {
        let request = RenderedRequest::from_instance(&interaction.instance);
        let builder = self.build(&request)?;

        let response = match builder.send() {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(ExecutionOutcome::fail(None, format!("timed out after {REQUEST_TIMEOUT:?}")));
            }
            Err(e) => return Err(RunnerError::Http(format!("{}: {e}", self.base_url))),
        };

        let status = response.status().as_u16();
        let body_text = response.text().unwrap_or_default();
        let spec = interaction.operation().spec();
        let schema = spec.responses.get(&status).and_then(Option::as_ref);
        let outcome = judge(&Exchange {
            mutated: interaction.is_mutated(),
            status,
            body_text: &body_text,
            schema,
        });
        debug!(
            operation = %interaction.label(),
            path = %request.path_and_query(),
            status,
            passed = outcome.passed,
            "executed"
        );
        Ok(outcome)
    }
}
