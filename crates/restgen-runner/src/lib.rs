//! restgen-runner: OpenAPI loading and HTTP execution for restgen

pub mod http;
pub mod openapi;
mod oracle;

pub use http::HttpExecutor;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("HTTP error: {0}")]
    Http(String),
}
