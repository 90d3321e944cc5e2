//! restgen-core: REST API test generation engine
//!
//! Models operation inputs as parameter trees, links operations through the
//! values their responses expose, and generates nominal and error test
//! interactions against an external executor.

pub mod config;
pub mod dictionary;
pub mod dump;
pub mod error;
pub mod generation;
pub mod graph;
pub mod model;
pub mod mutation;
pub mod normalize;
pub mod operation;
pub mod provider;
pub mod render;
pub mod report;
pub mod sequence;

pub use config::{AuthParameter, Config, ConfigError, GenerationConfig};
pub use dictionary::{Dictionary, DictionaryEntry, SourceLeaf};
pub use dump::{DumpError, DumpIndex};
pub use error::CoreError;
pub use generation::{
    ErrorGenerator, ErrorRun, GenerationContext, GenerationError, NominalGenerator, NominalRun,
    OperationState, OperationStatus, Termination,
};
pub use graph::{Dependency, DependencyGraph};
pub use model::{Location, NodeId, ParameterArena, ParameterNode, ParameterType};
pub use mutation::{Mutator, MutatorKind};
pub use operation::{HttpMethod, Operation, OperationInstance, OperationSpec, ParameterSpec, RequestBodySpec};
pub use provider::{AuthenticationSource, ProviderChain, StaticAuthentication, ValueProvider};
pub use render::{RenderedRequest, to_http_file};
pub use report::{GenerationReport, InteractionRecord, generate_schema};
pub use sequence::{ExecutionOutcome, InteractionExecutor, ObservedValue, TestInteraction, TestSequence};
