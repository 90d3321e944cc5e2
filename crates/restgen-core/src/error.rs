//! Error taxonomy for model construction, value assignment and mutation

use crate::model::{NodeId, ParameterType};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// The schema could not be turned into a parameter tree.
    #[error("cannot model parameter '{name}': {reason}")]
    ParameterCreation { name: String, reason: String },

    /// The schema uses a construct the model does not represent (`not`, unresolved `$ref`, ...).
    #[error("unsupported schema feature in '{name}': {feature}")]
    UnsupportedSchemaFeature { name: String, feature: String },

    /// Attempted mutation of a tree owned by a read-only operation template.
    #[error("parameter tree of {operation} is read-only")]
    ReadOnlyViolation { operation: String },

    /// A value does not fit the declared type of a parameter and cannot be cast.
    #[error("value {value} does not fit parameter '{name}' declared as {expected}")]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        value: String,
    },

    /// A mutator was invoked on a parameter it cannot mutate.
    #[error("{mutator} cannot mutate parameter '{name}': {reason}")]
    MutationNotApplicable {
        mutator: &'static str,
        name: String,
        reason: String,
    },

    /// A node id that does not belong to the arena it was used with.
    #[error("unknown parameter node {0}")]
    UnknownNode(NodeId),
}

impl CoreError {
    /// Schema-level failures are recovered by dropping the offending parameter.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ReadOnlyViolation { .. } | Self::UnknownNode(_))
    }

    pub(crate) fn not_applicable(
        mutator: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MutationNotApplicable {
            mutator,
            name: name.into(),
            reason: reason.into(),
        }
    }
}
